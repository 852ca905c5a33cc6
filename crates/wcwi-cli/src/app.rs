//! Application wiring
//!
//! Builds the engine and coordinator from an [`AppConfig`] and, when the
//! `bluez` feature is enabled on Linux, the BlueZ-backed Bluetooth transport.

use std::sync::Arc;
use tracing::info;

use wcwi_bluetooth::BluetoothTransport;
use wcwi_runtime::{ConnectionCoordinator, Role, SyncEngine};

use crate::config::AppConfig;
use crate::error::Result;

pub struct WcwiApp {
    config: AppConfig,
    coordinator: Arc<ConnectionCoordinator>,
}

impl WcwiApp {
    /// Open the store and build a coordinator for `role`
    pub fn new(config: AppConfig, role: Role) -> Result<Self> {
        let coordinator = build_coordinator(&config, role)?;
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Like [`WcwiApp::new`], with the Bluetooth entry points enabled
    pub async fn with_bluetooth(config: AppConfig, role: Role) -> Result<Self> {
        let transport = bluetooth_transport(&config).await?;
        let coordinator = build_coordinator(&config, role)?.with_bluetooth(transport);
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<ConnectionCoordinator> {
        &self.coordinator
    }

    pub fn engine(&self) -> &SyncEngine {
        self.coordinator.engine()
    }

    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
        info!("WCWI stopped");
    }
}

fn build_coordinator(config: &AppConfig, role: Role) -> Result<ConnectionCoordinator> {
    let engine = SyncEngine::open(role, &config.engine_config())?;
    info!(
        data_dir = %config.store.data_dir.display(),
        messages = engine.messages().len(),
        "Message store opened"
    );
    Ok(ConnectionCoordinator::new(
        engine,
        config.coordinator_config(),
        config.websocket.clone(),
        config.discovery.clone(),
    ))
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", feature = "bluez"))] {
        /// Bluetooth transport on the default BlueZ adapter
        pub async fn bluetooth_transport(config: &AppConfig) -> Result<BluetoothTransport> {
            let adapter = wcwi_bluetooth::BluezAdapter::new().await?;
            Ok(BluetoothTransport::new(Arc::new(adapter), config.bluetooth.clone()))
        }
    } else {
        /// Bluetooth is unavailable in this build
        pub async fn bluetooth_transport(_config: &AppConfig) -> Result<BluetoothTransport> {
            Err(crate::error::CliError::FeatureNotAvailable(
                "Bluetooth support was not compiled in (build with --features bluez)".to_string(),
            ))
        }
    }
}
