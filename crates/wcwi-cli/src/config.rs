//! WCWI CLI configuration
//!
//! One TOML file carries every layer's settings. Missing sections and keys
//! fall back to their defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! [identity]
//! name = "alice"
//!
//! [websocket]
//! port = 9876
//!
//! [discovery]
//! port = 8888
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use wcwi_bluetooth::BluetoothTransportConfig;
use wcwi_core::{DedupConfig, StoreConfig};
use wcwi_runtime::{CoordinatorConfig, EngineConfig};
use wcwi_ws::{DiscoveryConfig, WsTransportConfig};

use crate::error::{CliError, Result};

/// Directory name under the platform data directory
pub const DATA_DIR_NAME: &str = "wcwi";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Who we are to the other peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name sent to the host after joining
    pub name: Option<String>,
}

/// Complete configuration for the `wcwi` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub store: StoreConfig,
    pub dedup: DedupConfig,
    pub websocket: WsTransportConfig,
    pub discovery: DiscoveryConfig,
    pub bluetooth: BluetoothTransportConfig,
    pub coordinator: CoordinatorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            store: StoreConfig::new(default_data_dir()),
            dedup: DedupConfig::default(),
            websocket: WsTransportConfig::default(),
            discovery: DiscoveryConfig::default(),
            bluetooth: BluetoothTransportConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

/// Platform data directory for WCWI, or a relative `wcwi` directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

impl AppConfig {
    /// Load and validate a TOML configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.store.data_dir = data_dir.into();
        self
    }

    /// Reject settings no transport can run with
    pub fn validate(&self) -> Result<()> {
        if self.discovery.port == 0 {
            return Err(CliError::Config(
                "discovery port must not be 0".to_string(),
            ));
        }
        if self.websocket.path.is_empty() {
            return Err(CliError::Config(
                "websocket path must not be empty".to_string(),
            ));
        }
        if !self.websocket.path.starts_with('/') {
            return Err(CliError::Config(format!(
                "websocket path must start with '/': {}",
                self.websocket.path
            )));
        }
        if self.dedup.capacity == 0 {
            return Err(CliError::Config(
                "dedup capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.store.clone()).with_dedup(self.dedup)
    }

    /// Coordinator settings with the identity name as greeting unless one is set
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        match (&self.coordinator.greeting, &self.identity.name) {
            (None, Some(name)) => self.coordinator.clone().with_greeting(name.clone()),
            _ => self.coordinator.clone(),
        }
    }
}
