//! Bluetooth transport entry points
//!
//! Hosting accepts exactly one joiner over RFCOMM; joining opens one link to a
//! chosen device. Scanning and connecting are mutually exclusive, so a join
//! stops any running scan before dialing. Missing permissions abort the
//! operation with a `PermissionError` and are never retried here.

use std::sync::Arc;
use tracing::info;

use wcwi_core::Role;

use crate::adapter::{BluetoothAdapter, BluetoothDevice, BluetoothOperation};
use crate::config::BluetoothTransportConfig;
use crate::discovery::BluetoothDiscovery;
use crate::error::Result;
use crate::session::SerialSession;

pub struct BluetoothTransport {
    adapter: Arc<dyn BluetoothAdapter>,
    discovery: BluetoothDiscovery,
    config: BluetoothTransportConfig,
}

impl BluetoothTransport {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>, config: BluetoothTransportConfig) -> Self {
        let discovery = BluetoothDiscovery::new(Arc::clone(&adapter), config.clone());
        Self {
            adapter,
            discovery,
            config,
        }
    }

    pub fn config(&self) -> &BluetoothTransportConfig {
        &self.config
    }

    pub fn discovery(&self) -> &BluetoothDiscovery {
        &self.discovery
    }

    /// Advertise the service and wait for one joiner
    pub async fn host(&self) -> Result<SerialSession> {
        self.discovery.ensure_ready(BluetoothOperation::Listen).await?;
        info!(
            service = %self.config.service_name,
            channel = self.config.rfcomm_channel,
            "Waiting for a Bluetooth joiner"
        );
        let link = self.adapter.listen(&self.config).await?;
        info!(peer = %link.peer(), "Bluetooth joiner accepted");
        SerialSession::start(link, Role::Joiner, self.config.read_chunk_size)
    }

    /// Connect to a hosting device
    pub async fn join(&self, device: &BluetoothDevice) -> Result<SerialSession> {
        self.discovery.ensure_ready(BluetoothOperation::Connect).await?;
        self.discovery.stop_scan().await;

        info!(device = %device, "Connecting over Bluetooth");
        let link = self.adapter.connect(device, &self.config).await?;
        SerialSession::start(link, Role::Host, self.config.read_chunk_size)
    }
}
