//! Bluetooth transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Serial Port Profile UUID
pub const SPP_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

/// Service name advertised by the host
pub const SERVICE_NAME: &str = "WCWI_Chat";

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the Bluetooth serial transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothTransportConfig {
    /// Service class UUID registered by the host
    pub service_uuid: String,
    /// Human readable service name
    pub service_name: String,
    /// RFCOMM channel used for listening and connecting
    pub rfcomm_channel: u8,
    /// Bytes requested per blocking read
    pub read_chunk_size: usize,
    /// Length of a device scan window
    pub scan_timeout_ms: u64,
}

impl Default for BluetoothTransportConfig {
    fn default() -> Self {
        Self {
            service_uuid: SPP_UUID.to_string(),
            service_name: SERVICE_NAME.to_string(),
            rfcomm_channel: 1,
            read_chunk_size: 1024,
            scan_timeout_ms: 12_000,
        }
    }
}

impl BluetoothTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rfcomm_channel(mut self, channel: u8) -> Self {
        self.rfcomm_channel = channel;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}
