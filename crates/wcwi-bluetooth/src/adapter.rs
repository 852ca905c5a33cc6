//! Bluetooth adapter seam
//!
//! The platform stack (BlueZ on Linux) sits behind [`BluetoothAdapter`] so the
//! discovery policy and session handling can be exercised without radio
//! hardware.

use async_trait::async_trait;
use core::fmt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use wcwi_core::PermissionError;

use crate::config::BluetoothTransportConfig;
use crate::error::Result;
use crate::link::SerialLink;

// ----------------------------------------------------------------------------
// Devices and Operations
// ----------------------------------------------------------------------------

/// A remote Bluetooth device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BluetoothDevice {
    /// Hardware address, `AA:BB:CC:DD:EE:FF`
    pub address: String,
    pub name: Option<String>,
    pub paired: bool,
}

impl BluetoothDevice {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            paired: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Name if known, otherwise the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl fmt::Display for BluetoothDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Operations that require a platform permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BluetoothOperation {
    Discover,
    Connect,
    Listen,
}

impl BluetoothOperation {
    /// Name of the permission guarding the operation
    pub fn permission(&self) -> &'static str {
        match self {
            BluetoothOperation::Discover => "BLUETOOTH_SCAN",
            BluetoothOperation::Connect => "BLUETOOTH_CONNECT",
            BluetoothOperation::Listen => "BLUETOOTH_CONNECT",
        }
    }

    /// Permission error for this operation
    pub fn missing(&self) -> PermissionError {
        PermissionError::Missing {
            permission: self.permission().to_string(),
            operation: self.to_string(),
        }
    }
}

impl fmt::Display for BluetoothOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BluetoothOperation::Discover => f.write_str("device discovery"),
            BluetoothOperation::Connect => f.write_str("connect"),
            BluetoothOperation::Listen => f.write_str("listen"),
        }
    }
}

// ----------------------------------------------------------------------------
// Adapter Trait
// ----------------------------------------------------------------------------

#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the radio is present and powered
    async fn is_enabled(&self) -> Result<bool>;

    /// Fail with a `PermissionError` if `operation` is not allowed
    async fn check_permission(&self, operation: BluetoothOperation) -> Result<()>;

    /// Devices already paired with this adapter; no scan involved
    async fn paired_devices(&self) -> Result<Vec<BluetoothDevice>>;

    /// Begin scanning; each discovered device is sent on the returned channel
    /// until `stop_scan` is called
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<BluetoothDevice>>;

    async fn stop_scan(&self) -> Result<()>;

    /// Advertise the chat service and accept exactly one connection
    async fn listen(&self, config: &BluetoothTransportConfig) -> Result<SerialLink>;

    /// Open a serial link to `device`
    async fn connect(
        &self,
        device: &BluetoothDevice,
        config: &BluetoothTransportConfig,
    ) -> Result<SerialLink>;
}
