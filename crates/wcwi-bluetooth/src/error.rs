//! Error types for the Bluetooth transport

use thiserror::Error;
use wcwi_core::{PermissionError, TransportError, WcwiError};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the Bluetooth serial transport
#[derive(Error, Debug)]
pub enum BluetoothError {
    #[error("Bluetooth adapter not available: {0}")]
    AdapterUnavailable(String),

    #[error("Bluetooth is turned off")]
    Disabled,

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("Device not found: {address}")]
    DeviceNotFound { address: String },

    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Failed to accept a connection: {0}")]
    ListenFailed(String),

    #[error("Device scan failed: {0}")]
    ScanFailed(String),

    #[error("Invalid service UUID: {0}")]
    InvalidServiceUuid(String),

    #[error("Failed to start link worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("Bluetooth I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BluetoothError> for WcwiError {
    fn from(err: BluetoothError) -> Self {
        let transport = match err {
            BluetoothError::Permission(e) => return WcwiError::Permission(e),
            BluetoothError::ConnectFailed { address, reason } => TransportError::ConnectFailed {
                peer: address,
                reason,
            },
            BluetoothError::Io(e) => TransportError::Io(e),
            other => TransportError::Unavailable {
                reason: other.to_string(),
            },
        };
        WcwiError::Transport(transport)
    }
}

pub type Result<T> = std::result::Result<T, BluetoothError>;
