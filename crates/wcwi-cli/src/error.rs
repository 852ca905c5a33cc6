//! Error handling for the WCWI CLI

use thiserror::Error;

use wcwi_bluetooth::BluetoothError;
use wcwi_core::{StorageError, WcwiError};
use wcwi_ws::WsTransportError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("WCWI error: {0}")]
    Wcwi(#[from] WcwiError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML encoding error: {0}")]
    TomlEncoding(#[from] toml::ser::Error),

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<WsTransportError> for CliError {
    fn from(err: WsTransportError) -> Self {
        CliError::Wcwi(err.into())
    }
}

impl From<BluetoothError> for CliError {
    fn from(err: BluetoothError) -> Self {
        CliError::Wcwi(err.into())
    }
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        CliError::Wcwi(err.into())
    }
}
