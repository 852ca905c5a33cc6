//! Error types for the WebSocket transport

use std::net::SocketAddr;

use thiserror::Error;
use wcwi_core::{TransportError, WcwiError};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the WebSocket transport and UDP discovery
#[derive(Error, Debug)]
pub enum WsTransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    #[error("WebSocket handshake with {peer} failed: {reason}")]
    Handshake { peer: String, reason: String },

    #[error("Discovery socket error: {0}")]
    Discovery(#[source] std::io::Error),

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WsTransportError> for TransportError {
    fn from(err: WsTransportError) -> Self {
        match err {
            WsTransportError::ConnectFailed { url, reason } => {
                TransportError::ConnectFailed { peer: url, reason }
            }
            WsTransportError::ConnectTimeout { timeout_ms, .. } => TransportError::Timeout {
                duration_ms: timeout_ms,
            },
            WsTransportError::Handshake { peer, reason } => {
                TransportError::HandshakeFailed { peer, reason }
            }
            WsTransportError::Io(e) | WsTransportError::Discovery(e) => TransportError::Io(e),
            other @ WsTransportError::Bind { .. } => TransportError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

impl From<WsTransportError> for WcwiError {
    fn from(err: WsTransportError) -> Self {
        WcwiError::Transport(err.into())
    }
}

pub type Result<T> = std::result::Result<T, WsTransportError>;
