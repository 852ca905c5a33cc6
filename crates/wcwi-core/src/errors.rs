//! Error types for the WCWI core
//!
//! This module contains the error taxonomy used throughout the workspace:
//! transport failures, protocol (wire) errors, storage failures and missing
//! permissions, plus the `WcwiError` type that unifies them all.
//!
//! Discovery timeouts are deliberately absent: "no peer found" is a normal
//! `None` result, not an error.

use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures of a transport session or of establishing one
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {peer} failed: {reason}")]
    ConnectFailed { peer: String, reason: String },
    #[error("Handshake with {peer} failed: {reason}")]
    HandshakeFailed { peer: String, reason: String },
    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },
    #[error("Session with {peer} is closed")]
    SessionClosed { peer: String },
    #[error("Incoming stream of session {session} was already taken")]
    IncomingTaken { session: String },
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Transport unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while decoding a single wire line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty frame")]
    Empty,
    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("{kind} frame is missing the {field} field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("Unknown sender role: {0}")]
    UnknownRole(String),
    #[error("Image payload is not valid base64: {0}")]
    InvalidPayload(String),
}

/// Wire protocol level failures; never fatal to a session
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Parse(#[from] ParseError),
    #[error("Unexpected frame from {peer}: {reason}")]
    Unexpected { peer: String, reason: String },
}

/// Persistence failures of the message store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Corrupt message log {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize message log: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Message {id} already exists")]
    DuplicateId { id: String },
}

/// A required OS permission is missing (Bluetooth only)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("Permission {permission} is required for {operation}")]
    Missing {
        permission: String,
        operation: String,
    },
    #[error("Access denied by the platform: {0}")]
    Denied(String),
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Umbrella error for the WCWI workspace
#[derive(Debug, thiserror::Error)]
pub enum WcwiError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation not allowed for role {role}: {operation}")]
    RoleMismatch { role: String, operation: String },
}

impl From<ParseError> for WcwiError {
    fn from(err: ParseError) -> Self {
        WcwiError::Protocol(ProtocolError::Parse(err))
    }
}

pub type Result<T> = std::result::Result<T, WcwiError>;
