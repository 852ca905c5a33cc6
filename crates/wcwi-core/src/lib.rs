//! WCWI Core
//!
//! This crate provides the foundational pieces of the WCWI two-peer chat:
//! the data model, the line-oriented wire protocol, duplicate filtering, the
//! append-only message store and the transport session abstraction shared by
//! the IP (WebSocket) and Bluetooth serial transports.
//!
//! Transport implementations live in `wcwi-ws` and `wcwi-bluetooth`; the
//! synchronization engine that ties everything together lives in
//! `wcwi-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod events;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{DedupConfig, StoreConfig};
pub use errors::{
    ParseError, PermissionError, ProtocolError, Result, StorageError, TransportError, WcwiError,
};
pub use events::{ConnectionStatus, EngineEvent, EventBus};
pub use protocol::{DedupFilter, Frame, FrameCodec, LineBuffer};
pub use store::MessageStore;
pub use transport::{
    Incoming, LinkDirection, SessionCore, SessionId, SessionState, TransportSession,
};
pub use types::{
    AttachmentRef, ChatMessage, MessageId, Role, Sender, Timestamp, TransportKind,
    REMOVED_NOTICE,
};

#[cfg(any(test, feature = "testing"))]
pub use transport::memory::MemorySession;
