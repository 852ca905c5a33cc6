//! WCWI runtime
//!
//! This crate contains the orchestration layer of the two-peer chat:
//! - [`SyncEngine`]: applies frames from every session exactly once, persists
//!   them, relays them when hosting and publishes events for the front-end
//! - [`ConnectionCoordinator`]: claims the host or joiner role and owns
//!   session setup over WebSocket or Bluetooth
//! - [`RetryPolicy`]: bounded exponential backoff, used for the host's
//!   loopback self-connect
//!
//! Protocol types, storage and the session abstraction come from
//! `wcwi-core`; the transports come from `wcwi-ws` and `wcwi-bluetooth`.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod retry;

pub use config::{CoordinatorConfig, EngineConfig};
pub use coordinator::ConnectionCoordinator;
pub use engine::{DeleteOutcome, SyncEngine};
pub use retry::{retry_with_backoff, RetryPolicy};

// Re-export core types for convenience
pub use wcwi_core::{
    ChatMessage, ConnectionStatus, EngineEvent, Frame, LinkDirection, MessageId, Result, Role,
    Sender, SessionId, WcwiError,
};
