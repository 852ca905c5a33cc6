//! WebSocket transport for WCWI
//!
//! This crate provides the IP variant of the `TransportSession` from
//! `wcwi-core`: a WebSocket listener for the host, an outbound connector for
//! joiners, and UDP broadcast discovery so joiners can find the host without
//! typing an address.
//!
//! ## Architecture
//!
//! - [`config`] - WebSocket and discovery settings
//! - [`error`] - Error types specific to this transport
//! - [`session`] - Event-driven session over a WebSocket stream
//! - [`server`] - Host-side listener and handshake path check
//! - [`client`] - Joiner-side connector
//! - [`discovery`] - `SERVER:<port>` announcements over UDP broadcast

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod server;
pub mod session;

pub use client::{connect, ClientSession};
pub use config::{DiscoveryConfig, WsTransportConfig, DEFAULT_DISCOVERY_PORT, DEFAULT_WS_PORT};
pub use discovery::{
    discover, local_broadcast_address, subnet_broadcast, DiscoveredHost, DiscoveryBroadcaster,
    DiscoveryListener,
};
pub use error::{Result, WsTransportError};
pub use server::{ServerSession, WsListener};
pub use session::WsSession;
