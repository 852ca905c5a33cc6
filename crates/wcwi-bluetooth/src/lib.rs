//! Bluetooth serial transport for WCWI
//!
//! This crate provides the Bluetooth variant of the `TransportSession` from
//! `wcwi-core`. RFCOMM links are plain byte streams read with blocking calls,
//! so every session runs a dedicated reader thread and writer thread whose
//! output joins the same incoming frame channel the WebSocket variant uses.
//!
//! ## Architecture
//!
//! - [`config`] - Service UUID, name, channel and scan settings
//! - [`error`] - Error types specific to this transport
//! - [`link`] - Blocking reader/writer pair plus a shutdown handle
//! - [`session`] - Serial session with line reassembly
//! - [`adapter`] - Platform seam: power, permissions, paired devices, scan, RFCOMM
//! - [`discovery`] - Paired listing and windowed scanning
//! - [`transport`] - Host (one joiner) and join entry points
//!
//! ## Platform Support
//!
//! - **Linux**: BlueZ via `bluer`, enabled with the `bluez` feature
//! - **Other platforms**: bring your own [`BluetoothAdapter`]

pub mod adapter;
pub mod config;
pub mod discovery;
pub mod error;
pub mod link;
pub mod session;
pub mod transport;

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", feature = "bluez"))] {
        pub mod bluez;
        pub use bluez::BluezAdapter;
    }
}

pub use adapter::{BluetoothAdapter, BluetoothDevice, BluetoothOperation};
pub use config::{BluetoothTransportConfig, SERVICE_NAME, SPP_UUID};
pub use discovery::{BluetoothDiscovery, ScanEvent};
pub use error::{BluetoothError, Result};
pub use link::{LinkShutdown, SerialLink};
pub use session::SerialSession;
pub use transport::BluetoothTransport;
