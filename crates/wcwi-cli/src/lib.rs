//! WCWI CLI library
//!
//! Pieces of the `wcwi` binary, exposed so they can be tested:
//! - [`cli`]: argument parsing
//! - [`config`]: TOML configuration covering every layer
//! - [`app`]: engine, coordinator and Bluetooth wiring
//! - [`commands`]: sub-command dispatch
//! - [`terminal_interface`]: stdin commands and event output

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod terminal_interface;

pub use app::WcwiApp;
pub use cli::{Cli, Commands, TransportArg};
pub use config::AppConfig;
pub use error::{CliError, Result};
