//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for messages and attachments
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,
}

/// Link used to host or join
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// WebSocket over the local network
    Ip,
    /// Bluetooth serial (RFCOMM)
    Bluetooth,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Host a chat and wait for joiners
    Host {
        #[arg(short, long, value_enum, default_value_t = TransportArg::Ip)]
        transport: TransportArg,
        /// WebSocket port (IP only)
        #[arg(short, long)]
        port: Option<u16>,
        /// Do not join our own listener over loopback
        #[arg(long)]
        no_loopback: bool,
    },
    /// Join a hosted chat
    Join {
        #[arg(short, long, value_enum, default_value_t = TransportArg::Ip)]
        transport: TransportArg,
        /// Host address as ip:port; without it the host is discovered
        #[arg(short, long)]
        address: Option<SocketAddr>,
        /// Bluetooth address of the hosting device
        #[arg(long)]
        device: Option<String>,
        /// Display name announced to the host
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List paired Bluetooth devices
    Devices {
        /// Also scan for nearby devices
        #[arg(short, long)]
        scan: bool,
    },
    /// Listen for a host announcement on the local network
    Discover,
    /// Print the stored conversation
    History {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
}
