//! Command dispatch
//!
//! Every sub-command builds what it needs from the [`AppConfig`]. Hosting and
//! joining end in the interactive terminal; the other commands print and
//! exit.

use std::net::SocketAddr;
use tracing::info;

use wcwi_bluetooth::{BluetoothDevice, ScanEvent};
use wcwi_core::MessageStore;
use wcwi_runtime::Role;

use crate::app::{bluetooth_transport, WcwiApp};
use crate::cli::{Cli, Commands, TransportArg};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::terminal_interface::{format_message, run_interactive};

pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Host {
                transport,
                port,
                no_loopback,
            } => Self::host(host_config(config, port, no_loopback), transport).await,
            Commands::Join {
                transport,
                address,
                device,
                name,
            } => {
                let config = join_config(config, name);
                match (transport, address, device) {
                    (TransportArg::Ip, address, None) => Self::join_ip(config, address).await,
                    (TransportArg::Bluetooth, None, Some(device)) => {
                        Self::join_bluetooth(config, BluetoothDevice::new(device)).await
                    }
                    (TransportArg::Ip, _, Some(_)) => Err(CliError::InvalidArgument(
                        "--device only applies to --transport bluetooth".to_string(),
                    )),
                    (TransportArg::Bluetooth, Some(_), _) => Err(CliError::InvalidArgument(
                        "--address only applies to --transport ip".to_string(),
                    )),
                    (TransportArg::Bluetooth, None, None) => Err(CliError::InvalidArgument(
                        "--device is required to join over Bluetooth".to_string(),
                    )),
                }
            }
            Commands::Devices { scan } => Self::devices(&config, scan).await,
            Commands::Discover => Self::discover(&config).await,
            Commands::History { json } => Self::history(&config, json),
        }
    }

    // ------------------------------------------------------------------------
    // Hosting and Joining
    // ------------------------------------------------------------------------

    async fn host(config: AppConfig, transport: TransportArg) -> Result<()> {
        let app = match transport {
            TransportArg::Ip => {
                let app = WcwiApp::new(config, Role::Host)?;
                let addr = app.coordinator().host_ip().await?;
                println!("Hosting on port {}", addr.port());
                app
            }
            TransportArg::Bluetooth => {
                let app = WcwiApp::with_bluetooth(config, Role::Host).await?;
                println!(
                    "Waiting for a joiner on {}",
                    app.config().bluetooth.service_name
                );
                app.coordinator().host_bluetooth().await?;
                app
            }
        };
        Self::chat(app).await
    }

    async fn join_ip(config: AppConfig, address: Option<SocketAddr>) -> Result<()> {
        let app = WcwiApp::new(config, Role::Joiner)?;
        match address {
            Some(address) => {
                app.coordinator()
                    .join_ip(address.ip(), address.port())
                    .await?;
            }
            None => {
                println!("Looking for a host on the local network...");
                if app.coordinator().discover_and_join_ip().await?.is_none() {
                    println!("{}", app.engine().status());
                    return Ok(());
                }
            }
        }
        Self::chat(app).await
    }

    async fn join_bluetooth(config: AppConfig, device: BluetoothDevice) -> Result<()> {
        let app = WcwiApp::with_bluetooth(config, Role::Joiner).await?;
        app.coordinator().join_bluetooth(&device).await?;
        Self::chat(app).await
    }

    async fn chat(app: WcwiApp) -> Result<()> {
        println!("{}", app.engine().status());
        let result = run_interactive(app.engine()).await;
        app.shutdown().await;
        result
    }

    // ------------------------------------------------------------------------
    // One-shot Commands
    // ------------------------------------------------------------------------

    async fn devices(config: &AppConfig, scan: bool) -> Result<()> {
        let transport = bluetooth_transport(config).await?;
        let discovery = transport.discovery();

        let paired = discovery.paired_devices().await?;
        if paired.is_empty() {
            println!("No paired devices");
        } else {
            println!("Paired devices:");
            for device in &paired {
                println!("  {}", device);
            }
        }

        if scan {
            println!("Scanning...");
            let mut events = discovery.start_scan().await?;
            while let Some(event) = events.recv().await {
                match event {
                    ScanEvent::DeviceFound(device) => println!("  {}", device),
                    ScanEvent::Finished => break,
                }
            }
            info!("Scan complete");
        }
        Ok(())
    }

    async fn discover(config: &AppConfig) -> Result<()> {
        match wcwi_ws::discover(&config.discovery).await? {
            Some(host) => println!("Found host at {}:{}", host.address, host.port),
            None => println!("No server found"),
        }
        Ok(())
    }

    fn history(config: &AppConfig, json: bool) -> Result<()> {
        let store = MessageStore::open(config.store.clone())?;
        if json {
            println!("{}", serde_json::to_string_pretty(store.all())?);
        } else if store.is_empty() {
            println!("No messages");
        } else {
            for message in store.all() {
                println!("{}", format_message(message));
            }
        }
        Ok(())
    }
}

/// Apply `host` flags on top of the loaded configuration
fn host_config(mut config: AppConfig, port: Option<u16>, no_loopback: bool) -> AppConfig {
    if let Some(port) = port {
        config.websocket.port = port;
    }
    if no_loopback {
        config.coordinator.self_connect = false;
    }
    config
}

/// Apply `join` flags on top of the loaded configuration
fn join_config(mut config: AppConfig, name: Option<String>) -> AppConfig {
    if name.is_some() {
        config.identity.name = name;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_flags_override_config() {
        let config = host_config(AppConfig::default(), Some(7001), true);
        assert_eq!(config.websocket.port, 7001);
        assert!(!config.coordinator.self_connect);

        let config = host_config(AppConfig::default(), None, false);
        assert_eq!(config.websocket, AppConfig::default().websocket);
        assert!(config.coordinator.self_connect);
    }

    #[test]
    fn join_name_overrides_identity() {
        let mut base = AppConfig::default();
        base.identity.name = Some("from-file".to_string());

        let config = join_config(base.clone(), None);
        assert_eq!(config.identity.name.as_deref(), Some("from-file"));

        let config = join_config(base, Some("flag".to_string()));
        assert_eq!(config.coordinator_config().greeting.as_deref(), Some("flag"));
    }
}
