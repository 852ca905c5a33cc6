//! BlueZ adapter (Linux)
//!
//! Hosting registers an RFCOMM profile with the Serial Port Profile UUID and
//! the chat service name, then accepts the first connect request. Joining
//! dials the device on the configured RFCOMM channel. The async `bluer`
//! stream is bridged to blocking `Read`/`Write` halves for the session's
//! worker threads; a duplicate of the socket descriptor is kept for shutdown.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, Role as ProfileRole, SocketAddr, Stream};
use bluer::{Address, AdapterEvent, ErrorKind};
use futures::StreamExt;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

use wcwi_core::transport::lock;
use wcwi_core::PermissionError;

use crate::adapter::{BluetoothAdapter, BluetoothDevice, BluetoothOperation};
use crate::config::BluetoothTransportConfig;
use crate::error::{BluetoothError, Result};
use crate::link::{LinkShutdown, SerialLink};

// ----------------------------------------------------------------------------
// Error Mapping
// ----------------------------------------------------------------------------

fn map_error(err: bluer::Error, operation: BluetoothOperation) -> BluetoothError {
    match err.kind {
        ErrorKind::NotAuthorized | ErrorKind::NotPermitted => {
            BluetoothError::Permission(PermissionError::Denied(format!("{}: {}", operation, err)))
        }
        ErrorKind::NotReady | ErrorKind::NotAvailable => {
            BluetoothError::AdapterUnavailable(err.to_string())
        }
        _ => match operation {
            BluetoothOperation::Discover => BluetoothError::ScanFailed(err.to_string()),
            BluetoothOperation::Listen => BluetoothError::ListenFailed(err.to_string()),
            BluetoothOperation::Connect => BluetoothError::AdapterUnavailable(err.to_string()),
        },
    }
}

fn map_io(err: io::Error, operation: BluetoothOperation) -> BluetoothError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return BluetoothError::Permission(PermissionError::Missing {
            permission: operation.permission().to_string(),
            operation: operation.to_string(),
        });
    }
    BluetoothError::Io(err)
}

// ----------------------------------------------------------------------------
// Socket Link
// ----------------------------------------------------------------------------

/// Shuts an RFCOMM socket down through a duplicated descriptor that stays
/// open after the worker halves are dropped
struct SocketShutdown(OwnedFd);

impl SocketShutdown {
    fn from_fd(fd: BorrowedFd<'_>) -> io::Result<Self> {
        Ok(Self(fd.try_clone_to_owned()?))
    }

    fn for_stream(stream: &Stream) -> io::Result<Self> {
        // SAFETY: `stream` owns the descriptor and outlives this borrow
        let fd = unsafe { BorrowedFd::borrow_raw(stream.as_raw_fd()) };
        Self::from_fd(fd)
    }
}

impl LinkShutdown for SocketShutdown {
    fn shutdown(&self) -> io::Result<()> {
        match nix::sys::socket::shutdown(self.0.as_raw_fd(), nix::sys::socket::Shutdown::Both) {
            Ok(()) | Err(nix::errno::Errno::ENOTCONN) | Err(nix::errno::Errno::EBADF) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

fn link_from_stream(stream: Stream, peer: String) -> io::Result<SerialLink> {
    let shutdown = SocketShutdown::for_stream(&stream)?;
    let (read_half, write_half) = stream.into_split();
    let handle = tokio::runtime::Handle::current();
    let reader = SyncIoBridge::new_with_handle(read_half, handle.clone());
    let writer = SyncIoBridge::new_with_handle(write_half, handle);
    Ok(SerialLink::new(peer, reader, writer, shutdown))
}

// ----------------------------------------------------------------------------
// BlueZ Adapter
// ----------------------------------------------------------------------------

pub struct BluezAdapter {
    session: bluer::Session,
    adapter: bluer::Adapter,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl BluezAdapter {
    /// Connect to bluetoothd and pick the default adapter
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| BluetoothError::AdapterUnavailable(e.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| BluetoothError::AdapterUnavailable(e.to_string()))?;
        info!(adapter = %adapter.name(), "Using BlueZ adapter");
        Ok(Self {
            session,
            adapter,
            scan: Mutex::new(None),
        })
    }

    async fn describe(&self, address: Address) -> Option<BluetoothDevice> {
        let device = self.adapter.device(address).ok()?;
        let paired = device.is_paired().await.unwrap_or(false);
        let name = device.name().await.ok().flatten();
        Some(BluetoothDevice {
            address: address.to_string(),
            name,
            paired,
        })
    }
}

#[async_trait]
impl BluetoothAdapter for BluezAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        self.adapter
            .is_powered()
            .await
            .map_err(|e| map_error(e, BluetoothOperation::Connect))
    }

    async fn check_permission(&self, operation: BluetoothOperation) -> Result<()> {
        // bluetoothd enforces access through D-Bus policy; check it up front
        self.adapter
            .address()
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, operation))
    }

    async fn paired_devices(&self) -> Result<Vec<BluetoothDevice>> {
        let addresses = self
            .adapter
            .device_addresses()
            .await
            .map_err(|e| map_error(e, BluetoothOperation::Connect))?;

        let mut devices = Vec::new();
        for address in addresses {
            if let Some(device) = self.describe(address).await {
                if device.paired {
                    devices.push(device);
                }
            }
        }
        Ok(devices)
    }

    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<BluetoothDevice>> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(|e| map_error(e, BluetoothOperation::Discover))?;

        let (found, receiver) = mpsc::unbounded_channel();
        let adapter = self.adapter.clone();
        let task = tokio::spawn(async move {
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                let AdapterEvent::DeviceAdded(address) = event else {
                    continue;
                };
                let Ok(device) = adapter.device(address) else {
                    continue;
                };
                let found_device = BluetoothDevice {
                    address: address.to_string(),
                    name: device.name().await.ok().flatten(),
                    paired: device.is_paired().await.unwrap_or(false),
                };
                if found.send(found_device).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = lock(&self.scan).replace(task) {
            previous.abort();
        }
        Ok(receiver)
    }

    async fn stop_scan(&self) -> Result<()> {
        // Dropping the discovery stream ends the BlueZ discovery session
        if let Some(task) = lock(&self.scan).take() {
            task.abort();
            debug!("BlueZ discovery stopped");
        }
        Ok(())
    }

    async fn listen(&self, config: &BluetoothTransportConfig) -> Result<SerialLink> {
        let uuid = bluer::Uuid::parse_str(&config.service_uuid)
            .map_err(|_| BluetoothError::InvalidServiceUuid(config.service_uuid.clone()))?;
        let profile = Profile {
            uuid,
            name: Some(config.service_name.clone()),
            channel: Some(u16::from(config.rfcomm_channel)),
            role: Some(ProfileRole::Server),
            require_authentication: Some(false),
            require_authorization: Some(false),
            ..Default::default()
        };

        let mut requests = self
            .session
            .register_profile(profile)
            .await
            .map_err(|e| map_error(e, BluetoothOperation::Listen))?;

        let request = requests
            .next()
            .await
            .ok_or_else(|| BluetoothError::ListenFailed("profile unregistered".to_string()))?;
        let peer = request.device().to_string();
        let stream = request
            .accept()
            .map_err(|e| map_error(e, BluetoothOperation::Listen))?;
        // Dropping the handle unregisters the profile: one joiner only
        drop(requests);

        link_from_stream(stream, peer).map_err(BluetoothError::Io)
    }

    async fn connect(
        &self,
        device: &BluetoothDevice,
        config: &BluetoothTransportConfig,
    ) -> Result<SerialLink> {
        let address: Address = device
            .address
            .parse()
            .map_err(|_| BluetoothError::DeviceNotFound {
                address: device.address.clone(),
            })?;

        let target = SocketAddr::new(address, config.rfcomm_channel);
        let stream = Stream::connect(target).await.map_err(|e| {
            warn!(device = %device, error = %e, "RFCOMM connect failed");
            match map_io(e, BluetoothOperation::Connect) {
                BluetoothError::Io(e) => BluetoothError::ConnectFailed {
                    address: device.address.clone(),
                    reason: e.to_string(),
                },
                other => other,
            }
        })?;

        link_from_stream(stream, device.address.clone()).map_err(BluetoothError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsFd;
    use std::time::Duration;

    #[test]
    fn shutdown_reaches_socket_after_original_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut remote, _) = listener.accept().unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let handle = SocketShutdown::from_fd(local.as_fd()).unwrap();
        drop(local);

        handle.shutdown().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);

        // A second shutdown on a dead socket is still fine
        handle.shutdown().unwrap();
    }
}
