//! UDP broadcast discovery
//!
//! A host announces `SERVER:<port>` on the discovery port every couple of
//! seconds, addressed to the subnet broadcast address of its interface. A
//! joiner listens for a bounded time and returns the first well-formed
//! announcement, or `None` when the window closes without one.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{Result, WsTransportError};

/// Largest announcement we care to read
const MAX_DATAGRAM: usize = 512;

// ----------------------------------------------------------------------------
// Broadcast Address
// ----------------------------------------------------------------------------

/// Directed broadcast address `(ip & mask) | !mask`
///
/// `None` when either input is unspecified.
pub fn subnet_broadcast(ip: Ipv4Addr, mask: Ipv4Addr) -> Option<Ipv4Addr> {
    if ip.is_unspecified() || mask.is_unspecified() {
        return None;
    }
    let ip = u32::from(ip);
    let mask = u32::from(mask);
    Some(Ipv4Addr::from((ip & mask) | !mask))
}

/// Broadcast address of the first non-loopback IPv4 interface
///
/// Falls back to the limited broadcast address `255.255.255.255`.
pub fn local_broadcast_address() -> Ipv4Addr {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate interfaces, using limited broadcast");
            return Ipv4Addr::BROADCAST;
        }
    };

    interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match &iface.addr {
            if_addrs::IfAddr::V4(v4) => subnet_broadcast(v4.ip, v4.netmask),
            _ => None,
        })
        .unwrap_or(Ipv4Addr::BROADCAST)
}

/// Extract the port from an announcement payload
pub fn parse_announcement(payload: &[u8], prefix: &str) -> Option<u16> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    let port: u16 = text.strip_prefix(prefix)?.trim().parse().ok()?;
    (port != 0).then_some(port)
}

// ----------------------------------------------------------------------------
// Host Side
// ----------------------------------------------------------------------------

/// Periodic announcer; stops when stopped or dropped
#[derive(Debug)]
pub struct DiscoveryBroadcaster {
    target: SocketAddr,
    task: JoinHandle<()>,
}

impl DiscoveryBroadcaster {
    /// Start announcing `ws_port` every configured interval
    pub async fn start(config: &DiscoveryConfig, ws_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(WsTransportError::Discovery)?;
        socket.set_broadcast(true).map_err(WsTransportError::Discovery)?;

        let address = config
            .broadcast_address
            .unwrap_or_else(local_broadcast_address);
        let target = SocketAddr::new(IpAddr::V4(address), config.port);
        let payload = format!("{}{}", config.announce_prefix, ws_port).into_bytes();
        let period = config.broadcast_interval().max(Duration::from_millis(10));

        info!(dest = %target, ws_port, "Announcing host");
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match socket.send_to(&payload, target).await {
                    Ok(_) => debug!(dest = %target, "Sent announcement"),
                    Err(e) => warn!(dest = %target, error = %e, "Announcement failed"),
                }
            }
        });

        Ok(Self { target, task })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DiscoveryBroadcaster {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ----------------------------------------------------------------------------
// Joiner Side
// ----------------------------------------------------------------------------

/// A host found through an announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub address: IpAddr,
    pub port: u16,
}

#[derive(Debug)]
pub struct DiscoveryListener {
    socket: UdpSocket,
    prefix: String,
}

impl DiscoveryListener {
    /// Bind the discovery port on all interfaces
    pub async fn bind(config: &DiscoveryConfig) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| WsTransportError::Bind { addr, source })?;
        Ok(Self {
            socket,
            prefix: config.announce_prefix.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait up to `window` for an announcement
    ///
    /// Malformed datagrams are ignored and do not extend the window.
    pub async fn listen(&self, window: Duration) -> Result<Option<DiscoveredHost>> {
        let deadline = Instant::now() + window;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Err(_) => {
                    info!(window_ms = window.as_millis() as u64, "No host announcement received");
                    return Ok(None);
                }
                Ok(Err(e)) => return Err(WsTransportError::Discovery(e)),
                Ok(Ok(received)) => received,
            };

            match parse_announcement(&buf[..len], &self.prefix) {
                Some(port) => {
                    info!(host = %from.ip(), port, "Discovered host");
                    return Ok(Some(DiscoveredHost {
                        address: from.ip(),
                        port,
                    }));
                }
                None => debug!(from = %from, len, "Ignoring malformed announcement"),
            }
        }
    }
}

/// Bind the discovery port and wait for one announcement
pub async fn discover(config: &DiscoveryConfig) -> Result<Option<DiscoveredHost>> {
    let listener = DiscoveryListener::bind(config).await?;
    listener.listen(config.receive_timeout()).await
}
