//! WebSocket transport and discovery configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 9876;

/// Port used by the desktop build
pub const DESKTOP_WS_PORT: u16 = 8765;

/// Default UDP discovery port
pub const DEFAULT_DISCOVERY_PORT: u16 = 8888;

// ----------------------------------------------------------------------------
// WebSocket Configuration
// ----------------------------------------------------------------------------

/// Configuration for the WebSocket transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsTransportConfig {
    /// Address the host listens on
    pub bind_address: IpAddr,
    /// Port the host listens on; 0 picks a free port
    pub port: u16,
    /// Request path of the chat endpoint
    pub path: String,
    /// Maximum time for an outbound connect including the handshake
    pub connect_timeout_ms: u64,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_WS_PORT,
            path: "/ws".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl WsTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `ws://<host>:<port><path>`
    pub fn url_for(&self, host: IpAddr, port: u16) -> String {
        match host {
            IpAddr::V4(v4) => format!("ws://{}:{}{}", v4, port, self.path),
            IpAddr::V6(v6) => format!("ws://[{}]:{}{}", v6, port, self.path),
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery Configuration
// ----------------------------------------------------------------------------

/// Configuration for UDP broadcast discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// UDP port announcements are sent to and received on
    pub port: u16,
    /// Interval between host announcements
    pub broadcast_interval_ms: u64,
    /// How long a joiner waits for an announcement
    pub receive_timeout_ms: u64,
    /// Announcement payload prefix, followed by the WebSocket port
    pub announce_prefix: String,
    /// Fixed announcement target; computed from the local interface when unset
    pub broadcast_address: Option<Ipv4Addr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            broadcast_interval_ms: 2_000,
            receive_timeout_ms: 10_000,
            announce_prefix: "SERVER:".to_string(),
            broadcast_address: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_broadcast_address(mut self, address: Ipv4Addr) -> Self {
        self.broadcast_address = Some(address);
        self
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_app() {
        let ws = WsTransportConfig::default();
        assert_eq!(ws.port, 9876);
        assert_eq!(ws.path, "/ws");

        let discovery = DiscoveryConfig::default();
        assert_eq!(discovery.port, 8888);
        assert_eq!(discovery.broadcast_interval(), Duration::from_secs(2));
        assert_eq!(discovery.receive_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn urls_bracket_ipv6_hosts() {
        let ws = WsTransportConfig::default();
        assert_eq!(
            ws.url_for("192.168.1.4".parse().unwrap(), 9876),
            "ws://192.168.1.4:9876/ws"
        );
        assert_eq!(ws.url_for("::1".parse().unwrap(), 1), "ws://[::1]:1/ws");
    }
}
