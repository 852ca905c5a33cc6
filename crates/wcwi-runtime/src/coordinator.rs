//! Connection coordinator
//!
//! Assigns this peer its role and owns session setup and teardown. A peer is
//! either the host or a joiner for the lifetime of the coordinator:
//!
//! - IP host: WebSocket listener with an accept loop for any number of
//!   joiners, `SERVER:<port>` announcements, and a loopback self-connect so
//!   the local view observes the same stream as remote joiners
//! - IP joiner: one outbound connection, to a given address or to the first
//!   host announced on the local network
//! - Bluetooth host: accepts exactly one joiner
//! - Bluetooth joiner: one RFCOMM connection to a chosen device
//!
//! Failures are reported through the engine's status as well as returned.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use wcwi_bluetooth::{BluetoothDevice, BluetoothError, BluetoothTransport};
use wcwi_core::transport::lock;
use wcwi_core::{
    ConnectionStatus, Frame, LinkDirection, Result, Role, SessionId, TransportKind,
    TransportSession, WcwiError,
};
use wcwi_ws::{
    connect, discover, DiscoveryBroadcaster, DiscoveryConfig, WsListener, WsTransportConfig,
    WsTransportError,
};

use crate::config::CoordinatorConfig;
use crate::engine::SyncEngine;
use crate::retry::retry_with_backoff;

/// Pause after an accept failure that was not a handshake problem
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct ConnectionCoordinator {
    engine: SyncEngine,
    config: CoordinatorConfig,
    ws: WsTransportConfig,
    discovery: DiscoveryConfig,
    bluetooth: Option<BluetoothTransport>,
    active: Mutex<Option<Role>>,
    hosted: Mutex<Option<SocketAddr>>,
    broadcaster: Mutex<Option<DiscoveryBroadcaster>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionCoordinator {
    pub fn new(
        engine: SyncEngine,
        config: CoordinatorConfig,
        ws: WsTransportConfig,
        discovery: DiscoveryConfig,
    ) -> Self {
        Self {
            engine,
            config,
            ws,
            discovery,
            bluetooth: None,
            active: Mutex::new(None),
            hosted: Mutex::new(None),
            broadcaster: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Enable the Bluetooth entry points
    pub fn with_bluetooth(mut self, transport: BluetoothTransport) -> Self {
        self.bluetooth = Some(transport);
        self
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn bluetooth(&self) -> Option<&BluetoothTransport> {
        self.bluetooth.as_ref()
    }

    /// Role claimed so far, if any
    pub fn role(&self) -> Option<Role> {
        *lock(&self.active)
    }

    /// Bound WebSocket address while hosting over IP
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.hosted)
    }

    fn claim(&self, role: Role, operation: &str) -> Result<()> {
        let mut active = lock(&self.active);
        if let Some(current) = *active {
            return Err(WcwiError::RoleMismatch {
                role: current.as_wire().to_string(),
                operation: operation.to_string(),
            });
        }
        *active = Some(role);
        self.engine.set_role(role);
        Ok(())
    }

    fn release(&self) {
        lock(&self.active).take();
    }

    fn fail(&self, err: WcwiError) -> WcwiError {
        let status = match &err {
            WcwiError::Permission(e) => ConnectionStatus::PermissionRequired {
                reason: e.to_string(),
            },
            other => ConnectionStatus::Error {
                reason: other.to_string(),
            },
        };
        self.engine.set_status(status);
        self.release();
        err
    }

    // ------------------------------------------------------------------------
    // IP
    // ------------------------------------------------------------------------

    /// Start hosting over WebSocket and announce the port
    ///
    /// Returns the bound address; joiners are accepted in the background.
    pub async fn host_ip(&self) -> Result<SocketAddr> {
        self.claim(Role::Host, "host over IP")?;

        let listener = match WsListener::bind(&self.ws).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.fail(e.into())),
        };
        let addr = listener.local_addr().map_err(|e| self.fail(e.into()))?;
        *lock(&self.hosted) = Some(addr);

        match DiscoveryBroadcaster::start(&self.discovery, addr.port()).await {
            Ok(broadcaster) => {
                *lock(&self.broadcaster) = Some(broadcaster);
            }
            Err(e) => warn!(error = %e, "Announcements disabled; joiners need the address"),
        }

        self.engine.set_status(ConnectionStatus::Listening {
            transport: TransportKind::Ip,
            endpoint: addr.to_string(),
        });

        let accept_loop = tokio::spawn(accept_joiners(listener, self.engine.clone()));
        lock(&self.tasks).push(accept_loop);

        if self.config.self_connect {
            self.connect_loopback(addr).await;
        }
        Ok(addr)
    }

    /// Join our own listener so the local view sees the shared stream
    async fn connect_loopback(&self, addr: SocketAddr) {
        let host = match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        let port = addr.port();
        let ws = &self.ws;

        let connected = retry_with_backoff(&self.config.retry, "loopback self-connect", move |_| {
            connect(host, port, ws)
        })
        .await;

        match connected {
            Ok(session) => {
                if let Err(e) = self.engine.attach(Arc::new(session), LinkDirection::Upstream) {
                    warn!(error = %e, "Failed to attach loopback session");
                }
            }
            Err(e) => warn!(error = %e, "Hosting without a loopback observer"),
        }
    }

    /// Join the host at `host:port`
    pub async fn join_ip(&self, host: IpAddr, port: u16) -> Result<SessionId> {
        self.claim(Role::Joiner, "join over IP")?;
        let target = SocketAddr::new(host, port);
        self.engine.set_status(ConnectionStatus::Connecting {
            peer: target.to_string(),
        });

        let session = match connect(host, port, &self.ws).await {
            Ok(session) => Arc::new(session),
            Err(e) => return Err(self.fail(e.into())),
        };
        self.start_upstream(session).await
    }

    /// Wait for a host announcement and join it
    ///
    /// `Ok(None)` means no host announced itself within the window.
    pub async fn discover_and_join_ip(&self) -> Result<Option<SessionId>> {
        if let Some(current) = self.role() {
            return Err(WcwiError::RoleMismatch {
                role: current.as_wire().to_string(),
                operation: "discover".to_string(),
            });
        }

        match discover(&self.discovery).await {
            Ok(Some(found)) => self.join_ip(found.address, found.port).await.map(Some),
            Ok(None) => {
                self.engine.set_status(ConnectionStatus::NoPeerFound);
                Ok(None)
            }
            Err(e) => {
                let err: WcwiError = e.into();
                self.engine.set_status(ConnectionStatus::Error {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Bluetooth
    // ------------------------------------------------------------------------

    fn bluetooth_transport(&self) -> Result<&BluetoothTransport> {
        self.bluetooth
            .as_ref()
            .ok_or_else(|| WcwiError::Config("Bluetooth is not available".to_string()))
    }

    /// Advertise the chat service and wait for the one joiner
    pub async fn host_bluetooth(&self) -> Result<SessionId> {
        let transport = self.bluetooth_transport()?;
        self.claim(Role::Host, "host over Bluetooth")?;
        self.engine.set_status(ConnectionStatus::Listening {
            transport: TransportKind::Bluetooth,
            endpoint: transport.config().service_name.clone(),
        });

        let session = match transport.host().await {
            Ok(session) => Arc::new(session),
            Err(e) => return Err(self.fail_bluetooth(e)),
        };
        self.engine
            .attach(session, LinkDirection::Downstream)
            .map_err(|e| self.fail(e))
    }

    /// Connect to a hosting device
    pub async fn join_bluetooth(&self, device: &BluetoothDevice) -> Result<SessionId> {
        let transport = self.bluetooth_transport()?;
        self.claim(Role::Joiner, "join over Bluetooth")?;
        self.engine.set_status(ConnectionStatus::Connecting {
            peer: device.to_string(),
        });

        let session = match transport.join(device).await {
            Ok(session) => Arc::new(session),
            Err(e) => return Err(self.fail_bluetooth(e)),
        };
        self.start_upstream(session).await
    }

    fn fail_bluetooth(&self, err: BluetoothError) -> WcwiError {
        if matches!(err, BluetoothError::Permission(_)) {
            info!(error = %err, "Bluetooth operation aborted for missing permission");
        }
        self.fail(err.into())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Attach a joiner-side session and send the configured greeting
    async fn start_upstream<S>(&self, session: Arc<S>) -> Result<SessionId>
    where
        S: TransportSession + 'static,
    {
        let id = self
            .engine
            .attach(session.clone(), LinkDirection::Upstream)
            .map_err(|e| self.fail(e))?;

        if let Some(name) = &self.config.greeting {
            let hello = Frame::Hello { name: name.clone() };
            if let Err(e) = session.send(&hello).await {
                warn!(session = %id, error = %e, "Failed to send greeting");
            }
        }
        Ok(id)
    }

    /// Stop announcing and accepting, and close every session
    pub async fn shutdown(&self) {
        if let Some(broadcaster) = lock(&self.broadcaster).take() {
            broadcaster.stop();
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        lock(&self.hosted).take();
        self.engine.shutdown().await;
        self.release();
        info!("Coordinator stopped");
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

/// Accept joiners until the listener fails for good or the task is aborted
async fn accept_joiners(listener: WsListener, engine: SyncEngine) {
    loop {
        match listener.accept().await {
            Ok(session) => {
                if let Err(e) = engine.attach(Arc::new(session), LinkDirection::Downstream) {
                    warn!(error = %e, "Failed to attach joiner");
                }
            }
            Err(WsTransportError::Handshake { peer, reason }) => {
                debug!(peer = %peer, reason = %reason, "Rejected connection");
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}
