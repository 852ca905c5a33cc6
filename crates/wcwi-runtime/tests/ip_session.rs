//! End-to-end coordination over loopback WebSocket and UDP

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use wcwi_core::StoreConfig;
use wcwi_runtime::{
    ChatMessage, ConnectionCoordinator, ConnectionStatus, CoordinatorConfig, DeleteOutcome,
    EngineConfig, EngineEvent, RetryPolicy, Role, Sender, SyncEngine, WcwiError,
};
use wcwi_ws::{DiscoveryConfig, WsTransportConfig};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const WAIT: Duration = Duration::from_secs(3);

fn ws_config() -> WsTransportConfig {
    WsTransportConfig::new()
        .with_bind_address(LOCALHOST)
        .with_port(0)
        .with_connect_timeout(Duration::from_secs(2))
}

/// A UDP port that was free a moment ago
fn free_udp_port() -> u16 {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    socket.local_addr().unwrap().port()
}

fn discovery_config(port: u16) -> DiscoveryConfig {
    DiscoveryConfig::new()
        .with_port(port)
        .with_broadcast_address(Ipv4Addr::LOCALHOST)
        .with_broadcast_interval(Duration::from_millis(50))
        .with_receive_timeout(Duration::from_secs(3))
}

fn coordinator(
    role: Role,
    dir: &TempDir,
    config: CoordinatorConfig,
    discovery: DiscoveryConfig,
) -> ConnectionCoordinator {
    let engine = SyncEngine::open(role, &EngineConfig::new(StoreConfig::new(dir.path()))).unwrap();
    let config = config.with_retry(
        RetryPolicy::default().with_initial_delay(Duration::from_millis(20)),
    );
    ConnectionCoordinator::new(engine, config, ws_config(), discovery)
}

async fn next_applied(events: &mut broadcast::Receiver<EngineEvent>) -> ChatMessage {
    timeout(WAIT, async {
        loop {
            if let Ok(EngineEvent::MessageApplied(message)) = events.recv().await {
                return message;
            }
        }
    })
    .await
    .expect("no message applied")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

// ----------------------------------------------------------------------------
// Hosting and Joining
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_joiner_message_is_applied_once_by_host() {
    let host_dir = TempDir::new().unwrap();
    let joiner_dir = TempDir::new().unwrap();
    let host = coordinator(
        Role::Host,
        &host_dir,
        CoordinatorConfig::default(),
        discovery_config(free_udp_port()),
    );
    let addr = host.host_ip().await.unwrap();
    assert_eq!(host.role(), Some(Role::Host));

    // Loopback observer plus its accepted server side
    wait_until(|| host.engine().session_count() == 2).await;

    let joiner = coordinator(
        Role::Joiner,
        &joiner_dir,
        CoordinatorConfig::default(),
        discovery_config(free_udp_port()),
    );
    let mut host_events = host.engine().subscribe();
    joiner.join_ip(LOCALHOST, addr.port()).await.unwrap();
    wait_until(|| host.engine().session_count() == 3).await;

    let sent = joiner.engine().send_text("Hello").await;
    let applied = next_applied(&mut host_events).await;
    assert_eq!(applied.id, sent.id);
    assert_eq!(applied.sender, Sender::Joiner);

    // The relayed copy comes back over loopback and must be filtered
    sleep(Duration::from_millis(100)).await;
    assert_eq!(host.engine().messages().len(), 1);
    assert_eq!(joiner.engine().messages().len(), 1);

    joiner.shutdown().await;
    host.shutdown().await;
}

#[tokio::test]
async fn test_host_message_reaches_joiner_and_delete_is_bilateral() {
    let host_dir = TempDir::new().unwrap();
    let joiner_dir = TempDir::new().unwrap();
    let host = coordinator(
        Role::Host,
        &host_dir,
        CoordinatorConfig::default().with_self_connect(false),
        discovery_config(free_udp_port()),
    );
    let addr = host.host_ip().await.unwrap();

    let joiner = coordinator(
        Role::Joiner,
        &joiner_dir,
        CoordinatorConfig::default(),
        discovery_config(free_udp_port()),
    );
    let mut joiner_events = joiner.engine().subscribe();
    joiner.join_ip(LOCALHOST, addr.port()).await.unwrap();
    wait_until(|| host.engine().session_count() == 1).await;

    let sent = host.engine().send_text("from the host").await;
    let applied = next_applied(&mut joiner_events).await;
    assert_eq!(applied.id, sent.id);
    assert_eq!(applied.sender, Sender::Host);

    assert_eq!(
        host.engine().request_delete(&sent.id).await,
        DeleteOutcome::Bilateral
    );
    let notice = next_applied(&mut joiner_events).await;
    assert_eq!(notice.sender, Sender::System);
    assert!(joiner.engine().messages().iter().all(|m| m.id != sent.id));

    joiner.shutdown().await;
    host.shutdown().await;
}

#[tokio::test]
async fn test_greeting_is_reported_to_host() {
    let host_dir = TempDir::new().unwrap();
    let joiner_dir = TempDir::new().unwrap();
    let host = coordinator(
        Role::Host,
        &host_dir,
        CoordinatorConfig::default().with_self_connect(false),
        discovery_config(free_udp_port()),
    );
    let mut host_events = host.engine().subscribe();
    let addr = host.host_ip().await.unwrap();

    let joiner = coordinator(
        Role::Joiner,
        &joiner_dir,
        CoordinatorConfig::default().with_greeting("alice"),
        discovery_config(free_udp_port()),
    );
    joiner.join_ip(LOCALHOST, addr.port()).await.unwrap();

    let name = timeout(WAIT, async {
        loop {
            if let Ok(EngineEvent::PeerGreeted { name }) = host_events.recv().await {
                return name;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(name, "alice");
    assert!(host.engine().messages().is_empty());
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_joiner_finds_host_by_announcement() {
    let host_dir = TempDir::new().unwrap();
    let joiner_dir = TempDir::new().unwrap();
    let port = free_udp_port();
    let host = coordinator(
        Role::Host,
        &host_dir,
        CoordinatorConfig::default().with_self_connect(false),
        discovery_config(port),
    );
    host.host_ip().await.unwrap();

    let joiner = coordinator(
        Role::Joiner,
        &joiner_dir,
        CoordinatorConfig::default(),
        discovery_config(port),
    );
    let joined = joiner.discover_and_join_ip().await.unwrap();
    assert!(joined.is_some());
    assert_eq!(joiner.role(), Some(Role::Joiner));
    wait_until(|| host.engine().session_count() == 1).await;

    joiner.shutdown().await;
    host.shutdown().await;
}

#[tokio::test]
async fn test_no_announcement_reports_no_peer() {
    let dir = TempDir::new().unwrap();
    let discovery = discovery_config(free_udp_port()).with_receive_timeout(Duration::from_millis(200));
    let joiner = coordinator(Role::Joiner, &dir, CoordinatorConfig::default(), discovery);

    let joined = joiner.discover_and_join_ip().await.unwrap();
    assert!(joined.is_none());
    assert_eq!(joiner.engine().status(), ConnectionStatus::NoPeerFound);
    assert_eq!(joiner.role(), None);
}

// ----------------------------------------------------------------------------
// Failures
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_join_reports_error_and_releases_role() {
    let dir = TempDir::new().unwrap();
    let closed_port = {
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let joiner = coordinator(
        Role::Joiner,
        &dir,
        CoordinatorConfig::default(),
        discovery_config(free_udp_port()),
    );

    let result = joiner.join_ip(LOCALHOST, closed_port).await;
    assert!(matches!(result, Err(WcwiError::Transport(_))));
    assert!(matches!(
        joiner.engine().status(),
        ConnectionStatus::Error { .. }
    ));
    assert_eq!(joiner.role(), None);
}

#[tokio::test]
async fn test_host_cannot_also_join() {
    let dir = TempDir::new().unwrap();
    let host = coordinator(
        Role::Host,
        &dir,
        CoordinatorConfig::default().with_self_connect(false),
        discovery_config(free_udp_port()),
    );
    let addr = host.host_ip().await.unwrap();

    let result = host.join_ip(LOCALHOST, addr.port()).await;
    assert!(matches!(result, Err(WcwiError::RoleMismatch { .. })));

    let result = host.host_bluetooth().await;
    assert!(matches!(result, Err(WcwiError::Config(_))));
    host.shutdown().await;
}
