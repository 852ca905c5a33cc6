//! Sync engines joined by Bluetooth serial sessions
//!
//! Each end of a loopback TCP pair is wrapped as a `SerialLink`, so frames go
//! through the serial worker threads and line framing exactly as over RFCOMM.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use wcwi_bluetooth::{SerialLink, SerialSession};
use wcwi_core::{
    ChatMessage, ConnectionStatus, EngineEvent, LinkDirection, Role, Sender, StoreConfig,
    TransportKind,
};
use wcwi_runtime::{DeleteOutcome, EngineConfig, SyncEngine};

const WAIT: Duration = Duration::from_secs(3);

fn open_engine(role: Role, dir: &TempDir) -> SyncEngine {
    SyncEngine::open(role, &EngineConfig::new(StoreConfig::new(dir.path()))).unwrap()
}

/// Host and joiner engines attached to the two ends of one serial link
struct SerialPair {
    host: SyncEngine,
    joiner: SyncEngine,
    _dirs: (TempDir, TempDir),
}

fn serial_pair(read_chunk_size: usize) -> SerialPair {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let joiner_end = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (host_end, _) = listener.accept().unwrap();

    let host_session = SerialSession::start(
        SerialLink::from_tcp(host_end).unwrap(),
        Role::Joiner,
        read_chunk_size,
    )
    .unwrap();
    let joiner_session = SerialSession::start(
        SerialLink::from_tcp(joiner_end).unwrap(),
        Role::Host,
        read_chunk_size,
    )
    .unwrap();

    let dirs = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let host = open_engine(Role::Host, &dirs.0);
    let joiner = open_engine(Role::Joiner, &dirs.1);
    host.attach(Arc::new(host_session), LinkDirection::Downstream)
        .unwrap();
    joiner
        .attach(Arc::new(joiner_session), LinkDirection::Upstream)
        .unwrap();

    SerialPair {
        host,
        joiner,
        _dirs: dirs,
    }
}

async fn next_applied(events: &mut broadcast::Receiver<EngineEvent>) -> ChatMessage {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::MessageApplied(message)) => return message,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("no message applied")
}

// ----------------------------------------------------------------------------
// Exchange
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_text_crosses_serial_link_both_ways() {
    let pair = serial_pair(16);
    let mut host_events = pair.host.subscribe();
    let mut joiner_events = pair.joiner.subscribe();

    for engine in [&pair.host, &pair.joiner] {
        assert!(matches!(
            engine.status(),
            ConnectionStatus::Connected {
                transport: TransportKind::Bluetooth,
                ..
            }
        ));
    }

    let from_joiner = pair.joiner.send_text("over rfcomm: hi").await;
    let at_host = next_applied(&mut host_events).await;
    assert_eq!(at_host.id, from_joiner.id);
    assert_eq!(at_host.sender, Sender::Joiner);
    assert_eq!(at_host.content.as_deref(), Some("over rfcomm: hi"));

    next_applied(&mut joiner_events).await;
    let from_host = pair.host.send_text("and back").await;
    let at_joiner = next_applied(&mut joiner_events).await;
    assert_eq!(at_joiner.id, from_host.id);
    assert_eq!(at_joiner.sender, Sender::Host);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(pair.host.messages(), vec![at_host, from_host]);
    assert_eq!(pair.joiner.messages(), vec![from_joiner, at_joiner]);
}

#[tokio::test]
async fn test_image_survives_small_serial_reads() {
    let pair = serial_pair(7);
    let mut host_events = pair.host.subscribe();

    let bytes: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let sent = pair.joiner.send_image(&bytes).await;

    assert_eq!(next_applied(&mut host_events).await.id, sent.id);
    assert_eq!(pair.host.attachment(&sent.id).unwrap(), Some(bytes));
}

#[tokio::test]
async fn test_author_delete_crosses_serial_link() {
    let pair = serial_pair(16);
    let mut host_events = pair.host.subscribe();

    let sent = pair.joiner.send_text("short lived").await;
    assert_eq!(next_applied(&mut host_events).await.id, sent.id);

    assert_eq!(
        pair.joiner.request_delete(&sent.id).await,
        DeleteOutcome::Bilateral
    );
    let notice = next_applied(&mut host_events).await;
    assert_eq!(notice.sender, Sender::System);
    assert!(pair.host.messages().iter().all(|m| m.id != sent.id));
}

#[tokio::test]
async fn test_joiner_shutdown_is_seen_as_lost() {
    let pair = serial_pair(16);

    pair.joiner.shutdown().await;

    timeout(WAIT, async {
        while pair.host.session_count() != 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("host kept the closed session");
    assert!(matches!(pair.host.status(), ConnectionStatus::Lost { .. }));
}
