//! Integration tests for the Bluetooth serial transport
//!
//! RFCOMM sockets are stood in for by loopback TCP streams, which have the
//! same blocking byte-stream behaviour. Adapter policy (permissions, scan
//! windows, scan/connect exclusion) is driven through a scripted adapter.

use async_trait::async_trait;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

use wcwi_bluetooth::{
    BluetoothAdapter, BluetoothDevice, BluetoothDiscovery, BluetoothError, BluetoothOperation,
    BluetoothTransport, BluetoothTransportConfig, Result, ScanEvent, SerialLink, SerialSession,
};
use wcwi_core::{Frame, MessageId, PermissionError, Role, SessionState, TransportSession};

const WAIT: Duration = Duration::from_secs(2);

fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let local = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (remote, _) = listener.accept().unwrap();
    (local, remote)
}

fn serial_session(chunk_size: usize) -> (SerialSession, TcpStream) {
    let (local, remote) = tcp_pair();
    let link = SerialLink::from_tcp(local).unwrap();
    let session = SerialSession::start(link, Role::Joiner, chunk_size).unwrap();
    (session, remote)
}

fn write_raw(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).unwrap();
    stream.flush().unwrap();
}

// ----------------------------------------------------------------------------
// Serial Session Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_lines_are_reassembled_across_reads() {
    let (session, mut remote) = serial_session(4);
    let mut incoming = session.take_incoming().unwrap();

    write_raw(&mut remote, b"TEXT:Joiner:m1:hel");
    tokio::time::sleep(Duration::from_millis(20)).await;
    write_raw(&mut remote, b"lo: world\nDELE");
    tokio::time::sleep(Duration::from_millis(20)).await;
    write_raw(&mut remote, b"TE:m1\r\n");

    let first = timeout(WAIT, incoming.next()).await.unwrap();
    assert_eq!(
        first,
        Some(Frame::Text {
            role: Role::Joiner,
            id: MessageId::new("m1"),
            content: "hello: world".to_string(),
        })
    );
    let second = timeout(WAIT, incoming.next()).await.unwrap();
    assert_eq!(
        second,
        Some(Frame::Delete {
            id: MessageId::new("m1")
        })
    );
}

#[tokio::test]
async fn test_send_writes_one_line() {
    let (session, remote) = serial_session(1024);
    let frame = Frame::Text {
        role: Role::Host,
        id: MessageId::new("m2"),
        content: "hi".to_string(),
    };
    assert_ok!(session.send(&frame).await);

    let line = tokio::task::spawn_blocking(move || {
        let mut line = String::new();
        BufReader::new(remote).read_line(&mut line).unwrap();
        line
    })
    .await
    .unwrap();
    assert_eq!(line, "TEXT:Host:m2:hi\n");
}

#[tokio::test]
async fn test_malformed_and_legacy_lines() {
    let (session, mut remote) = serial_session(1024);
    let mut incoming = session.take_incoming().unwrap();

    write_raw(&mut remote, b"IMAGE:Joiner:x:!!!not base64\nplain hello\n");

    let frame = timeout(WAIT, incoming.next()).await.unwrap().unwrap();
    match frame {
        Frame::Text { role, id, content } => {
            assert_eq!(role, Role::Joiner);
            assert!(id.as_str().starts_with("recv_"));
            assert_eq!(content, "plain hello");
        }
        other => panic!("unexpected frame {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_close_unblocks_reader() {
    let (session, _remote) = serial_session(1024);
    let mut incoming = session.take_incoming().unwrap();

    session.close().await;
    session.close().await;

    let end = timeout(WAIT, incoming.next()).await.unwrap();
    assert_eq!(end, None);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.close_reason().as_deref(), Some("closed locally"));

    let err = session
        .send(&Frame::Delete {
            id: MessageId::new("m1"),
        })
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_peer_close_flushes_trailing_line() {
    let (session, mut remote) = serial_session(1024);
    let mut incoming = session.take_incoming().unwrap();

    write_raw(&mut remote, b"TEXT:Joiner:m3:tail");
    drop(remote);

    let last = timeout(WAIT, incoming.next()).await.unwrap();
    assert_eq!(
        last,
        Some(Frame::Text {
            role: Role::Joiner,
            id: MessageId::new("m3"),
            content: "tail".to_string(),
        })
    );
    assert_eq!(timeout(WAIT, incoming.next()).await.unwrap(), None);
    assert_eq!(session.state(), SessionState::Closed);
}

// ----------------------------------------------------------------------------
// Scripted Adapter
// ----------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedAdapter {
    disabled: bool,
    denied: Option<BluetoothOperation>,
    paired: Vec<BluetoothDevice>,
    scan: Mutex<Option<mpsc::UnboundedSender<BluetoothDevice>>>,
    scans_started: AtomicUsize,
    scan_stopped: AtomicBool,
    peer_streams: Mutex<Vec<TcpStream>>,
}

impl ScriptedAdapter {
    fn report(&self, device: BluetoothDevice) {
        if let Some(tx) = self.scan.lock().unwrap().as_ref() {
            let _ = tx.send(device);
        }
    }

    fn link(&self) -> SerialLink {
        let (local, remote) = tcp_pair();
        self.peer_streams.lock().unwrap().push(remote);
        SerialLink::from_tcp(local).unwrap()
    }
}

#[async_trait]
impl BluetoothAdapter for ScriptedAdapter {
    async fn is_enabled(&self) -> Result<bool> {
        Ok(!self.disabled)
    }

    async fn check_permission(&self, operation: BluetoothOperation) -> Result<()> {
        match self.denied {
            Some(denied) if denied == operation => Err(operation.missing().into()),
            _ => Ok(()),
        }
    }

    async fn paired_devices(&self) -> Result<Vec<BluetoothDevice>> {
        Ok(self.paired.clone())
    }

    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<BluetoothDevice>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.scan.lock().unwrap() = Some(tx);
        self.scans_started.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scan.lock().unwrap().take();
        self.scan_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn listen(&self, _config: &BluetoothTransportConfig) -> Result<SerialLink> {
        Ok(self.link())
    }

    async fn connect(
        &self,
        _device: &BluetoothDevice,
        _config: &BluetoothTransportConfig,
    ) -> Result<SerialLink> {
        Ok(self.link())
    }
}

fn device(address: &str) -> BluetoothDevice {
    BluetoothDevice::new(address).with_name("phone")
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ScanEvent>) -> ScanEvent {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

// ----------------------------------------------------------------------------
// Discovery and Transport Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_paired_devices_need_no_scan() {
    let adapter = Arc::new(ScriptedAdapter {
        paired: vec![device("AA:BB:CC:DD:EE:01").paired()],
        ..Default::default()
    });
    let discovery = BluetoothDiscovery::new(adapter.clone(), BluetoothTransportConfig::default());

    let paired = discovery.paired_devices().await.unwrap();
    assert_eq!(paired.len(), 1);
    assert!(paired[0].paired);
    assert_eq!(adapter.scans_started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scan_reports_each_device_once_then_finishes() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let discovery = BluetoothDiscovery::new(adapter.clone(), BluetoothTransportConfig::default());

    let mut events = discovery.start_scan().await.unwrap();
    assert!(discovery.is_scanning());

    adapter.report(device("AA:BB:CC:DD:EE:01"));
    adapter.report(device("AA:BB:CC:DD:EE:01"));
    adapter.report(device("AA:BB:CC:DD:EE:02"));

    assert_eq!(
        next_event(&mut events).await,
        ScanEvent::DeviceFound(device("AA:BB:CC:DD:EE:01"))
    );
    assert_eq!(
        next_event(&mut events).await,
        ScanEvent::DeviceFound(device("AA:BB:CC:DD:EE:02"))
    );

    discovery.stop_scan().await;
    assert_eq!(next_event(&mut events).await, ScanEvent::Finished);
    assert!(!discovery.is_scanning());
    assert!(adapter.scan_stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_scan_window_elapses() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let config = BluetoothTransportConfig::default().with_scan_timeout(Duration::from_millis(50));
    let discovery = BluetoothDiscovery::new(adapter.clone(), config);

    let mut events = discovery.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, ScanEvent::Finished);
    assert!(adapter.scan_stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_second_scan_is_rejected_while_running() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let discovery = BluetoothDiscovery::new(adapter.clone(), BluetoothTransportConfig::default());

    let _events = discovery.start_scan().await.unwrap();
    let second = discovery.start_scan().await;
    assert!(matches!(second, Err(BluetoothError::ScanFailed(_))));
    discovery.stop_scan().await;
}

#[tokio::test]
async fn test_missing_permission_aborts_scan() {
    let adapter = Arc::new(ScriptedAdapter {
        denied: Some(BluetoothOperation::Discover),
        ..Default::default()
    });
    let discovery = BluetoothDiscovery::new(adapter.clone(), BluetoothTransportConfig::default());

    let result = discovery.start_scan().await;
    assert!(matches!(
        result,
        Err(BluetoothError::Permission(PermissionError::Missing { .. }))
    ));
    assert_eq!(adapter.scans_started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_host_requires_enabled_radio() {
    let adapter = Arc::new(ScriptedAdapter {
        disabled: true,
        ..Default::default()
    });
    let transport = BluetoothTransport::new(adapter, BluetoothTransportConfig::default());

    let result = transport.host().await;
    assert!(matches!(result, Err(BluetoothError::Disabled)));
}

#[tokio::test]
async fn test_join_stops_running_scan() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let transport = BluetoothTransport::new(adapter.clone(), BluetoothTransportConfig::default());

    let mut events = transport.discovery().start_scan().await.unwrap();
    let target = device("AA:BB:CC:DD:EE:03");
    adapter.report(target.clone());
    assert_eq!(
        next_event(&mut events).await,
        ScanEvent::DeviceFound(target.clone())
    );

    let session = transport.join(&target).await.unwrap();
    assert!(!transport.discovery().is_scanning());
    assert!(adapter.scan_stopped.load(Ordering::SeqCst));
    assert_eq!(next_event(&mut events).await, ScanEvent::Finished);
    assert_eq!(session.state(), SessionState::Connected);

    // The joiner side talks to the host, so legacy lines are attributed to it
    let mut incoming = session.take_incoming().unwrap();
    let mut remote = adapter.peer_streams.lock().unwrap().remove(0);
    write_raw(&mut remote, b"from an older host\n");
    match timeout(WAIT, incoming.next()).await.unwrap() {
        Some(Frame::Text { role, .. }) => assert_eq!(role, Role::Host),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_host_accepts_joiner() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let transport = BluetoothTransport::new(adapter.clone(), BluetoothTransportConfig::default());

    let session = transport.host().await.unwrap();
    let mut incoming = session.take_incoming().unwrap();
    let mut remote = adapter.peer_streams.lock().unwrap().remove(0);
    write_raw(&mut remote, b"TEXT:Client:msg1:Hello\n");

    assert_eq!(
        timeout(WAIT, incoming.next()).await.unwrap(),
        Some(Frame::Text {
            role: Role::Joiner,
            id: MessageId::new("msg1"),
            content: "Hello".to_string(),
        })
    );
    session.close().await;
}
