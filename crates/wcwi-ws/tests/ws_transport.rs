//! Integration tests for the WebSocket transport and UDP discovery
//!
//! Everything binds to 127.0.0.1 on ephemeral ports so tests can run in
//! parallel.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures::SinkExt;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use wcwi_core::{Frame, MessageId, Role, SessionState, TransportSession};
use wcwi_ws::{
    connect, DiscoveryBroadcaster, DiscoveryConfig, DiscoveryListener, WsListener,
    WsTransportConfig, WsTransportError,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn local_config() -> WsTransportConfig {
    WsTransportConfig::new()
        .with_bind_address(LOCALHOST)
        .with_port(0)
        .with_connect_timeout(Duration::from_secs(2))
}

// ----------------------------------------------------------------------------
// Session Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_frames_flow_both_ways() {
    let config = local_config();
    let listener = WsListener::bind(&config).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await });
    let joiner = connect(LOCALHOST, port, &config).await.unwrap();
    let host = accept.await.unwrap().unwrap();

    assert_eq!(joiner.state(), SessionState::Connected);
    let mut host_in = host.take_incoming().unwrap();
    let mut joiner_in = joiner.take_incoming().unwrap();

    let hello = Frame::Text {
        role: Role::Joiner,
        id: MessageId::new("msg1"),
        content: "Hello: world".to_string(),
    };
    joiner.send(&hello).await.unwrap();
    let received = timeout(Duration::from_secs(2), host_in.next()).await.unwrap();
    assert_eq!(received, Some(hello));

    let delete = Frame::Delete {
        id: MessageId::new("msg1"),
    };
    host.send(&delete).await.unwrap();
    let received = timeout(Duration::from_secs(2), joiner_in.next()).await.unwrap();
    assert_eq!(received, Some(delete));
}

#[tokio::test]
async fn test_wrong_path_is_refused() {
    let config = local_config();
    let listener = WsListener::bind(&config).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await });
    let wrong = config.clone().with_path("/chat");
    let result = connect(LOCALHOST, port, &wrong).await;
    assert!(matches!(result, Err(WsTransportError::ConnectFailed { .. })));

    let accepted = accept.await.unwrap();
    assert!(matches!(accepted, Err(WsTransportError::Handshake { .. })));
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let config = local_config();
    let port = {
        let listener = WsListener::bind(&config).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    assert!(connect(LOCALHOST, port, &config).await.is_err());
}

#[tokio::test]
async fn test_close_ends_remote_stream() {
    let config = local_config();
    let listener = WsListener::bind(&config).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await });
    let joiner = connect(LOCALHOST, port, &config).await.unwrap();
    let host = accept.await.unwrap().unwrap();
    let mut host_in = host.take_incoming().unwrap();

    joiner.close().await;
    joiner.close().await;
    assert_eq!(joiner.state(), SessionState::Closed);
    assert!(joiner.send(&Frame::Hello { name: "x".into() }).await.is_err());

    let end = timeout(Duration::from_secs(2), host_in.next()).await.unwrap();
    assert_eq!(end, None);
    assert_eq!(host.state(), SessionState::Closed);
    assert!(host.close_reason().is_some());
}

#[tokio::test]
async fn test_malformed_and_legacy_lines() {
    let config = local_config();
    let listener = WsListener::bind(&config).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await });
    let url = config.url_for(LOCALHOST, port);
    let (mut raw, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let host = accept.await.unwrap().unwrap();
    let mut host_in = host.take_incoming().unwrap();

    raw.send(Message::Text("TEXT:Martian:x:y".into())).await.unwrap();
    raw.send(Message::Text("just words".into())).await.unwrap();
    raw.send(Message::Text("TEXT:Client:m2:ok\n".into())).await.unwrap();

    let legacy = timeout(Duration::from_secs(2), host_in.next()).await.unwrap().unwrap();
    match legacy {
        Frame::Text { role, id, content } => {
            assert_eq!(role, Role::Joiner);
            assert!(id.as_str().starts_with("recv_"));
            assert_eq!(content, "just words");
        }
        other => panic!("unexpected frame {:?}", other),
    }
    let tagged = timeout(Duration::from_secs(2), host_in.next()).await.unwrap().unwrap();
    assert_eq!(tagged.id(), Some(&MessageId::new("m2")));
    assert_eq!(host.state(), SessionState::Connected);
}

// ----------------------------------------------------------------------------
// Discovery Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_discovery_finds_announcing_host() {
    let listen_config = DiscoveryConfig::new().with_port(0);
    let listener = DiscoveryListener::bind(&listen_config).await.unwrap();
    let discovery_port = listener.local_addr().unwrap().port();

    let announce_config = DiscoveryConfig::new()
        .with_port(discovery_port)
        .with_broadcast_address(Ipv4Addr::LOCALHOST)
        .with_broadcast_interval(Duration::from_millis(50));
    let broadcaster = DiscoveryBroadcaster::start(&announce_config, 9876).await.unwrap();

    let found = listener.listen(Duration::from_secs(3)).await.unwrap().unwrap();
    assert_eq!(found.address, LOCALHOST);
    assert_eq!(found.port, 9876);
    broadcaster.stop();
}

#[tokio::test]
async fn test_discovery_times_out_with_no_peer() {
    let listener = DiscoveryListener::bind(&DiscoveryConfig::new().with_port(0))
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();

    // Malformed datagrams do not count as a peer
    let noise = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    noise.send_to(b"SERVER:nope", (Ipv4Addr::LOCALHOST, port)).await.unwrap();

    let started = Instant::now();
    let found = listener.listen(Duration::from_millis(300)).await.unwrap();
    assert!(found.is_none());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_secs(2));
}
