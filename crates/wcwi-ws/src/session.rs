//! WebSocket session
//!
//! Each WebSocket message carries one protocol line. A reader task decodes
//! inbound messages as they arrive and forwards the frames to the session's
//! incoming channel; sends go straight to the sink half under a lock.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use wcwi_core::transport::lock;
use wcwi_core::{Frame, FrameCodec, Role, SessionCore, TransportError, TransportKind, TransportSession};

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

// ----------------------------------------------------------------------------
// WebSocket Session
// ----------------------------------------------------------------------------

pub struct WsSession<S> {
    core: Arc<SessionCore>,
    sink: AsyncMutex<WsSink<S>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<S> std::fmt::Debug for WsSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSession")
            .field("id", &self.core.id())
            .field("peer", &self.core.peer())
            .field("state", &self.core.state())
            .finish()
    }
}

impl<S> WsSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established WebSocket and start its reader task
    ///
    /// `peer_role` is the role of the remote end; it attributes untagged
    /// legacy lines.
    pub fn start(stream: WebSocketStream<S>, peer: impl Into<String>, peer_role: Role) -> Self {
        let (core, frames) = SessionCore::new(TransportKind::Ip, peer);
        let core = Arc::new(core);
        core.mark_connected();

        let (sink, source) = stream.split();
        let reader = tokio::spawn(read_loop(
            source,
            Arc::clone(&core),
            FrameCodec::new(peer_role),
            frames,
        ));

        info!(session = %core.id(), peer = %core.peer(), "WebSocket session connected");
        Self {
            core,
            sink: AsyncMutex::new(sink),
            reader: Mutex::new(Some(reader)),
        }
    }
}

#[async_trait]
impl<S> TransportSession for WsSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn core(&self) -> &SessionCore {
        &self.core
    }

    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.core.is_closed() {
            return Err(self.core.closed_error());
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(frame.encode())).await {
            warn!(session = %self.core.id(), peer = %self.core.peer(), error = %e, "WebSocket send failed");
            self.core.mark_closed(format!("send failed: {}", e));
            return Err(TransportError::SendFailed {
                peer: self.core.peer().to_string(),
                reason: e.to_string(),
            });
        }
        debug!(session = %self.core.id(), kind = %frame.kind(), "Sent frame");
        Ok(())
    }

    async fn close(&self) {
        if !self.core.mark_closed("closed locally") {
            return;
        }

        {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        info!(session = %self.core.id(), peer = %self.core.peer(), "WebSocket session closed");
    }
}

impl<S> Drop for WsSession<S> {
    fn drop(&mut self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Reader Task
// ----------------------------------------------------------------------------

async fn read_loop<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    core: Arc<SessionCore>,
    codec: FrameCodec,
    frames: mpsc::UnboundedSender<Frame>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        let payload = match source.next().await {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(_))) => break "peer closed".to_string(),
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(session = %core.id(), peer = %core.peer(), error = %e, "WebSocket receive failed");
                break format!("receive failed: {}", e);
            }
            None => break "stream ended".to_string(),
        };

        for line in payload.split(|b| *b == b'\n') {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            match codec.decode(line) {
                Ok(frame) => {
                    debug!(session = %core.id(), kind = %frame.kind(), "Received frame");
                    if frames.send(frame).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(session = %core.id(), peer = %core.peer(), error = %e, "Discarding malformed frame");
                }
            }
        }
    };

    if core.mark_closed(reason.clone()) {
        info!(session = %core.id(), peer = %core.peer(), reason = %reason, "WebSocket session ended");
    }
}
