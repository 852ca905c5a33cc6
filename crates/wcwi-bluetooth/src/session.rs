//! Bluetooth serial session
//!
//! The link is read and written with blocking calls, so each session owns two
//! dedicated threads. The reader thread reassembles lines from arbitrary
//! chunks and pushes decoded frames onto the session's incoming channel, the
//! same channel type the WebSocket variant feeds. The writer thread drains a
//! queue of encoded lines and reports each result back to the awaiting
//! sender.
//!
//! `close` shuts the socket down, which makes the blocked reader return.

use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use wcwi_core::transport::lock;
use wcwi_core::{
    Frame, FrameCodec, LineBuffer, Role, SessionCore, TransportError, TransportKind,
    TransportSession,
};

use crate::error::{BluetoothError, Result};
use crate::link::{LinkShutdown, SerialLink};

/// Queued writes per session
const WRITE_QUEUE_DEPTH: usize = 64;

struct WriteRequest {
    line: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

// ----------------------------------------------------------------------------
// Serial Session
// ----------------------------------------------------------------------------

pub struct SerialSession {
    core: Arc<SessionCore>,
    codec: FrameCodec,
    writes: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    shutdown: Box<dyn LinkShutdown>,
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("id", &self.core.id())
            .field("peer", &self.core.peer())
            .field("state", &self.core.state())
            .finish()
    }
}

impl SerialSession {
    /// Take ownership of a connected link and start its worker threads
    pub fn start(link: SerialLink, peer_role: Role, read_chunk_size: usize) -> Result<Self> {
        let (peer, reader, writer, shutdown) = link.into_parts();
        let (core, frames) = SessionCore::new(TransportKind::Bluetooth, peer);
        let core = Arc::new(core);
        let codec = FrameCodec::new(peer_role);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);

        let reader_core = Arc::clone(&core);
        thread::Builder::new()
            .name(format!("wcwi-bt-read-{}", core.id()))
            .spawn(move || read_loop(reader, reader_core, codec, frames, read_chunk_size.max(1)))
            .map_err(BluetoothError::Worker)?;

        let writer_core = Arc::clone(&core);
        if let Err(e) = thread::Builder::new()
            .name(format!("wcwi-bt-write-{}", core.id()))
            .spawn(move || write_loop(writer, writer_core, write_rx))
        {
            let _ = shutdown.shutdown();
            return Err(BluetoothError::Worker(e));
        }

        core.mark_connected();
        info!(session = %core.id(), peer = %core.peer(), "Bluetooth session connected");
        Ok(Self {
            core,
            codec,
            writes: Mutex::new(Some(write_tx)),
            shutdown,
        })
    }
}

#[async_trait]
impl TransportSession for SerialSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    async fn send(&self, frame: &Frame) -> std::result::Result<(), TransportError> {
        if self.core.is_closed() {
            return Err(self.core.closed_error());
        }
        let Some(writes) = lock(&self.writes).clone() else {
            return Err(self.core.closed_error());
        };

        let (done, result) = oneshot::channel();
        let request = WriteRequest {
            line: self.codec.encode_line(frame),
            done,
        };
        let failed = |reason: String| TransportError::SendFailed {
            peer: self.core.peer().to_string(),
            reason,
        };

        writes
            .send(request)
            .await
            .map_err(|_| failed("writer stopped".to_string()))?;
        match result.await {
            Ok(Ok(())) => {
                debug!(session = %self.core.id(), kind = %frame.kind(), "Sent frame");
                Ok(())
            }
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed("writer stopped".to_string())),
        }
    }

    async fn close(&self) {
        if !self.core.mark_closed("closed locally") {
            return;
        }
        lock(&self.writes).take();
        if let Err(e) = self.shutdown.shutdown() {
            debug!(session = %self.core.id(), error = %e, "Socket shutdown failed");
        }
        info!(session = %self.core.id(), peer = %self.core.peer(), "Bluetooth session closed");
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if self.core.mark_closed("dropped") {
            let _ = self.shutdown.shutdown();
        }
    }
}

// ----------------------------------------------------------------------------
// Worker Threads
// ----------------------------------------------------------------------------

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    core: Arc<SessionCore>,
    codec: FrameCodec,
    frames: mpsc::UnboundedSender<Frame>,
    chunk_size: usize,
) {
    let mut chunk = vec![0u8; chunk_size];
    let mut lines = LineBuffer::new();

    let deliver = |line: &[u8]| -> bool {
        match codec.decode(line) {
            Ok(frame) => {
                debug!(session = %core.id(), kind = %frame.kind(), "Received frame");
                frames.send(frame).is_ok()
            }
            Err(e) => {
                warn!(session = %core.id(), peer = %core.peer(), error = %e, "Discarding malformed frame");
                true
            }
        }
    };

    let reason = loop {
        match reader.read(&mut chunk) {
            Ok(0) => break "peer closed".to_string(),
            Ok(n) => {
                let (complete, overflowed) = lines.push(&chunk[..n]);
                if overflowed {
                    warn!(session = %core.id(), "Discarding oversized partial line");
                }
                if !complete.iter().all(|line| deliver(line.as_slice())) {
                    break "incoming dropped".to_string();
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break format!("read failed: {}", e),
        }
    };

    if let Some(rest) = lines.finish() {
        deliver(rest.as_slice());
    }
    if core.mark_closed(reason.clone()) {
        info!(session = %core.id(), peer = %core.peer(), reason = %reason, "Bluetooth session ended");
    }
}

fn write_loop(
    mut writer: Box<dyn Write + Send>,
    core: Arc<SessionCore>,
    mut requests: mpsc::Receiver<WriteRequest>,
) {
    while let Some(request) = requests.blocking_recv() {
        let result = writer
            .write_all(&request.line)
            .and_then(|()| writer.flush());
        let failed = result.is_err();
        if let Err(e) = &result {
            warn!(session = %core.id(), peer = %core.peer(), error = %e, "Bluetooth write failed");
            core.mark_closed(format!("write failed: {}", e));
        }
        let _ = request.done.send(result);
        if failed {
            break;
        }
    }
    debug!(session = %core.id(), "Writer stopped");
}
