//! Transport session abstraction
//!
//! A session is one bidirectional link to one peer. The IP variant is
//! event-driven (one network message per frame) and the Bluetooth variant is a
//! blocking byte stream served by dedicated worker threads; both push decoded
//! frames onto the same [`Incoming`] channel so the engine consumes them
//! uniformly.
//!
//! Sessions are never reused: once closed, reconnecting creates a new session
//! with a new [`SessionId`].

use async_trait::async_trait;
use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::TransportError;
use crate::protocol::Frame;
use crate::types::{Role, TransportKind};

/// Lock a std mutex, recovering the data if a holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Session Identity and State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Session lifecycle
///
/// ```text
/// Idle -> Connecting -> Connected -> Closed
/// Idle -> Listening  -> Connected -> Closed
/// ```
///
/// `Closed` is reachable from every state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    Connected,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Listening)
                | (Connecting, Connected)
                | (Listening, Connected)
                | (Idle | Connecting | Listening | Connected, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which way a link points relative to this engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// We are host; the peer is a joiner
    Downstream,
    /// We are a joiner (or the host's loopback observer); the peer is the host
    Upstream,
}

impl LinkDirection {
    /// Role of the peer at the other end
    pub fn peer_role(&self) -> Role {
        match self {
            LinkDirection::Downstream => Role::Joiner,
            LinkDirection::Upstream => Role::Host,
        }
    }
}

// ----------------------------------------------------------------------------
// Incoming Frames
// ----------------------------------------------------------------------------

/// Decoded frames from one session; ends when the session closes
///
/// Not restartable: a session hands it out once.
#[derive(Debug)]
pub struct Incoming {
    session: SessionId,
    receiver: mpsc::UnboundedReceiver<Frame>,
}

impl Incoming {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub async fn next(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Non-blocking poll, mainly for tests
    pub fn try_next(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }
}

// ----------------------------------------------------------------------------
// Shared Session Core
// ----------------------------------------------------------------------------

/// Identity, state and incoming channel shared by every session variant
#[derive(Debug)]
pub struct SessionCore {
    id: SessionId,
    kind: TransportKind,
    peer: String,
    state: Mutex<SessionState>,
    incoming: Mutex<Option<Incoming>>,
    close_reason: Mutex<Option<String>>,
}

impl SessionCore {
    /// Create a core in `Connecting` and the sender feeding its incoming side
    pub fn new(kind: TransportKind, peer: impl Into<String>) -> (Self, mpsc::UnboundedSender<Frame>) {
        let id = SessionId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let core = Self {
            id,
            kind,
            peer: peer.into(),
            state: Mutex::new(SessionState::Connecting),
            incoming: Mutex::new(Some(Incoming {
                session: id,
                receiver,
            })),
            close_reason: Mutex::new(None),
        };
        (core, sender)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Apply a lifecycle transition; invalid transitions are ignored
    pub fn transition(&self, next: SessionState) -> bool {
        let mut state = lock(&self.state);
        let current = *state;
        if !current.can_transition_to(next) {
            debug!(session = %self.id, from = %current, to = %next, "Ignoring session transition");
            return false;
        }
        *state = next;
        true
    }

    pub fn mark_connected(&self) -> bool {
        self.transition(SessionState::Connected)
    }

    /// Move to `Closed`, recording the first reason; false if already closed
    pub fn mark_closed(&self, reason: impl Into<String>) -> bool {
        if !self.transition(SessionState::Closed) {
            return false;
        }
        let mut slot = lock(&self.close_reason);
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        true
    }

    pub fn close_reason(&self) -> Option<String> {
        lock(&self.close_reason).clone()
    }

    pub fn take_incoming(&self) -> Option<Incoming> {
        lock(&self.incoming).take()
    }

    pub fn closed_error(&self) -> TransportError {
        TransportError::SessionClosed {
            peer: self.peer.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Session Trait
// ----------------------------------------------------------------------------

/// One live link to one peer
#[async_trait]
pub trait TransportSession: Send + Sync + fmt::Debug {
    /// Shared identity and state
    fn core(&self) -> &SessionCore;

    /// Transmit one frame
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Close the link; idempotent, and ends the incoming stream
    async fn close(&self);

    fn id(&self) -> SessionId {
        self.core().id()
    }

    fn kind(&self) -> TransportKind {
        self.core().kind()
    }

    fn peer(&self) -> &str {
        self.core().peer()
    }

    fn state(&self) -> SessionState {
        self.core().state()
    }

    /// Take the incoming frame stream; `None` once taken
    fn take_incoming(&self) -> Option<Incoming> {
        self.core().take_incoming()
    }

    fn close_reason(&self) -> Option<String> {
        self.core().close_reason()
    }
}

// ----------------------------------------------------------------------------
// In-Memory Session (testing)
// ----------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub mod memory {
    //! Connected pair of sessions backed by channels

    use super::*;
    use crate::protocol::FrameCodec;
    use std::sync::Arc;

    type Link = Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>;

    #[derive(Debug)]
    pub struct MemorySession {
        core: SessionCore,
        outbound: Link,
        inbound: Link,
        codec: FrameCodec,
    }

    impl MemorySession {
        /// Two connected sessions; `left_peer_role` is the role of the peer
        /// the left session talks to
        pub fn pair(kind: TransportKind, left_peer_role: Role) -> (Self, Self) {
            let (left_core, to_left) = SessionCore::new(kind, "memory:right");
            let (right_core, to_right) = SessionCore::new(kind, "memory:left");
            left_core.mark_connected();
            right_core.mark_connected();

            let left_to_right: Link = Arc::new(Mutex::new(Some(to_right)));
            let right_to_left: Link = Arc::new(Mutex::new(Some(to_left)));

            let left = Self {
                core: left_core,
                outbound: left_to_right.clone(),
                inbound: right_to_left.clone(),
                codec: FrameCodec::new(left_peer_role),
            };
            let right = Self {
                core: right_core,
                outbound: right_to_left,
                inbound: left_to_right,
                codec: FrameCodec::new(left_peer_role.opposite()),
            };
            (left, right)
        }

        /// Deliver a raw wire line to this session as if the peer sent it
        ///
        /// Malformed lines are dropped, mirroring the network variants.
        pub fn inject_line(&self, line: &[u8]) -> bool {
            let Ok(frame) = self.codec.decode(line) else {
                return false;
            };
            match lock(&self.inbound).as_ref() {
                Some(tx) => tx.send(frame).is_ok(),
                None => false,
            }
        }
    }

    #[async_trait]
    impl TransportSession for MemorySession {
        fn core(&self) -> &SessionCore {
            &self.core
        }

        async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
            if self.core.is_closed() {
                return Err(self.core.closed_error());
            }
            let sent = match lock(&self.outbound).as_ref() {
                Some(tx) => tx.send(frame.clone()).is_ok(),
                None => false,
            };
            if sent {
                Ok(())
            } else {
                self.core.mark_closed("peer closed");
                Err(TransportError::SendFailed {
                    peer: self.core.peer().to_string(),
                    reason: "peer closed".to_string(),
                })
            }
        }

        async fn close(&self) {
            if self.core.mark_closed("closed locally") {
                lock(&self.outbound).take();
                lock(&self.inbound).take();
            }
        }
    }
}
