//! Sync engine
//!
//! The engine owns the message store, the dedup filter and the set of
//! attached sessions. Each attached session gets one reader task that feeds
//! its frames through [`SyncEngine::handle_frame`], so frames from every
//! transport are processed the same way:
//!
//! - `Text`/`Image`: applied once per id, then relayed by a host to every
//!   other downstream session
//! - `Delete`: tombstoned if known, then relayed the same way; an unknown id
//!   ends the relay chain
//! - `Hello`: reported, never stored
//!
//! Store and filter are guarded together so two sessions delivering the same
//! id concurrently apply it once. A session whose send fails is dropped from
//! the set rather than retried.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wcwi_core::transport::lock;
use wcwi_core::{
    ChatMessage, ConnectionStatus, DedupConfig, DedupFilter, EngineEvent, EventBus, Frame,
    LinkDirection, MessageId, MessageStore, Result, Role, SessionId, StorageError,
    TransportError, TransportSession,
};

use crate::config::EngineConfig;

/// Result of a local delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Authored here: removed locally and on the peer
    Bilateral,
    /// Authored elsewhere: removed locally only
    LocalOnly,
    NotFound,
}

struct Link {
    session: Arc<dyn TransportSession>,
    direction: LinkDirection,
    reader: Option<JoinHandle<()>>,
}

struct EngineInner {
    role: Mutex<Role>,
    store: Mutex<MessageStore>,
    dedup: Mutex<DedupFilter>,
    links: Mutex<HashMap<SessionId, Link>>,
    status: Mutex<ConnectionStatus>,
    events: EventBus,
}

// ----------------------------------------------------------------------------
// Sync Engine
// ----------------------------------------------------------------------------

/// Handle to one engine instance; clones share state
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("role", &self.role())
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl SyncEngine {
    /// Open the configured store and build an engine around it
    pub fn open(role: Role, config: &EngineConfig) -> Result<Self> {
        let store = MessageStore::open(config.store.clone())?;
        Ok(Self::new(role, store, config.dedup))
    }

    /// Build an engine; the filter is seeded with every stored id
    pub fn new(role: Role, store: MessageStore, dedup: DedupConfig) -> Self {
        let mut filter = DedupFilter::new(dedup);
        filter.seed(store.ids());
        info!(role = %role.as_wire(), stored = store.len(), "Sync engine ready");

        Self {
            inner: Arc::new(EngineInner {
                role: Mutex::new(role),
                store: Mutex::new(store),
                dedup: Mutex::new(filter),
                links: Mutex::new(HashMap::new()),
                status: Mutex::new(ConnectionStatus::Idle),
                events: EventBus::default(),
            }),
        }
    }

    pub fn role(&self) -> Role {
        *lock(&self.inner.role)
    }

    pub fn set_role(&self, role: Role) {
        *lock(&self.inner.role) = role;
    }

    /// Subscribe to engine events; earlier subscribers keep receiving
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.inner.status).clone()
    }

    /// Record and publish the latest connection event
    pub fn set_status(&self, status: ConnectionStatus) {
        info!(status = %status, "Status changed");
        *lock(&self.inner.status) = status.clone();
        self.inner.events.publish(EngineEvent::Status(status));
    }

    /// Snapshot of the store in insertion order
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.inner.store).all().to_vec()
    }

    /// Raw bytes of an image message
    pub fn attachment(&self, id: &MessageId) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.inner.store).load_attachment(id)?)
    }

    pub fn session_count(&self) -> usize {
        lock(&self.inner.links).len()
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Add a session to the active set and start consuming its frames
    pub fn attach(
        &self,
        session: Arc<dyn TransportSession>,
        direction: LinkDirection,
    ) -> Result<SessionId> {
        let id = session.id();
        let mut incoming = session
            .take_incoming()
            .ok_or_else(|| TransportError::IncomingTaken {
                session: id.to_string(),
            })?;
        let peer = session.peer().to_string();
        let transport = session.kind();

        lock(&self.inner.links).insert(
            id,
            Link {
                session: Arc::clone(&session),
                direction,
                reader: None,
            },
        );

        info!(session = %id, peer = %peer, ?direction, "Session attached");
        self.set_status(ConnectionStatus::Connected { peer, transport });

        let engine = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = incoming.next().await {
                engine.handle_frame(id, frame).await;
            }
            let reason = session
                .close_reason()
                .unwrap_or_else(|| "connection closed".to_string());
            engine.drop_session(id, reason).await;
        });
        if let Some(link) = lock(&self.inner.links).get_mut(&id) {
            link.reader = Some(reader);
        }
        Ok(id)
    }

    /// Remove a session from the active set and close it
    pub async fn drop_session(&self, id: SessionId, reason: String) {
        let Some(link) = lock(&self.inner.links).remove(&id) else {
            return;
        };
        let peer = link.session.peer().to_string();
        link.session.close().await;
        warn!(session = %id, peer = %peer, reason = %reason, "Session dropped");
        self.set_status(ConnectionStatus::Lost { peer, reason });
    }

    /// Close every session and stop their readers
    pub async fn shutdown(&self) {
        let links: Vec<Link> = lock(&self.inner.links).drain().map(|(_, l)| l).collect();
        for link in links {
            link.session.close().await;
            if let Some(reader) = link.reader {
                reader.abort();
            }
        }
        self.set_status(ConnectionStatus::Idle);
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Process one frame received on session `origin`
    pub async fn handle_frame(&self, origin: SessionId, frame: Frame) {
        debug!(session = %origin, kind = %frame.kind(), "Handling frame");
        match &frame {
            Frame::Text { role, id, content } => {
                let message = ChatMessage::text(id.clone(), role.as_sender(), content.clone());
                if self.apply(message, None).await {
                    self.relay(origin, &frame).await;
                }
            }
            Frame::Image { role, id, .. } => {
                let bytes = match frame.image_bytes() {
                    Some(Ok(bytes)) => bytes,
                    _ => {
                        warn!(session = %origin, message_id = %id, "Discarding undecodable image");
                        return;
                    }
                };
                let message = ChatMessage::image(id.clone(), role.as_sender());
                if self.apply(message, Some(bytes)).await {
                    self.relay(origin, &frame).await;
                }
            }
            Frame::Delete { id } => {
                if self.tombstone(id, false).await {
                    self.relay(origin, &frame).await;
                } else {
                    debug!(session = %origin, message_id = %id, "Delete for unknown message");
                }
            }
            Frame::Hello { name } => {
                info!(session = %origin, name = %name, "Peer greeted");
                self.inner
                    .events
                    .publish(EngineEvent::PeerGreeted { name: name.clone() });
            }
        }
    }

    /// Run a store operation on the blocking pool
    ///
    /// The store mutex is taken inside the closure, so writes stay serialized
    /// without holding a runtime worker during file I/O. `None` only when the
    /// runtime is shutting down.
    async fn with_store<T, F>(&self, operation: F) -> Option<T>
    where
        F: FnOnce(&EngineInner) -> T + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || operation(&inner)).await {
            Ok(value) => Some(value),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(error = %e, "Store operation cancelled");
                None
            }
        }
    }

    /// Store a remote message unless its id was already seen
    async fn apply(&self, message: ChatMessage, attachment: Option<Vec<u8>>) -> bool {
        let id = message.id.clone();
        let applied = self
            .with_store(move |inner| {
                let mut store = lock(&inner.store);
                if store.contains(&message.id) || !lock(&inner.dedup).should_apply(&message.id) {
                    return None;
                }
                let id = message.id.clone();
                let result = store.append(message.clone(), attachment.as_deref());
                Some((store.get(&id).cloned().unwrap_or(message), result))
            })
            .await
            .flatten();
        let Some((stored, result)) = applied else {
            debug!(message_id = %id, "Ignoring duplicate message");
            return false;
        };

        if let Err(e) = result {
            self.storage_failed(e);
        }
        debug!(message_id = %id, sender = ?stored.sender, "Applied message");
        self.inner.events.publish(EngineEvent::MessageApplied(stored));
        true
    }

    /// Remove `id` and append a removal notice; false if `id` is unknown
    async fn tombstone(&self, id: &MessageId, local_only: bool) -> bool {
        let notice = ChatMessage::removal_notice(local_only);
        let target = id.clone();
        let stored_notice = notice.clone();
        let result = self
            .with_store(move |inner| {
                let mut store = lock(&inner.store);
                if !store.contains(&target) {
                    return None;
                }
                Some(store.tombstone_with(&target, stored_notice))
            })
            .await
            .flatten();
        let Some(result) = result else {
            return false;
        };

        if let Err(e) = result {
            self.storage_failed(e);
        }
        info!(message_id = %id, local_only, "Message removed");
        self.inner
            .events
            .publish(EngineEvent::MessageRemoved { id: id.clone() });
        self.inner.events.publish(EngineEvent::MessageApplied(notice));
        true
    }

    fn storage_failed(&self, err: StorageError) {
        warn!(error = %err, "Persistence failed; keeping in-memory state");
        self.inner.events.publish(EngineEvent::StorageFailed {
            reason: err.to_string(),
        });
    }

    /// Host fan-out to every other downstream session
    async fn relay(&self, origin: SessionId, frame: &Frame) {
        if self.role() == Role::Host {
            self.send_to(frame, LinkDirection::Downstream, Some(origin))
                .await;
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Send a text message authored here
    ///
    /// Line breaks become spaces so the frame stays on one line.
    pub async fn send_text(&self, content: &str) -> ChatMessage {
        let role = self.role();
        let content: String = content
            .chars()
            .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
            .collect();
        let id = MessageId::text();
        let message = ChatMessage::text(id.clone(), role.as_sender(), content.clone());

        let stored = self.store_local(message, None).await;
        self.send_outbound(&Frame::Text { role, id, content }).await;
        stored
    }

    /// Send an image authored here
    pub async fn send_image(&self, bytes: &[u8]) -> ChatMessage {
        let role = self.role();
        let id = MessageId::image();
        let message = ChatMessage::image(id.clone(), role.as_sender());

        let stored = self.store_local(message, Some(bytes.to_vec())).await;
        self.send_outbound(&Frame::image_from_bytes(role, id, bytes))
            .await;
        stored
    }

    /// Delete a message
    ///
    /// Only the author's deletion reaches the peer; anyone else removes the
    /// message from their own store only.
    pub async fn request_delete(&self, id: &MessageId) -> DeleteOutcome {
        let role = self.role();
        let authored = match lock(&self.inner.store).get(id) {
            Some(message) => message.sender.is_role(role),
            None => return DeleteOutcome::NotFound,
        };

        if !self.tombstone(id, !authored).await {
            return DeleteOutcome::NotFound;
        }
        if authored {
            self.send_outbound(&Frame::Delete { id: id.clone() }).await;
            DeleteOutcome::Bilateral
        } else {
            DeleteOutcome::LocalOnly
        }
    }

    /// Record a locally authored message; its id is marked sent first so an
    /// echo is filtered
    async fn store_local(&self, message: ChatMessage, attachment: Option<Vec<u8>>) -> ChatMessage {
        let fallback = message.clone();
        let written = self
            .with_store(move |inner| {
                let mut store = lock(&inner.store);
                let id = message.id.clone();
                lock(&inner.dedup).mark_sent(&id);
                let result = store.append(message.clone(), attachment.as_deref());
                (store.get(&id).cloned().unwrap_or(message), result)
            })
            .await;
        let stored = match written {
            Some((stored, Ok(()))) => stored,
            Some((stored, Err(e))) => {
                self.storage_failed(e);
                stored
            }
            None => fallback,
        };
        self.inner
            .events
            .publish(EngineEvent::MessageApplied(stored.clone()));
        stored
    }

    async fn send_outbound(&self, frame: &Frame) {
        let direction = match self.role() {
            Role::Host => LinkDirection::Downstream,
            Role::Joiner => LinkDirection::Upstream,
        };
        let delivered = self.send_to(frame, direction, None).await;
        if delivered == 0 {
            debug!(kind = %frame.kind(), "No connected peer; kept locally");
        }
    }

    /// Send to every session in `direction` except `except`; returns the
    /// number of successful sends
    async fn send_to(
        &self,
        frame: &Frame,
        direction: LinkDirection,
        except: Option<SessionId>,
    ) -> usize {
        let targets: Vec<(SessionId, Arc<dyn TransportSession>)> = lock(&self.inner.links)
            .iter()
            .filter(|(id, link)| link.direction == direction && Some(**id) != except)
            .map(|(id, link)| (*id, Arc::clone(&link.session)))
            .collect();

        let results = join_all(targets.iter().map(|(_, session)| session.send(frame))).await;

        let mut delivered = 0;
        for ((id, _), result) in targets.into_iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => self.drop_session(id, e.to_string()).await,
            }
        }
        delivered
    }
}
