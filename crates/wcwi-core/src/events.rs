//! Engine events
//!
//! The engine publishes everything the presentation layer observes on a
//! multi-subscriber broadcast bus. Subscribing never displaces an earlier
//! subscriber.

use core::fmt;
use tokio::sync::broadcast;

use crate::types::{ChatMessage, MessageId, TransportKind};

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ----------------------------------------------------------------------------
// Connection Status
// ----------------------------------------------------------------------------

/// Last significant connection event, rendered as a status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting { peer: String },
    Listening { transport: TransportKind, endpoint: String },
    Connected { peer: String, transport: TransportKind },
    Lost { peer: String, reason: String },
    Error { reason: String },
    PermissionRequired { reason: String },
    NoPeerFound,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "Idle"),
            ConnectionStatus::Connecting { peer } => write!(f, "Connecting to {}...", peer),
            ConnectionStatus::Listening {
                transport,
                endpoint,
            } => write!(f, "Listening for {} peers on {}", transport, endpoint),
            ConnectionStatus::Connected { peer, transport } => {
                write!(f, "Connected to {} via {}", peer, transport)
            }
            ConnectionStatus::Lost { peer, reason } => {
                write!(f, "Connection to {} lost: {}", peer, reason)
            }
            ConnectionStatus::Error { reason } => write!(f, "Error: {}", reason),
            ConnectionStatus::PermissionRequired { reason } => {
                write!(f, "Permission required: {}", reason)
            }
            ConnectionStatus::NoPeerFound => write!(f, "No server found"),
        }
    }
}

// ----------------------------------------------------------------------------
// Engine Events
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A message (including system notices) was applied to the store
    MessageApplied(ChatMessage),
    /// A message was removed from the store
    MessageRemoved { id: MessageId },
    /// A peer introduced itself
    PeerGreeted { name: String },
    Status(ConnectionStatus),
    /// Persistence failed; the in-memory view is still current
    StorageFailed { reason: String },
}

/// Broadcast bus for [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.publish(EngineEvent::PeerGreeted {
            name: "alice".into(),
        });

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                EngineEvent::PeerGreeted {
                    name: "alice".into()
                }
            );
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(EngineEvent::Status(ConnectionStatus::Idle));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn status_renders_human_readable() {
        assert_eq!(ConnectionStatus::NoPeerFound.to_string(), "No server found");
        assert_eq!(
            ConnectionStatus::Connected {
                peer: "10.0.0.2:9876".into(),
                transport: TransportKind::Ip
            }
            .to_string(),
            "Connected to 10.0.0.2:9876 via IP"
        );
    }
}
