//! Core types for WCWI chat
//!
//! Newtypes and enums for the persisted chat record and the roles peers play
//! in a session.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

// ----------------------------------------------------------------------------
// Message Identifier
// ----------------------------------------------------------------------------

/// Globally unique message identifier
///
/// Ids travel inside `:`-delimited wire frames, so locally generated ids never
/// contain a colon.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate `<prefix>_<millis>_<uuid>`
    pub fn generate(prefix: &str) -> Self {
        Self(format!(
            "{}_{}_{}",
            prefix,
            Timestamp::now().as_millis(),
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Id for a locally authored text message
    pub fn text() -> Self {
        Self::generate("sent")
    }

    /// Id for a locally authored image message
    pub fn image() -> Self {
        Self::generate("image")
    }

    /// Id for a removal notice
    pub fn removal_notice(local_only: bool) -> Self {
        if local_only {
            Self::generate("local_removal")
        } else {
            Self::generate("removal")
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Roles and Senders
// ----------------------------------------------------------------------------

/// Role a peer plays in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Accepts connections and relays between joiners
    Host,
    /// Makes a single outbound connection to the host
    Joiner,
}

impl Role {
    /// Wire spelling of the role
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Host => "Host",
            Role::Joiner => "Joiner",
        }
    }

    /// The role at the other end of a session
    pub fn opposite(&self) -> Role {
        match self {
            Role::Host => Role::Joiner,
            Role::Joiner => Role::Host,
        }
    }

    pub fn as_sender(&self) -> Sender {
        match self {
            Role::Host => Sender::Host,
            Role::Joiner => Sender::Joiner,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    /// Accepts `Host`/`Joiner` and the legacy `Server`/`Client`, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "server" => Ok(Role::Host),
            "joiner" | "client" => Ok(Role::Joiner),
            _ => Err(ParseError::UnknownRole(s.to_string())),
        }
    }
}

/// Author of a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    Host,
    Joiner,
    /// Synthetic notices generated by the engine
    System,
}

impl Sender {
    pub fn is_role(&self, role: Role) -> bool {
        *self == role.as_sender()
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Host => f.write_str("Host"),
            Sender::Joiner => f.write_str("Joiner"),
            Sender::System => f.write_str("system"),
        }
    }
}

/// Physical link a session runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// WebSocket over the local IP network
    Ip,
    /// Bluetooth RFCOMM serial link
    Bluetooth,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ip => f.write_str("IP"),
            TransportKind::Bluetooth => f.write_str("Bluetooth"),
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Message
// ----------------------------------------------------------------------------

/// Content of removal notices
pub const REMOVED_NOTICE: &str = "The Message is Removed!";

/// Handle to an attachment blob owned by a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
}

impl AttachmentRef {
    /// Deterministic file name for the attachment of `id`
    ///
    /// Bytes outside `[A-Za-z0-9_.-]` are written as `%XX`, so distinct ids
    /// always get distinct names.
    pub fn for_message(id: &MessageId) -> Self {
        let mut escaped = String::with_capacity(id.as_str().len());
        for byte in id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
                escaped.push(char::from(byte));
            } else {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        }
        Self {
            file_name: format!("image_{}.jpg", escaped),
        }
    }
}

/// A persisted chat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Sender,
    pub content: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub timestamp: Timestamp,
}

impl ChatMessage {
    pub fn text(id: MessageId, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            content: Some(content.into()),
            attachment: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn image(id: MessageId, sender: Sender) -> Self {
        let attachment = AttachmentRef::for_message(&id);
        Self {
            id,
            sender,
            content: None,
            attachment: Some(attachment),
            timestamp: Timestamp::now(),
        }
    }

    /// System notice recording the removal of a message
    pub fn removal_notice(local_only: bool) -> Self {
        Self::text(
            MessageId::removal_notice(local_only),
            Sender::System,
            REMOVED_NOTICE,
        )
    }

    pub fn is_system(&self) -> bool {
        self.sender == Sender::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_accepts_aliases() {
        assert_eq!("Host".parse::<Role>().unwrap(), Role::Host);
        assert_eq!("server".parse::<Role>().unwrap(), Role::Host);
        assert_eq!("JOINER".parse::<Role>().unwrap(), Role::Joiner);
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Joiner);
        assert!(matches!(
            "observer".parse::<Role>(),
            Err(ParseError::UnknownRole(_))
        ));
    }

    #[test]
    fn generated_ids_are_unique_and_colon_free() {
        let a = MessageId::text();
        let b = MessageId::text();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sent_"));
        assert!(!a.as_str().contains(':'));
        assert!(MessageId::removal_notice(true)
            .as_str()
            .starts_with("local_removal_"));
    }

    #[test]
    fn attachment_names_are_deterministic_and_sanitised() {
        let id = MessageId::new("img1");
        assert_eq!(AttachmentRef::for_message(&id).file_name, "image_img1.jpg");
        assert_eq!(
            AttachmentRef::for_message(&MessageId::new("../x/y")).file_name,
            "image_..%2Fx%2Fy.jpg"
        );
    }

    #[test]
    fn attachment_names_do_not_collide() {
        let names: Vec<String> = ["a/b", "a_b", "a%2Fb", "a:b", "a b"]
            .iter()
            .map(|id| AttachmentRef::for_message(&MessageId::new(*id)).file_name)
            .collect();
        for (i, name) in names.iter().enumerate() {
            assert!(!name.contains('/'));
            assert_eq!(names.iter().filter(|n| *n == name).count(), 1, "{} repeats", names[i]);
        }
        assert_eq!(names[2], "image_a%252Fb.jpg");
    }

    #[test]
    fn record_serialises_with_flat_fields() {
        let mut msg = ChatMessage::text(MessageId::new("msg1"), Sender::Joiner, "Hello");
        msg.timestamp = Timestamp::new(42);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "msg1");
        assert_eq!(json["sender"], "Joiner");
        assert_eq!(json["content"], "Hello");
        assert!(json["attachment"].is_null());
        assert_eq!(json["timestamp"], 42);
    }
}
