//! Frame model and the line codec
//!
//! A [`Frame`] is the typed form of one wire line. [`FrameCodec`] turns frames
//! into lines and back; it is constructed with the role of the remote peer so
//! untagged legacy lines can be attributed to it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use core::fmt;
use sha2::{Digest, Sha256};

use crate::errors::ParseError;
use crate::protocol::FRAME_DELIMITER;
use crate::types::{MessageId, Role, Timestamp};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

const TEXT_PREFIX: &str = "TEXT:";
const IMAGE_PREFIX: &str = "IMAGE:";
const DELETE_PREFIX: &str = "DELETE:";
const HELLO_PREFIX: &str = "HELLO:";

/// Number of digest bytes used in synthesized legacy ids
const LEGACY_HASH_BYTES: usize = 8;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Decoded wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text {
        role: Role,
        id: MessageId,
        content: String,
    },
    Image {
        role: Role,
        id: MessageId,
        payload_base64: String,
    },
    Delete {
        id: MessageId,
    },
    /// Optional session greeting
    Hello {
        name: String,
    },
}

/// Frame discriminant, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Image,
    Delete,
    Hello,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Text => "TEXT",
            FrameKind::Image => "IMAGE",
            FrameKind::Delete => "DELETE",
            FrameKind::Hello => "HELLO",
        };
        f.write_str(name)
    }
}

impl Frame {
    /// Build an image frame from raw bytes
    pub fn image_from_bytes(role: Role, id: MessageId, bytes: &[u8]) -> Self {
        Frame::Image {
            role,
            id,
            payload_base64: STANDARD.encode(bytes),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text { .. } => FrameKind::Text,
            Frame::Image { .. } => FrameKind::Image,
            Frame::Delete { .. } => FrameKind::Delete,
            Frame::Hello { .. } => FrameKind::Hello,
        }
    }

    /// Message id carried by the frame, if any
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Frame::Text { id, .. } | Frame::Image { id, .. } | Frame::Delete { id } => Some(id),
            Frame::Hello { .. } => None,
        }
    }

    /// Decoded image bytes; `None` for non-image frames
    pub fn image_bytes(&self) -> Option<Result<Vec<u8>, ParseError>> {
        match self {
            Frame::Image { payload_base64, .. } => Some(
                STANDARD
                    .decode(payload_base64)
                    .map_err(|e| ParseError::InvalidPayload(e.to_string())),
            ),
            _ => None,
        }
    }

    /// Encode as a wire line without the terminator
    pub fn encode(&self) -> String {
        match self {
            Frame::Text { role, id, content } => {
                format!("{}{}:{}:{}", TEXT_PREFIX, role.as_wire(), id, content)
            }
            Frame::Image {
                role,
                id,
                payload_base64,
            } => format!(
                "{}{}:{}:{}",
                IMAGE_PREFIX,
                role.as_wire(),
                id,
                payload_base64
            ),
            Frame::Delete { id } => format!("{}{}", DELETE_PREFIX, id),
            Frame::Hello { name } => format!("{}{}", HELLO_PREFIX, name),
        }
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Line codec bound to the role of the remote peer
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    peer_role: Role,
}

impl FrameCodec {
    pub fn new(peer_role: Role) -> Self {
        Self { peer_role }
    }

    pub fn peer_role(&self) -> Role {
        self.peer_role
    }

    /// Encode without the terminator (one IP network message)
    pub fn encode(&self, frame: &Frame) -> String {
        frame.encode()
    }

    /// Encode with the newline terminator (byte-stream transports)
    pub fn encode_line(&self, frame: &Frame) -> Vec<u8> {
        let mut line = frame.encode().into_bytes();
        line.push(FRAME_DELIMITER);
        line
    }

    /// Decode one line; a trailing `\n` or `\r\n` is ignored
    pub fn decode(&self, raw: &[u8]) -> Result<Frame, ParseError> {
        let line = core::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        if let Some(rest) = line.strip_prefix(TEXT_PREFIX) {
            let (role, id, content) = split_tagged("TEXT", rest)?;
            return Ok(Frame::Text {
                role,
                id,
                content: content.to_string(),
            });
        }

        if let Some(rest) = line.strip_prefix(IMAGE_PREFIX) {
            let (role, id, payload) = split_tagged("IMAGE", rest)?;
            STANDARD
                .decode(payload)
                .map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
            return Ok(Frame::Image {
                role,
                id,
                payload_base64: payload.to_string(),
            });
        }

        if let Some(rest) = line.strip_prefix(DELETE_PREFIX) {
            if rest.is_empty() {
                return Err(ParseError::MissingField {
                    kind: "DELETE",
                    field: "id",
                });
            }
            return Ok(Frame::Delete {
                id: MessageId::new(rest),
            });
        }

        if let Some(rest) = line.strip_prefix(HELLO_PREFIX) {
            return Ok(Frame::Hello {
                name: rest.to_string(),
            });
        }

        Ok(self.legacy_text(line))
    }

    /// Untagged line from an older peer
    fn legacy_text(&self, line: &str) -> Frame {
        let digest = Sha256::digest(line.as_bytes());
        let id = format!(
            "recv_{}_{}",
            Timestamp::now().as_millis(),
            hex::encode(&digest[..LEGACY_HASH_BYTES])
        );
        Frame::Text {
            role: self.peer_role,
            id: MessageId::new(id),
            content: line.to_string(),
        }
    }
}

/// Split `<role>:<id>:<payload>`, keeping colons inside the payload
fn split_tagged<'a>(
    kind: &'static str,
    rest: &'a str,
) -> Result<(Role, MessageId, &'a str), ParseError> {
    let mut parts = rest.splitn(3, ':');
    let role = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField {
            kind,
            field: "role",
        })?;
    let id = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField { kind, field: "id" })?;
    let payload = parts.next().ok_or(ParseError::MissingField {
        kind,
        field: "payload",
    })?;
    Ok((role.parse()?, MessageId::new(id), payload))
}
