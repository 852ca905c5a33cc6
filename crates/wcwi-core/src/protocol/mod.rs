//! WCWI wire protocol
//!
//! Frames are newline-terminated UTF-8 lines shared by both transports:
//!
//! ```text
//! TEXT:<role>:<id>:<content>
//! IMAGE:<role>:<id>:<base64>
//! DELETE:<id>
//! HELLO:<name>
//! ```
//!
//! The IP transport carries one line per network message; the Bluetooth
//! transport carries a raw byte stream that [`LineBuffer`] splits back into
//! lines.

pub mod dedup;
pub mod frame;
pub mod framing;

pub use dedup::DedupFilter;
pub use frame::{Frame, FrameCodec, FrameKind};
pub use framing::LineBuffer;

/// Line terminator used on every transport
pub const FRAME_DELIMITER: u8 = b'\n';
