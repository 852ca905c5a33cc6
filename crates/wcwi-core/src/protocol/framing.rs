//! Line reassembly for byte-stream transports
//!
//! A serial link delivers arbitrary chunks with no message boundaries.
//! [`LineBuffer`] accumulates chunks and yields complete lines, retaining any
//! partial trailing data for the next read.

use crate::protocol::FRAME_DELIMITER;

/// Upper bound on buffered bytes without a delimiter (16 MiB)
pub const DEFAULT_MAX_PENDING: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_pending: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }

    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
        }
    }

    /// Append a chunk and return every line it completed
    ///
    /// Lines are returned without the delimiter; blank lines are skipped.
    /// If the partial line grows past the limit it is discarded and `overflowed`
    /// is reported through the second tuple element.
    pub fn push(&mut self, chunk: &[u8]) -> (Vec<Vec<u8>>, bool) {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..]
            .iter()
            .position(|b| *b == FRAME_DELIMITER)
        {
            let end = start + offset;
            let line = trim_line(&self.pending[start..end]);
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        let overflowed = self.pending.len() > self.max_pending;
        if overflowed {
            self.pending.clear();
        }
        (lines, overflowed)
    }

    /// Bytes held back waiting for a delimiter
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Remaining partial line, consumed at end of stream
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = trim_line(&self.pending).to_vec();
        self.pending.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Strip a trailing carriage return
fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
