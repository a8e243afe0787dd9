//! Frame extraction for both transport kinds.
//!
//! Stream transports deliver arbitrary byte chunks, so frames are cut at
//! newline terminators by a [`LineBuffer`]. Message transports already
//! deliver one message per event; there every chunk is a frame as-is.

use bytes::Bytes;

use super::LineBuffer;
use crate::error::Result;

/// Turns transport deliveries into frame payloads.
pub enum Framer {
    /// Newline-delimited frames over a byte stream.
    Lines(LineBuffer),
    /// One frame per delivery, nothing added or stripped.
    Messages,
}

impl Framer {
    /// Framer for a byte stream.
    pub fn lines(max_line_length: usize) -> Self {
        Framer::Lines(LineBuffer::with_max_line_length(max_line_length))
    }

    /// Framer for a message transport.
    pub fn messages() -> Self {
        Framer::Messages
    }

    /// Feed one transport delivery and collect the completed frames.
    pub fn push(&mut self, chunk: Bytes) -> Result<Vec<Bytes>> {
        match self {
            Framer::Lines(buffer) => buffer.push(&chunk),
            Framer::Messages => Ok(vec![chunk]),
        }
    }

    /// Report an overlong line held back by the last push.
    pub fn check(&mut self) -> Result<()> {
        match self {
            Framer::Lines(buffer) => buffer.check(),
            Framer::Messages => Ok(()),
        }
    }

    /// Whether outbound messages need a line terminator.
    pub fn is_line_delimited(&self) -> bool {
        matches!(self, Framer::Lines(_))
    }
}
