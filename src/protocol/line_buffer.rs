//! Line buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so completed lines are split off without copying.
//! The buffer remembers how far it has already scanned for a terminator, so
//! a long line that trickles in over many reads is scanned only once.
//!
//! # Example
//!
//! ```
//! use peerwire::protocol::LineBuffer;
//!
//! let mut buffer = LineBuffer::new();
//!
//! assert!(buffer.push(b"{\"id\":1,\"result\":5").unwrap().is_empty());
//! let lines = buffer.push(b"}\n").unwrap();
//!
//! assert_eq!(&lines[0][..], b"{\"id\":1,\"result\":5}");
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{PeerwireError, Result};

/// Frame terminator on stream transports.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default maximum length of one unterminated line (16 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete lines.
pub struct LineBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no terminator.
    scanned: usize,
    /// Maximum allowed line length (terminator excluded).
    max_line_length: usize,
    /// Length of an overlong line not yet reported.
    overflow: Option<usize>,
}

impl LineBuffer {
    /// Create a new line buffer with default settings.
    ///
    /// Default capacity: 64KB, max line: 16MB.
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new line buffer with a custom max line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            max_line_length,
            overflow: None,
        }
    }

    /// Push data into the buffer and extract all complete lines.
    ///
    /// Lines are returned in arrival order without their terminator. Bytes
    /// after the last terminator stay buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a line grows past `max_line_length`.
    /// Lines completed before the overlong one in the same push are returned
    /// first; the error then comes from [`check`](Self::check) or the next
    /// push. Nothing after an overlong line is ever returned.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.check()?;
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();

        while let Some(pos) = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
        {
            let end = self.scanned + pos;
            let line = self.buffer.split_to(end + 1).freeze().slice(..end);
            self.scanned = 0;
            if line.len() > self.max_line_length {
                return self.overflowed(line.len(), lines);
            }
            lines.push(line);
        }

        self.scanned = self.buffer.len();
        if self.buffer.len() > self.max_line_length {
            return self.overflowed(self.buffer.len(), lines);
        }

        Ok(lines)
    }

    /// Report an overlong line held back by the last push.
    pub fn check(&mut self) -> Result<()> {
        match self.overflow.take() {
            Some(len) => Err(self.too_long(len)),
            None => Ok(()),
        }
    }

    fn overflowed(&mut self, len: usize, lines: Vec<Bytes>) -> Result<Vec<Bytes>> {
        self.clear();
        if lines.is_empty() {
            return Err(self.too_long(len));
        }
        self.overflow = Some(len);
        Ok(lines)
    }

    fn too_long(&self, len: usize) -> PeerwireError {
        PeerwireError::Protocol(format!(
            "Line length {} exceeds maximum {}",
            len, self.max_line_length
        ))
    }

    /// Get the number of buffered bytes (the unterminated tail).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut buffer = LineBuffer::new();

        let lines = buffer.push(b"{\"id\":1,\"result\":5}\n").unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(&lines[0][..], b"{\"id\":1,\"result\":5}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_push() {
        let mut buffer = LineBuffer::new();

        let lines = buffer.push(b"first\nsecond\nthird\n").unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(&lines[0][..], b"first");
        assert_eq!(&lines[1][..], b"second");
        assert_eq!(&lines[2][..], b"third");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_line_split_across_pushes() {
        let mut buffer = LineBuffer::new();

        let lines = buffer.push(b"{\"id\":1,\"result\":5").unwrap();
        assert!(lines.is_empty());
        assert_eq!(buffer.len(), 18);

        let lines = buffer.push(b"}\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(&lines[0][..], b"{\"id\":1,\"result\":5}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = LineBuffer::new();

        let lines = buffer.push(b"one\ntw").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(&lines[0][..], b"one");
        assert_eq!(buffer.len(), 2);

        let lines = buffer.push(b"o\nthree\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"two");
        assert_eq!(&lines[1][..], b"three");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = LineBuffer::new();
        let mut all_lines = Vec::new();

        for byte in b"hi\nthere\n" {
            all_lines.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_lines.len(), 2);
        assert_eq!(&all_lines[0][..], b"hi");
        assert_eq!(&all_lines[1][..], b"there");
    }

    #[test]
    fn test_empty_line() {
        let mut buffer = LineBuffer::new();

        let lines = buffer.push(b"\n").unwrap();

        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_empty());
    }

    #[test]
    fn test_unterminated_tail_is_kept() {
        let mut buffer = LineBuffer::new();

        buffer.push(b"done\npartial").unwrap();

        assert_eq!(buffer.len(), 7);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_max_line_length_validation() {
        let mut buffer = LineBuffer::with_max_line_length(8);

        assert!(buffer.push(b"12345678").is_ok());
        let result = buffer.push(b"9");

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_lines_before_overlong_line_are_kept() {
        let mut buffer = LineBuffer::with_max_line_length(4);

        let lines = buffer.push(b"ok
fine
waytoolong
late
").unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"ok");
        assert_eq!(&lines[1][..], b"fine");
        assert!(buffer.check().unwrap_err().to_string().contains("exceeds maximum"));
        assert!(buffer.check().is_ok());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_reported_by_next_push() {
        let mut buffer = LineBuffer::with_max_line_length(4);

        assert_eq!(buffer.push(b"ok
unterminated").unwrap().len(), 1);

        assert!(buffer.push(b"x\n").is_err());
    }

    #[test]
    fn test_max_line_length_terminated_line() {
        let mut buffer = LineBuffer::with_max_line_length(4);

        let result = buffer.push(b"toolong\n");

        assert!(result.is_err());
    }
}
