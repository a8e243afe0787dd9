//! Protocol module - messages and framing.
//!
//! - Request/response message shapes and classification
//! - Line buffer for newline-delimited stream framing
//! - Framer that also covers message-based transports

mod framer;
mod line_buffer;
mod message;

pub use framer::Framer;
pub use line_buffer::{LineBuffer, DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR};
pub use message::{Message, Request, Response, METHODS};
