//! Transport adapters.
//!
//! - Byte streams: TCP and Unix domain sockets, newline-delimited
//! - Message transports: one message per delivery, via [`MessageHub`]
//!
//! Any other `AsyncRead + AsyncWrite` can be attached directly with
//! [`Node::attach_stream`](crate::Node::attach_stream).

mod messages;
mod socket;

pub use messages::MessageHub;
pub use socket::{Endpoint, Listener};
