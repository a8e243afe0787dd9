//! Error types for peerwire.

use thiserror::Error;

/// Main error type for all peerwire operations.
#[derive(Debug, Error)]
pub enum PeerwireError {
    /// I/O error on the underlying stream or socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (malformed frame, unclassifiable message, bad discovery reply).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The method is not exposed by the dispatch table or the remote peer.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A local handler reported a failure; the message is sent to the caller.
    #[error("{0}")]
    Handler(String),

    /// The peer answered with an error response.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Connection closed before the operation could complete.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Endpoint names a transport this crate cannot open.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// A message arrived for a message-transport session that was never opened.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Result type alias using PeerwireError.
pub type Result<T> = std::result::Result<T, PeerwireError>;
