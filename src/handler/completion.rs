//! Completion handle for asynchronous handlers.
//!
//! An asynchronous handler gets a [`Completion`] as its last argument instead
//! of returning a value. Completing it sends the response; the connection
//! keeps processing other messages in the meantime.
//!
//! # Example
//!
//! ```ignore
//! table.method_async("later", |(ms,): (u64,), done: Completion| {
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(ms)).await;
//!         let _ = done.complete(&ms);
//!     });
//! });
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::Response;
use crate::writer::WriterHandle;

/// Error text sent when a handler panics before producing a result.
pub(crate) const HANDLER_PANICKED: &str = "handler panicked";

/// Sends the response for one asynchronous request.
///
/// Every completing method takes `self`, so a response is sent at most once.
/// Dropping a `Completion` without completing it leaves the caller waiting;
/// that is logged as a warning. Dropping it while a panic unwinds (the
/// handler or the task it was moved into panicked) sends an error response.
pub struct Completion {
    /// Id of the request being answered.
    request_id: u64,
    /// Writer for the response (None in detached mode).
    writer: Option<WriterHandle>,
    /// Set once a response has been produced.
    completed: bool,
}

impl Completion {
    /// Create a detached completion that discards its response (for testing).
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            writer: None,
            completed: false,
        }
    }

    pub(crate) fn with_writer(request_id: u64, writer: WriterHandle) -> Self {
        Self {
            request_id,
            writer: Some(writer),
            completed: false,
        }
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Serialize `value` and send it as the result.
    ///
    /// If `value` cannot be serialized the caller gets an error response and
    /// the serialization error is returned here as well.
    pub fn complete<T: Serialize>(self, value: &T) -> Result<()> {
        match JsonCodec::to_value(value) {
            Ok(value) => self.complete_value(value),
            Err(e) => {
                let id = self.request_id;
                self.finish(Response::error(id, e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Send an already-built JSON value as the result.
    pub fn complete_value(self, value: Value) -> Result<()> {
        let id = self.request_id;
        self.finish(Response::ok(id, value))
    }

    /// Send an error response.
    pub fn fail(self, message: impl fmt::Display) -> Result<()> {
        let id = self.request_id;
        self.finish(Response::error(id, message.to_string()))
    }

    fn finish(mut self, response: Response) -> Result<()> {
        self.completed = true;
        match &self.writer {
            Some(writer) => writer.send(&response.into()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("request_id", &self.request_id)
            .field("completed", &self.completed)
            .finish()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if std::thread::panicking() {
            tracing::error!("Handler for request {} panicked", self.request_id);
            if let Some(writer) = &self.writer {
                let response = Response::error(self.request_id, HANDLER_PANICKED);
                let _ = writer.send(&response.into());
            }
        } else {
            tracing::warn!(
                "Completion for request {} dropped without a result",
                self.request_id
            );
        }
    }
}
