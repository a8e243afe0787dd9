//! Adapter for message-oriented transports.
//!
//! A transport that already delivers whole messages per client session
//! (websocket-style push channels) registers each session with a
//! [`MessageHub`]: open it when the client connects, deliver every message
//! it sends, close it when the client goes away. Each session gets its own
//! connection with no line framing.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{PeerwireError, Result};
use crate::node::Node;
use crate::session::Session;
use crate::writer::SessionWriter;

/// Routes per-session messages to their connections.
pub struct MessageHub {
    node: Node,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<Bytes>>>,
}

impl MessageHub {
    /// Hub whose sessions run connections of `node`.
    pub fn new(node: Node) -> Self {
        Self {
            node,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a connection for a newly connected client.
    ///
    /// Reopening an id replaces the old session; the old connection sees end
    /// of input.
    pub fn open<W: SessionWriter>(&self, id: &str, writer: W) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.node.attach_messages(rx, writer);
        let mut sessions = self.lock();
        prune(&mut sessions);
        let replaced = sessions.insert(id.to_string(), tx);
        drop(sessions);
        if replaced.is_some() {
            tracing::warn!(session = id, "Session reopened, previous connection ended");
        }
        tracing::debug!(session = id, conn = session.id(), "Session opened");
        session
    }

    /// Hand one message from client `id` to its connection.
    pub fn deliver(&self, id: &str, payload: impl Into<Bytes>) -> Result<()> {
        let mut sessions = self.lock();
        let tx = sessions
            .get(id)
            .ok_or_else(|| PeerwireError::UnknownSession(id.to_string()))?;
        if tx.send(payload.into()).is_err() {
            sessions.remove(id);
            return Err(PeerwireError::ConnectionClosed);
        }
        Ok(())
    }

    /// Client `id` disconnected. Its connection sees end of input.
    ///
    /// Returns whether the session was known.
    pub fn close(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::debug!(session = id, "Session closed");
        }
        removed
    }

    /// Number of open sessions.
    ///
    /// Sessions whose connection has ended are dropped first.
    pub fn len(&self) -> usize {
        let mut sessions = self.lock();
        prune(&mut sessions);
        sessions.len()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Bytes>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forget sessions whose connection task has exited.
fn prune(sessions: &mut HashMap<String, mpsc::UnboundedSender<Bytes>>) {
    sessions.retain(|id, tx| {
        let open = !tx.is_closed();
        if !open {
            tracing::debug!(session = %id, "Session ended, removing");
        }
        open
    });
}

impl std::fmt::Debug for MessageHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHub")
            .field("sessions", &self.len())
            .finish()
    }
}
