//! Per-stream connection state machine.
//!
//! A [`Connection`] owns the send counter, the pending-request table and the
//! discovery state for one transport stream. It is driven by a single task
//! (see [`session`](crate::session)), so none of its tables need locking:
//!
//! 1. On connect, request the peer's `methods` (id 0)
//! 2. Serve every inbound request from the local [`DispatchTable`]
//! 3. Hand every inbound response to the completion registered for its id
//! 4. When the `methods` reply arrives, build the [`RemoteProxy`] and go `Ready`
//!
//! Inbound requests are served in every state; discovery only gates when the
//! local proxy becomes usable.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::{PeerwireError, Result};
use crate::handler::{Completion, DispatchTable, Handler, HANDLER_PANICKED};
use crate::protocol::{Message, Request, Response, METHODS};
use crate::remote::RemoteProxy;
use crate::writer::WriterHandle;

/// Receives the result of an outgoing call. Invoked exactly once.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value>) + Send + 'static>;

/// Called once discovery completes.
pub type ReadyCallback = Arc<dyn Fn(RemoteProxy, ConnectionHandle) + Send + Sync>;

/// Called after each inbound request has been dispatched.
pub type RequestObserver = Arc<dyn Fn(&Request) + Send + Sync>;

/// Called after each inbound response has been correlated.
pub type ResponseObserver = Arc<dyn Fn(&Response) + Send + Sync>;

/// Application callbacks shared by every connection of a node.
#[derive(Clone, Default)]
pub(crate) struct Events {
    pub(crate) on_ready: Option<ReadyCallback>,
    pub(crate) on_request: Option<RequestObserver>,
    pub(crate) on_response: Option<ResponseObserver>,
}

/// Work submitted to the connection task from outside.
pub(crate) enum Command {
    /// Send a request and register its completion.
    Call {
        method: String,
        arguments: Vec<Value>,
        completion: ResponseCallback,
    },
    /// Stop the connection.
    Close,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport not yet established.
    Connecting,
    /// `methods` request sent, reply outstanding.
    AwaitingPeerMethods,
    /// Remote proxy built.
    Ready,
    /// Transport closed.
    Closed,
}

/// Control handle for a running connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Serial number of this connection within its node.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current handshake state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Ask the connection to close. Pending calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Whether the connection task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Entry in the pending-request table.
enum Pending {
    /// Our own `methods` request.
    Discovery,
    /// An application call.
    Call(ResponseCallback),
}

pub(crate) struct Connection {
    id: u64,
    state: watch::Sender<ConnectionState>,
    dispatch: Arc<DispatchTable>,
    writer: WriterHandle,
    /// Id for the next outgoing request.
    next_id: u64,
    pending: HashMap<u64, Pending>,
    /// Cloned into the remote proxy.
    commands: mpsc::UnboundedSender<Command>,
    remote: watch::Sender<Option<RemoteProxy>>,
    events: Events,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        dispatch: Arc<DispatchTable>,
        writer: WriterHandle,
        commands: mpsc::UnboundedSender<Command>,
        remote: watch::Sender<Option<RemoteProxy>>,
        events: Events,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id,
            state,
            dispatch,
            writer,
            next_id: 0,
            pending: HashMap::new(),
            commands,
            remote,
            events,
        }
    }

    /// Control handle sharing this connection's command channel.
    pub(crate) fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            commands: self.commands.clone(),
            state: self.state.subscribe(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Transport established: start discovery.
    pub(crate) fn on_connect(&mut self) -> Result<()> {
        self.send_request(METHODS.to_string(), Vec::new(), Pending::Discovery)?;
        self.state.send_replace(ConnectionState::AwaitingPeerMethods);
        tracing::debug!(conn = self.id, "Discovery request sent");
        Ok(())
    }

    /// Process one inbound frame.
    ///
    /// Errors are fatal to the connection.
    pub(crate) fn on_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        match Message::classify(frame)? {
            Some(Message::Request(request)) => self.serve(request),
            Some(Message::Response(response)) => self.correlate(response),
            None => {
                tracing::warn!(
                    conn = self.id,
                    "Ignoring message with neither method nor result: {}",
                    String::from_utf8_lossy(frame)
                );
                Ok(())
            }
        }
    }

    /// Send an application call.
    pub(crate) fn call(
        &mut self,
        method: String,
        arguments: Vec<Value>,
        completion: ResponseCallback,
    ) -> Result<()> {
        self.send_request(method, arguments, Pending::Call(completion))
            .map(|_| ())
    }

    /// Transport closed: fail every pending call, oldest first.
    pub(crate) fn close(&mut self) {
        self.state.send_replace(ConnectionState::Closed);

        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);

        if !pending.is_empty() {
            tracing::debug!(
                conn = self.id,
                "Failing {} pending request(s) on close",
                pending.len()
            );
        }
        for (_, entry) in pending {
            if let Pending::Call(completion) = entry {
                completion(Err(PeerwireError::ConnectionClosed));
            }
        }
    }

    /// Allocate an id, register `pending` under it and write the request.
    fn send_request(
        &mut self,
        method: String,
        arguments: Vec<Value>,
        pending: Pending,
    ) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, pending);

        tracing::trace!(conn = self.id, id, method = %method, "Sending request");
        self.writer
            .send(&Message::Request(Request::new(id, method, arguments)))?;
        Ok(id)
    }

    fn serve(&mut self, mut request: Request) -> Result<()> {
        let id = request.id;
        let arguments = if self.events.on_request.is_some() {
            request.arguments.clone()
        } else {
            std::mem::take(&mut request.arguments)
        };

        match self.dispatch.resolve(&request.method) {
            Some(Handler::Sync(f)) => {
                let response = match panic::catch_unwind(AssertUnwindSafe(|| f(arguments))) {
                    Ok(Ok(result)) => Response::ok(id, result),
                    Ok(Err(e)) => {
                        tracing::debug!(
                            conn = self.id,
                            "Handler {} failed for request {}: {}",
                            request.method,
                            id,
                            e
                        );
                        Response::error(id, e.to_string())
                    }
                    Err(_) => {
                        tracing::error!(
                            conn = self.id,
                            "Handler {} panicked on request {}",
                            request.method,
                            id
                        );
                        Response::error(id, HANDLER_PANICKED)
                    }
                };
                self.writer.send(&Message::Response(response))?;
            }
            Some(Handler::Async(f)) => {
                let done = Completion::with_writer(id, self.writer.clone());
                // An unfinished completion answers with an error as it unwinds.
                let _ = panic::catch_unwind(AssertUnwindSafe(|| f(arguments, done)));
            }
            None => {
                tracing::warn!(
                    conn = self.id,
                    "Request {} for unknown method {}",
                    id,
                    request.method
                );
                let error = PeerwireError::MethodNotFound(request.method.clone());
                self.writer
                    .send(&Message::Response(Response::error(id, error.to_string())))?;
            }
        }

        if let Some(on_request) = &self.events.on_request {
            on_request(&request);
        }
        Ok(())
    }

    fn correlate(&mut self, response: Response) -> Result<()> {
        let observed = self.events.on_response.as_ref().map(|_| response.clone());

        match self.pending.remove(&response.id) {
            Some(Pending::Call(completion)) => completion(response.into_result()),
            Some(Pending::Discovery) => self.complete_discovery(response)?,
            None => {
                tracing::warn!(
                    conn = self.id,
                    "Ignoring response for unknown request id {}",
                    response.id
                );
            }
        }

        if let (Some(on_response), Some(response)) = (&self.events.on_response, observed) {
            on_response(&response);
        }
        Ok(())
    }

    fn complete_discovery(&mut self, response: Response) -> Result<()> {
        let value = response
            .into_result()
            .map_err(|e| PeerwireError::Protocol(format!("discovery failed: {}", e)))?;
        let methods: Vec<String> = serde_json::from_value(value)
            .map_err(|e| PeerwireError::Protocol(format!("malformed methods list: {}", e)))?;

        let proxy = RemoteProxy::new(methods, self.commands.clone());
        self.state.send_replace(ConnectionState::Ready);
        self.remote.send_replace(Some(proxy.clone()));

        tracing::debug!(conn = self.id, methods = ?proxy.methods(), "Remote ready");

        if let Some(on_ready) = &self.events.on_ready {
            on_ready(proxy, self.handle());
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // No-op after an orderly close; on unwind this still fails every
        // pending call exactly once.
        if !self.pending.is_empty() {
            self.close();
        }
    }
}
