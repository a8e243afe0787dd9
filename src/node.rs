//! Node builder and entry points.
//!
//! A [`Node`] holds what every connection it starts shares: the wrapper
//! that produces the local [`DispatchTable`], the event callbacks and the
//! configuration. Connections are started with [`Node::connect`],
//! [`Node::listen`], or by attaching an already-open transport.
//!
//! # Example
//!
//! ```ignore
//! use peerwire::{DispatchTable, Node};
//!
//! let node = Node::builder(DispatchTable::new().method("add", |(x, y): (i64, i64)| x + y))
//!     .on_ready(|remote, conn| {
//!         tracing::info!(conn = conn.id(), "peer offers {:?}", remote.methods());
//!     })
//!     .build();
//!
//! let listener = node.listen("tcp://127.0.0.1:5004").await?;
//! listener.run().await?;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::connection::{ConnectionHandle, Events};
use crate::error::Result;
use crate::handler::DispatchTable;
use crate::protocol::{Request, Response, DEFAULT_MAX_LINE_LENGTH};
use crate::remote::{RemoteHandle, RemoteProxy};
use crate::session::{self, Session, Setup};
use crate::transport::{Endpoint, Listener};
use crate::writer::SessionWriter;

/// Default socket read chunk size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

type Factory = dyn Fn(RemoteHandle) -> Arc<DispatchTable> + Send + Sync;

/// Produces the local dispatch table for each new connection.
///
/// Either one table shared by every connection, or a factory called per
/// connection with a handle to that connection's future remote proxy.
#[derive(Clone)]
pub struct Wrapper(Arc<Factory>);

impl Wrapper {
    /// Serve the same table on every connection.
    pub fn shared(table: DispatchTable) -> Self {
        let table = Arc::new(table);
        Wrapper(Arc::new(move |_| table.clone()))
    }

    /// Build a table per connection.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(RemoteHandle) -> DispatchTable + Send + Sync + 'static,
    {
        Wrapper(Arc::new(move |remote| Arc::new(f(remote))))
    }

    pub(crate) fn build(&self, remote: RemoteHandle) -> Arc<DispatchTable> {
        (self.0)(remote)
    }
}

impl From<DispatchTable> for Wrapper {
    fn from(table: DispatchTable) -> Self {
        Wrapper::shared(table)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Wrapper")
    }
}

/// Transport tuning shared by a node's connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Maximum bytes buffered for one unterminated line.
    pub max_frame_size: usize,
    /// Size of each socket read.
    pub read_buffer_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_LINE_LENGTH,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for a [`Node`].
pub struct NodeBuilder {
    wrapper: Wrapper,
    config: NodeConfig,
    events: Events,
}

impl NodeBuilder {
    fn new(wrapper: Wrapper) -> Self {
        Self {
            wrapper,
            config: NodeConfig::default(),
            events: Events::default(),
        }
    }

    /// Set the maximum frame size.
    ///
    /// A line that grows past this without a terminator closes the
    /// connection with a protocol error.
    /// Default: 16 MiB
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the socket read chunk size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    /// Called on the connection task once the peer's methods are known.
    pub fn on_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(RemoteProxy, ConnectionHandle) + Send + Sync + 'static,
    {
        self.events.on_ready = Some(Arc::new(f));
        self
    }

    /// Called after every inbound request has been dispatched.
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.events.on_request = Some(Arc::new(f));
        self
    }

    /// Called after every inbound response has been correlated.
    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.events.on_response = Some(Arc::new(f));
        self
    }

    /// Finish building.
    pub fn build(self) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                wrapper: self.wrapper,
                config: self.config,
                events: self.events,
                next_connection: AtomicU64::new(1),
            }),
        }
    }
}

struct NodeInner {
    wrapper: Wrapper,
    config: NodeConfig,
    events: Events,
    next_connection: AtomicU64,
}

/// Starts connections that expose one wrapper.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Node with default configuration and no callbacks.
    pub fn new(wrapper: impl Into<Wrapper>) -> Self {
        Self::builder(wrapper).build()
    }

    /// Start configuring a node.
    pub fn builder(wrapper: impl Into<Wrapper>) -> NodeBuilder {
        NodeBuilder::new(wrapper.into())
    }

    /// Active configuration.
    pub fn config(&self) -> NodeConfig {
        self.inner.config
    }

    /// Run a connection over any bidirectional byte stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach_stream<S>(&self, stream: S) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        session::spawn_stream(self.setup(), stream)
    }

    /// Run a connection over a message transport session.
    ///
    /// Every item received on `inbound` is one message; every outbound
    /// message is handed to `writer` without a terminator.
    pub fn attach_messages<W>(&self, inbound: mpsc::UnboundedReceiver<Bytes>, writer: W) -> Session
    where
        W: SessionWriter,
    {
        session::spawn_messages(self.setup(), inbound, writer)
    }

    /// Open a stream to `endpoint` and start a connection on it.
    pub async fn connect(&self, endpoint: &str) -> Result<Session> {
        let endpoint: Endpoint = endpoint.parse()?;
        endpoint.connect(self).await
    }

    /// Bind `endpoint`; every accepted stream gets its own connection.
    pub async fn listen(&self, endpoint: &str) -> Result<Listener> {
        let endpoint: Endpoint = endpoint.parse()?;
        Listener::bind(self.clone(), endpoint).await
    }

    fn setup(&self) -> Setup<'_> {
        Setup {
            id: self.inner.next_connection.fetch_add(1, Ordering::Relaxed),
            wrapper: &self.inner.wrapper,
            config: self.inner.config,
            events: self.inner.events.clone(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerwireError;
    use std::sync::Mutex;

    #[test]
    fn test_builder_defaults() {
        let node = Node::new(DispatchTable::new());

        assert_eq!(node.config(), NodeConfig::default());
        assert_eq!(node.config().max_frame_size, 16 * 1024 * 1024);
        assert_eq!(node.config().read_buffer_size, 64 * 1024);
    }

    #[test]
    fn test_builder_configuration() {
        let node = Node::builder(DispatchTable::new())
            .max_frame_size(1024)
            .read_buffer_size(0)
            .build();

        assert_eq!(node.config().max_frame_size, 1024);
        assert_eq!(node.config().read_buffer_size, 1);
    }

    #[test]
    fn test_factory_called_per_connection() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let wrapper = Wrapper::factory(move |_remote| {
            *counter.lock().unwrap() += 1;
            DispatchTable::new().method("n", |(): ()| 1)
        });

        let (_tx, rx) = tokio::sync::watch::channel(None);
        let a = wrapper.build(RemoteHandle::new(rx.clone()));
        let b = wrapper.build(RemoteHandle::new(rx));

        assert_eq!(*calls.lock().unwrap(), 2);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_shared_table_is_reused() {
        let wrapper = Wrapper::shared(DispatchTable::new());
        let (_tx, rx) = tokio::sync::watch::channel(None);

        let a = wrapper.build(RemoteHandle::new(rx.clone()));
        let b = wrapper.build(RemoteHandle::new(rx));

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_connection_ids_increase() {
        let node = Node::new(DispatchTable::new());
        let (a, _pa) = tokio::io::duplex(1024);
        let (b, _pb) = tokio::io::duplex(1024);

        let first = node.attach_stream(a);
        let second = node.attach_stream(b);

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_endpoint() {
        let node = Node::new(DispatchTable::new());

        let err = node.connect("ws://localhost:80").await.unwrap_err();

        assert!(matches!(err, PeerwireError::UnsupportedTransport(_)));
    }
}
