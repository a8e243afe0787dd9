//! # peerwire
//!
//! Symmetric request/response RPC over newline-delimited JSON.
//!
//! Both ends of a connection are peers: each exposes a table of named
//! methods and can call the methods the other side exposes. On connect each
//! side asks the other for its method names (`methods`, id 0) and builds a
//! [`RemoteProxy`] from the reply.
//!
//! ## Architecture
//!
//! - **Framing**: one JSON object per `\n`-terminated line on byte streams,
//!   one object per delivery on message transports
//! - **Dispatch**: [`DispatchTable`] of synchronous or asynchronous handlers
//! - **Correlation**: a per-connection pending table keyed by request id,
//!   so responses may arrive in any order
//! - **Runtime**: one tokio task per connection plus a writer task
//!
//! ## Example
//!
//! ```ignore
//! use peerwire::{DispatchTable, Node};
//!
//! #[tokio::main]
//! async fn main() -> peerwire::Result<()> {
//!     let node = Node::new(DispatchTable::new().method("add", |(x, y): (i64, i64)| x + y));
//!     let session = node.connect("tcp://127.0.0.1:5004").await?;
//!
//!     let remote = session.remote().await?;
//!     let sum: i64 = remote.invoke("add", &(2, 3)).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod connection;
mod node;
mod remote;
mod session;

pub use connection::{
    ConnectionHandle, ConnectionState, ReadyCallback, RequestObserver, ResponseCallback,
    ResponseObserver,
};
pub use error::{PeerwireError, Result};
pub use handler::{Completion, DispatchTable, Handler};
pub use node::{Node, NodeBuilder, NodeConfig, Wrapper, DEFAULT_READ_BUFFER_SIZE};
pub use protocol::{Message, Request, Response};
pub use remote::{RemoteHandle, RemoteMethod, RemoteProxy};
pub use session::Session;
pub use transport::{Endpoint, Listener, MessageHub};
pub use writer::SessionWriter;
