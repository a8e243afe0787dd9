//! Socket transports: TCP everywhere, Unix domain sockets on Unix.
//!
//! # Example
//!
//! ```ignore
//! use peerwire::transport::Endpoint;
//!
//! let endpoint: Endpoint = "unix:///tmp/peerwire.sock".parse()?;
//! let listener = node.listen(&endpoint.to_string()).await?;
//! let session = listener.accept().await?;
//! ```

use std::fmt;
use std::str::FromStr;

use tokio::net::{TcpListener, TcpStream};

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::{PeerwireError, Result};
use crate::node::Node;
use crate::session::Session;

/// Where to connect or listen.
///
/// Parsed from `tcp://host:port`, a bare `host:port`, or `unix:///path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP address, `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = PeerwireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once("://") {
            Some(("tcp", addr)) if !addr.is_empty() => Ok(Endpoint::Tcp(addr.to_string())),
            #[cfg(unix)]
            Some(("unix", path)) if !path.is_empty() => Ok(Endpoint::Unix(PathBuf::from(path))),
            Some(_) => Err(PeerwireError::UnsupportedTransport(s.to_string())),
            None if s.contains(':') => Ok(Endpoint::Tcp(s.to_string())),
            None => Err(PeerwireError::UnsupportedTransport(s.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl Endpoint {
    /// Open a stream and run a connection of `node` on it.
    pub async fn connect(&self, node: &Node) -> Result<Session> {
        match self {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                tracing::debug!(endpoint = %self, "Connected");
                Ok(node.attach_stream(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                tracing::debug!(endpoint = %self, "Connected");
                Ok(node.attach_stream(stream))
            }
        }
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

/// Accepts streams and starts a connection on each.
///
/// A Unix socket file is removed when the listener is dropped.
pub struct Listener {
    node: Node,
    inner: Inner,
    endpoint: Endpoint,
}

impl Listener {
    /// Bind `endpoint`.
    ///
    /// For Unix sockets any stale socket file at the path is removed first.
    pub async fn bind(node: Node, endpoint: Endpoint) -> Result<Self> {
        let (inner, endpoint) = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await?;
                // Report the bound port when binding port 0.
                let local = listener.local_addr()?;
                (Inner::Tcp(listener), Endpoint::Tcp(local.to_string()))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = UnixListener::bind(&path)?;
                (Inner::Unix(listener, path.clone()), Endpoint::Unix(path))
            }
        };

        tracing::debug!(endpoint = %endpoint, "Listening");
        Ok(Self {
            node,
            inner,
            endpoint,
        })
    }

    /// The bound endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accept one stream and start a connection on it.
    pub async fn accept(&self) -> Result<Session> {
        match &self.inner {
            Inner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                tracing::debug!(%peer, "Accepted connection");
                Ok(self.node.attach_stream(stream))
            }
            #[cfg(unix)]
            Inner::Unix(listener, _) => {
                let (stream, _addr) = listener.accept().await?;
                tracing::debug!(endpoint = %self.endpoint, "Accepted connection");
                Ok(self.node.attach_stream(stream))
            }
        }
    }

    /// Accept forever. Each connection runs on its own task.
    ///
    /// Returns only when accepting fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            let session = self.accept().await?;
            tokio::spawn(async move {
                // Errors are logged by the session itself.
                let _ = session.wait().await;
            });
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Inner::Unix(_, path) = &self.inner {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
