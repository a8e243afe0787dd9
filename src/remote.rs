//! Remote proxy - local stand-in for the peer's methods.
//!
//! After the discovery handshake the connection builds a [`RemoteProxy`]
//! holding the peer's method names. Every call goes through the connection
//! task, which assigns the request id and records the completion in its
//! pending-request table. The proxy never changes after it is built.
//!
//! # Example
//!
//! ```ignore
//! let remote = session.remote().await?;
//!
//! // Callback style: the completion runs on the connection task.
//! remote.call("add", vec![json!(2), json!(3)], |result| {
//!     println!("2 + 3 = {:?}", result);
//! })?;
//!
//! // Awaitable, typed.
//! let sum: i64 = remote.invoke("add", &(2, 3)).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::codec::JsonCodec;
use crate::connection::{Command, ResponseCallback};
use crate::error::{PeerwireError, Result};

/// The peer's methods, callable from this side.
#[derive(Clone)]
pub struct RemoteProxy {
    /// Method names from the discovery reply, in the peer's order.
    methods: Arc<[String]>,
    /// Command channel into the connection task.
    commands: mpsc::UnboundedSender<Command>,
}

impl RemoteProxy {
    pub(crate) fn new(methods: Vec<String>, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            methods: methods.into(),
            commands,
        }
    }

    /// Method names the peer advertised.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Whether the peer advertised `name`.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    /// Stub for one advertised method.
    pub fn method(&self, name: &str) -> Option<RemoteMethod> {
        self.has_method(name).then(|| RemoteMethod {
            name: name.to_string(),
            proxy: self.clone(),
        })
    }

    /// Stubs for every advertised method.
    pub fn stubs(&self) -> Vec<RemoteMethod> {
        self.methods
            .iter()
            .map(|name| RemoteMethod {
                name: name.clone(),
                proxy: self.clone(),
            })
            .collect()
    }

    /// Call a peer method; `completion` receives the result.
    ///
    /// When this returns `Ok`, `completion` is invoked exactly once: with the
    /// peer's result, with `Remote` if the peer answered with an error, or
    /// with `ConnectionClosed` if the connection ends first. It runs on the
    /// connection task and must not block.
    ///
    /// Returns `MethodNotFound` without sending anything when the peer did
    /// not advertise `method`.
    pub fn call<F>(&self, method: &str, arguments: Vec<Value>, completion: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        if !self.has_method(method) {
            return Err(PeerwireError::MethodNotFound(method.to_string()));
        }
        let completion: ResponseCallback = Box::new(completion);
        self.commands
            .send(Command::Call {
                method: method.to_string(),
                arguments,
                completion,
            })
            .map_err(|_| PeerwireError::ConnectionClosed)
    }

    /// Call a peer method and wait for its result.
    pub async fn request(&self, method: &str, arguments: Vec<Value>) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.call(method, arguments, move |result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| PeerwireError::ConnectionClosed)?
    }

    /// Typed call: `args` serializes to the argument list (usually a tuple),
    /// the result deserializes into `R`.
    pub async fn invoke<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let arguments = JsonCodec::to_arguments(args)?;
        let value = self.request(method, arguments).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("methods", &self.methods)
            .finish()
    }
}

/// Stub for a single peer method.
#[derive(Clone, Debug)]
pub struct RemoteMethod {
    name: String,
    proxy: RemoteProxy,
}

impl RemoteMethod {
    /// The peer method's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// See [`RemoteProxy::call`].
    pub fn call<F>(&self, arguments: Vec<Value>, completion: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.proxy.call(&self.name, arguments, completion)
    }

    /// See [`RemoteProxy::request`].
    pub async fn request(&self, arguments: Vec<Value>) -> Result<Value> {
        self.proxy.request(&self.name, arguments).await
    }

    /// See [`RemoteProxy::invoke`].
    pub async fn invoke<A, R>(&self, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.proxy.invoke(&self.name, args).await
    }
}

/// Handle to the proxy a connection will build once discovery finishes.
///
/// Given to per-connection wrapper factories so local handlers can call back
/// into the peer.
#[derive(Clone, Debug)]
pub struct RemoteHandle {
    rx: watch::Receiver<Option<RemoteProxy>>,
}

impl RemoteHandle {
    pub(crate) fn new(rx: watch::Receiver<Option<RemoteProxy>>) -> Self {
        Self { rx }
    }

    /// The proxy, if discovery has completed.
    pub fn get(&self) -> Option<RemoteProxy> {
        self.rx.borrow().clone()
    }

    /// Whether discovery has completed.
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for discovery to complete.
    ///
    /// Returns `ConnectionClosed` if the connection ends first.
    pub async fn ready(&self) -> Result<RemoteProxy> {
        let mut rx = self.rx.clone();
        let current = match rx.wait_for(Option::is_some).await {
            Ok(proxy) => proxy.clone(),
            Err(_) => return Err(PeerwireError::ConnectionClosed),
        };
        current.ok_or(PeerwireError::ConnectionClosed)
    }
}
