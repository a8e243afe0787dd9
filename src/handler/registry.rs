//! Dispatch table mapping method names to local handlers.
//!
//! The table answers the `methods` reflection request used during discovery.
//! Unless a handler named `methods` is registered, a default one lists
//! `methods` followed by every registered name in registration order.
//!
//! # Example
//!
//! ```
//! use peerwire::handler::DispatchTable;
//!
//! let table = DispatchTable::new()
//!     .method("add", |(x, y): (i64, i64)| x + y)
//!     .method("sub", |(x, y): (i64, i64)| x - y);
//!
//! assert_eq!(table.method_names(), vec!["methods", "add", "sub"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::Completion;
use crate::codec::JsonCodec;
use crate::error::{PeerwireError, Result};
use crate::protocol::METHODS;

/// Signature of a synchronous handler: arguments in, result out.
pub type SyncHandlerFn = dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync;

/// Signature of an asynchronous handler: the result goes through the completion.
pub type AsyncHandlerFn = dyn Fn(Vec<Value>, Completion) + Send + Sync;

/// A local method, tagged by how it produces its result.
#[derive(Clone)]
pub enum Handler {
    /// Returns its result directly.
    Sync(Arc<SyncHandlerFn>),
    /// Receives a trailing [`Completion`] and completes it later.
    Async(Arc<AsyncHandlerFn>),
}

impl Handler {
    /// Wrap a synchronous function over raw JSON arguments.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous function over raw JSON arguments.
    pub fn asynchronous<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>, Completion) + Send + Sync + 'static,
    {
        Handler::Async(Arc::new(f))
    }

    /// Synchronous handler that deserializes its arguments into `T` and
    /// serializes its return value.
    pub fn typed<F, T, R>(f: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        Handler::sync(move |args| {
            let parsed: T = JsonCodec::from_arguments(args)?;
            JsonCodec::to_value(&f(parsed))
        })
    }

    /// Like [`Handler::typed`], for functions that can fail.
    ///
    /// The error's `Display` text is sent to the caller.
    pub fn fallible<F, T, R, E>(f: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        Handler::sync(move |args| {
            let parsed: T = JsonCodec::from_arguments(args)?;
            match f(parsed) {
                Ok(value) => JsonCodec::to_value(&value),
                Err(e) => Err(PeerwireError::Handler(e.to_string())),
            }
        })
    }

    /// Asynchronous handler with typed arguments.
    ///
    /// Arguments that fail to deserialize are answered with an error
    /// response without calling `f`.
    pub fn typed_async<F, T>(f: F) -> Self
    where
        F: Fn(T, Completion) + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
    {
        Handler::asynchronous(move |args, done: Completion| {
            match JsonCodec::from_arguments::<T>(args) {
                Ok(parsed) => f(parsed, done),
                Err(e) => {
                    let _ = done.fail(e);
                }
            }
        })
    }

    /// Whether this handler completes through a [`Completion`].
    #[inline]
    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// The local methods exposed to the peer.
#[derive(Clone, Default)]
pub struct DispatchTable {
    /// Handlers by name.
    handlers: HashMap<String, Handler>,
    /// Names in registration order (for reflection).
    order: Vec<String>,
}

impl DispatchTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed synchronous method.
    ///
    /// The argument list is deserialized into `T` (usually a tuple) and the
    /// return value is serialized as the result.
    pub fn method<F, T, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.insert(name, Handler::typed(f));
        self
    }

    /// Register a typed synchronous method that can fail.
    pub fn try_method<F, T, R, E>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, E> + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: fmt::Display + 'static,
    {
        self.insert(name, Handler::fallible(f));
        self
    }

    /// Register a typed asynchronous method.
    pub fn method_async<F, T>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(T, Completion) + Send + Sync + 'static,
        T: DeserializeOwned + 'static,
    {
        self.insert(name, Handler::typed_async(f));
        self
    }

    /// Register a synchronous method over raw JSON arguments.
    pub fn method_raw<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Handler::sync(f));
        self
    }

    /// Register an asynchronous method over raw JSON arguments.
    pub fn method_raw_async<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>, Completion) + Send + Sync + 'static,
    {
        self.insert(name, Handler::asynchronous(f));
        self
    }

    /// Insert or replace a handler.
    ///
    /// Registering `methods` replaces the default reflection.
    pub fn insert(&mut self, name: &str, handler: Handler) {
        if self.handlers.insert(name.to_string(), handler).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Get an explicitly registered handler.
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Find the handler that serves `name`, falling back to the default
    /// reflection for `methods`.
    pub fn resolve(&self, name: &str) -> Option<Handler> {
        if let Some(handler) = self.handlers.get(name) {
            return Some(handler.clone());
        }
        if name == METHODS {
            let names = self.method_names();
            return Some(Handler::sync(move |_| JsonCodec::to_value(&names)));
        }
        None
    }

    /// Names reported by the default reflection: `methods` first, then
    /// every registered method in registration order.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.order.len() + 1);
        names.push(METHODS.to_string());
        names.extend(self.order.iter().filter(|n| *n != METHODS).cloned());
        names
    }

    /// Whether a custom `methods` handler replaces the default reflection.
    pub fn has_custom_reflection(&self) -> bool {
        self.handlers.contains_key(METHODS)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("methods", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_sync(table: &DispatchTable, name: &str, args: Vec<Value>) -> Result<Value> {
        match table.resolve(name) {
            Some(Handler::Sync(f)) => f(args),
            other => panic!("expected sync handler for {}, got {:?}", name, other),
        }
    }

    #[test]
    fn test_default_reflection() {
        let table = DispatchTable::new()
            .method("add", |(x, y): (i64, i64)| x + y)
            .method("sub", |(x, y): (i64, i64)| x - y);

        assert!(!table.has_custom_reflection());
        assert!(table.get(METHODS).is_none());

        let names = call_sync(&table, METHODS, vec![]).unwrap();
        assert_eq!(names, json!(["methods", "add", "sub"]));
    }

    #[test]
    fn test_empty_table_reflection() {
        let table = DispatchTable::new();

        assert!(table.is_empty());
        assert_eq!(call_sync(&table, METHODS, vec![]).unwrap(), json!(["methods"]));
    }

    #[test]
    fn test_custom_reflection() {
        let table = DispatchTable::new()
            .method("secret", |(): ()| 1)
            .method_raw(METHODS, |_| Ok(json!(["methods", "public"])));

        assert!(table.has_custom_reflection());
        assert_eq!(
            call_sync(&table, METHODS, vec![]).unwrap(),
            json!(["methods", "public"])
        );
    }

    #[test]
    fn test_typed_method() {
        let table = DispatchTable::new().method("add", |(x, y): (i64, i64)| x + y);

        assert_eq!(
            call_sync(&table, "add", vec![json!(2), json!(3)]).unwrap(),
            json!(5)
        );
    }

    #[test]
    fn test_typed_method_bad_arguments() {
        let table = DispatchTable::new().method("add", |(x, y): (i64, i64)| x + y);

        let result = call_sync(&table, "add", vec![json!("two")]);
        assert!(matches!(result, Err(PeerwireError::Json(_))));
    }

    #[test]
    fn test_try_method_error() {
        let table = DispatchTable::new().try_method("div", |(x, y): (i64, i64)| {
            if y == 0 {
                Err("division by zero")
            } else {
                Ok(x / y)
            }
        });

        assert_eq!(
            call_sync(&table, "div", vec![json!(6), json!(3)]).unwrap(),
            json!(2)
        );
        let err = call_sync(&table, "div", vec![json!(1), json!(0)]).unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_async_flag() {
        let table = DispatchTable::new()
            .method("now", |(): ()| 0)
            .method_async("later", |(): (), done: Completion| {
                let _ = done.complete(&1);
            });

        assert!(!table.resolve("now").unwrap().is_async());
        assert!(table.resolve("later").unwrap().is_async());
    }

    #[test]
    fn test_unknown_method() {
        let table = DispatchTable::new();
        assert!(table.resolve("nope").is_none());
    }

    #[test]
    fn test_replace_keeps_order() {
        let mut table = DispatchTable::new()
            .method("a", |(): ()| 1)
            .method("b", |(): ()| 2);

        table.insert("a", Handler::typed(|(): ()| 10));

        assert_eq!(table.len(), 2);
        assert_eq!(table.method_names(), vec!["methods", "a", "b"]);
        assert_eq!(call_sync(&table, "a", vec![]).unwrap(), json!(10));
    }
}
