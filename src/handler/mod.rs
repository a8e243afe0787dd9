//! Handler module - the local side of dispatch.
//!
//! Provides:
//! - [`DispatchTable`] - maps method names to handlers, answers reflection
//! - [`Handler`] - a synchronous or asynchronous local method
//! - [`Completion`] - lets an asynchronous handler respond later
//!
//! # Example
//!
//! ```
//! use peerwire::handler::{Completion, DispatchTable};
//!
//! let table = DispatchTable::new()
//!     .method("add", |(x, y): (i64, i64)| x + y)
//!     .method_async("echo_later", |(text,): (String,), done: Completion| {
//!         std::thread::spawn(move || {
//!             let _ = done.complete(&text);
//!         });
//!     });
//!
//! assert!(table.resolve("echo_later").unwrap().is_async());
//! ```

mod completion;
mod registry;

pub use completion::Completion;
pub(crate) use completion::HANDLER_PANICKED;
pub use registry::{AsyncHandlerFn, DispatchTable, Handler, SyncHandlerFn};
