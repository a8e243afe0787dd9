//! Codec module - the textual wire representation of messages.
//!
//! - [`JsonCodec`] - JSON using `serde_json`, plus helpers that map typed
//!   argument lists to and from the positional `arguments` array.
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is picked at compile time.
//!
//! # Example
//!
//! ```
//! use peerwire::codec::JsonCodec;
//!
//! let args = JsonCodec::to_arguments(&(2, 3)).unwrap();
//! assert_eq!(args.len(), 2);
//!
//! let (x, y): (i64, i64) = JsonCodec::from_arguments(args).unwrap();
//! assert_eq!(x + y, 5);
//! ```

mod json;

pub use json::JsonCodec;
