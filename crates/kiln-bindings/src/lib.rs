//! Kiln Bindings
//!
//! Exposes native Rust values to Kiln script runtimes. Any runtime that
//! implements [`kiln_sdk::ScriptContext`] can host the bindings.
//!
//! # Overview
//!
//! - [`handle`]: runtime-managed slots holding native values, with four
//!   ownership modes deciding what finalization destroys
//! - [`registry`]: Rust type ↔ type tag, and tag-checked downcasts
//! - [`dispatch`]: per-type member tables resolved by joaat hash
//! - [`convert`] and [`document`]: script values ↔ JSON-shaped documents
//! - [`adapter`]: error and panic conversion at the call boundary
//! - [`Bindings`]: builds the function tree and installs it
//!
//! # Example
//!
//! ```ignore
//! use kiln_bindings::Bindings;
//! use kiln_engine::ScriptEngine;
//!
//! let mut engine = ScriptEngine::new();
//! Bindings::new().install(&mut engine)?;
//! let addr = engine.call_path("kiln.IpAddr", &["192.0.2.1".into()])?;
//! assert_eq!(engine.tostring(&addr)?, "192.0.2.1");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod args;
pub mod audio;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod document;
pub mod handle;
pub mod hash;
pub mod json;
pub mod namespace;
pub mod net;
pub mod reader;
pub mod registry;
pub mod vector;

mod bindings;

pub use adapter::{native_error, protect};
pub use bindings::Bindings;
pub use config::{BridgeConfig, ConfigError};
pub use convert::{from_document, to_document, to_document_limited};
pub use dispatch::{DispatchBuilder, DispatchTable};
pub use document::{decode, encode, Format, Node};
pub use handle::{allocate, Handle, OwnershipMode, Slot};
pub use hash::joaat;
pub use namespace::Namespace;
pub use registry::{check_any, check_handle, check_type, register_type, tag_of};

// Re-export the SDK so binding authors need a single dependency
pub use kiln_sdk;
