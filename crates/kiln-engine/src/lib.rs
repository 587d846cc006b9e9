//! Kiln Engine - reference script runtime
//!
//! A small single-threaded runtime with the value model native bindings
//! target:
//! - **Tables**: insertion-ordered, nil entries kept (`table` module)
//! - **Objects**: native functions and tagged userdata (`object` module)
//! - **GC**: slot heap, root set and a mark-sweep collector that runs
//!   userdata finalizers (`gc` module)
//! - **Engine**: `ScriptEngine`, the `kiln_sdk::ScriptContext` implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_engine::ScriptEngine;
//! use kiln_sdk::{native_fn, ScriptContext, ScriptValue};
//!
//! let mut engine = ScriptEngine::new();
//! let twice = engine.create_function("twice", native_fn(|_ctx, args| {
//!     let n = args.first().and_then(ScriptValue::as_integer).unwrap_or(0);
//!     Ok(ScriptValue::Integer(n * 2))
//! }));
//! engine.set_global("twice", twice)?;
//! assert_eq!(engine.call_path("twice", &[21.into()])?, ScriptValue::Integer(42));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod engine;
pub mod gc;
pub mod object;
pub mod table;

pub use engine::{ScriptEngine, MAX_CALL_DEPTH};
pub use gc::GcStats;
