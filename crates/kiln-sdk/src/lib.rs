//! Kiln SDK - runtime-neutral types for native bindings
//!
//! This crate provides the minimal types and traits needed to expose native
//! objects to a Kiln script runtime without depending on a concrete runtime.
//!
//! # Example
//!
//! ```ignore
//! use kiln_sdk::{native_fn, BridgeResult, ScriptContext, ScriptValue};
//!
//! fn install_add(ctx: &mut dyn ScriptContext) -> BridgeResult<()> {
//!     let add = ctx.create_function("add", native_fn(|_ctx, args| {
//!         let a = args.first().and_then(ScriptValue::as_integer).unwrap_or(0);
//!         let b = args.get(1).and_then(ScriptValue::as_integer).unwrap_or(0);
//!         Ok(ScriptValue::Integer(a + b))
//!     }));
//!     let globals = ctx.globals();
//!     ctx.raw_set(&globals, "add".into(), add)
//! }
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod value;

pub use context::{native_fn, FinalizeFn, NativeFn, ScriptContext, TypeTag, UserdataInit};
pub use error::{BridgeError, BridgeResult};
pub use value::{float_to_integer, format_number, ObjectRef, ScriptString, ScriptValue};
