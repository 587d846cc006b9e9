//! Call adapter: native failures to script errors
//!
//! Every function the bindings hand to a runtime goes through [`protect`].
//! Error values are converted into `BridgeError`; panics are caught at the
//! boundary and reported as `NativeOperation` so they never unwind through
//! the runtime.

use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use kiln_sdk::{native_fn, BridgeError, NativeFn, ScriptContext, ScriptValue};
use tracing::warn;

/// Wrap a native operation for installation into a runtime
pub fn protect<F, E>(name: &str, f: F) -> NativeFn
where
    F: Fn(&mut dyn ScriptContext, &[ScriptValue]) -> Result<ScriptValue, E>
        + Send
        + Sync
        + 'static,
    E: Into<BridgeError>,
{
    let name: Arc<str> = Arc::from(name);
    native_fn(move |ctx, args| {
        match catch_unwind(AssertUnwindSafe(|| f(ctx, args))) {
            Ok(result) => result.map_err(Into::into),
            Err(panic) => {
                let message = panic_message(&*panic);
                warn!(function = %name, %message, "native function panicked");
                Err(BridgeError::NativeOperation(format!("{}: {}", name, message)))
            }
        }
    })
}

/// Map a foreign error (I/O, archive, JSON, ...) into a native failure
pub fn native_error<E: Display>(err: E) -> BridgeError {
    BridgeError::NativeOperation(err.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
