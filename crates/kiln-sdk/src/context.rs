//! ScriptContext trait: abstract runtime operations
//!
//! Defines the interface an embedding runtime implements. Bindings program
//! against this trait only; they never see the runtime's heap, collector or
//! call stack.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::BridgeResult;
use crate::value::ScriptValue;

/// Native function callable from scripts.
///
/// Receives the runtime and the call arguments. An `Err` is raised into the
/// script as a runtime error and unwinds the script call.
pub type NativeFn =
    Arc<dyn Fn(&mut dyn ScriptContext, &[ScriptValue]) -> BridgeResult<ScriptValue> + Send + Sync>;

/// Wrap a closure as a [`NativeFn`].
///
/// Lets closure parameter types be inferred from the bound.
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&mut dyn ScriptContext, &[ScriptValue]) -> BridgeResult<ScriptValue>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Finalizer attached to a userdata payload.
///
/// Called at most once, when the runtime collects the userdata or closes.
/// Must not panic; the runtime swallows panics raised from it.
pub type FinalizeFn = fn(&dyn Any);

// ============================================================================
// TypeTag
// ============================================================================

/// Immutable string identifying a native type on a userdata.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(Arc<str>);

impl TypeTag {
    /// Create a tag
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Tag text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Userdata
// ============================================================================

/// Everything the runtime needs to materialize a userdata slot.
pub struct UserdataInit {
    /// Type tag stored in the userdata metadata (`None` = untagged/foreign)
    pub tag: Option<TypeTag>,
    /// Native payload
    pub payload: Rc<dyn Any>,
    /// Metatable (must be a table value) used for member access
    pub metatable: Option<ScriptValue>,
    /// Finalizer run on collection
    pub finalizer: Option<FinalizeFn>,
}

impl fmt::Debug for UserdataInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserdataInit")
            .field("tag", &self.tag)
            .field("metatable", &self.metatable)
            .field("has_finalizer", &self.finalizer.is_some())
            .finish()
    }
}

// ============================================================================
// ScriptContext
// ============================================================================

/// Abstract runtime context for native bindings.
///
/// The runtime is single-threaded: one script call completes before the
/// next begins, and collection never runs inside a call.
pub trait ScriptContext {
    // ========================================================================
    // Tables
    // ========================================================================

    /// Allocate an empty table
    fn create_table(&mut self) -> ScriptValue;

    /// Read a table entry without metamethods (`nil` when absent)
    fn raw_get(&self, table: &ScriptValue, key: &ScriptValue) -> BridgeResult<ScriptValue>;

    /// Write a table entry without metamethods.
    ///
    /// Writing `nil` keeps the entry (with a nil value) so sequences with
    /// holes keep their shape.
    fn raw_set(&mut self, table: &ScriptValue, key: ScriptValue, value: ScriptValue)
        -> BridgeResult<()>;

    /// All entries of a table in insertion order
    fn table_pairs(&self, table: &ScriptValue) -> BridgeResult<Vec<(ScriptValue, ScriptValue)>>;

    // ========================================================================
    // Functions
    // ========================================================================

    /// Wrap a native function as a script function value
    fn create_function(&mut self, name: &str, func: NativeFn) -> ScriptValue;

    /// Call a function value
    fn call(&mut self, func: &ScriptValue, args: &[ScriptValue]) -> BridgeResult<ScriptValue>;

    // ========================================================================
    // Userdata
    // ========================================================================

    /// Allocate a userdata slot owned by the runtime's collector
    fn create_userdata(&mut self, init: UserdataInit) -> BridgeResult<ScriptValue>;

    /// Type tag of a userdata (`None` for untagged userdata and non-userdata)
    fn userdata_tag(&self, value: &ScriptValue) -> Option<TypeTag>;

    /// Payload of a live, unfinalized userdata
    fn userdata_payload(&self, value: &ScriptValue) -> Option<Rc<dyn Any>>;

    // ========================================================================
    // Environment
    // ========================================================================

    /// Global table visible to scripts
    fn globals(&self) -> ScriptValue;

    /// Host-private table, always reachable by the collector
    fn registry(&self) -> ScriptValue;
}
