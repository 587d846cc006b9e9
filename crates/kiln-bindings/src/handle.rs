//! Handles: native values living inside runtime userdata
//!
//! A handle is a userdata whose payload is an `Rc<HandleCell<T>>`. The cell
//! holds a [`Slot`] fixed at construction:
//!
//! | mode     | slot                 | on finalization             |
//! |----------|----------------------|-----------------------------|
//! | Embedded | `Embedded(T)`        | `T` is dropped              |
//! | Owned    | `Owned(Box<T>)`      | `T` is dropped              |
//! | Borrowed | `Borrowed(Weak<T>)`  | only the weak ref is dropped|
//! | Shared   | `Shared(Arc<T>)`     | one strong count is dropped |
//!
//! A dangling `Weak` is the null reference. After finalization the slot is
//! `Released` and every access fails with `InvalidReference`.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Weak};

use kiln_sdk::{BridgeError, BridgeResult, ScriptContext, ScriptValue, UserdataInit};
use tracing::trace;

use crate::dispatch::{self, DispatchTable};

// ============================================================================
// Slot
// ============================================================================

/// How a handle relates to the native value it represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    /// Value stored inline in the handle
    Embedded,
    /// Value heap-allocated and owned by the handle
    Owned,
    /// Reference to a value owned elsewhere; may be null
    Borrowed,
    /// Reference-counted value co-owned with native code and other handles
    Shared,
}

/// Payload of a handle
pub enum Slot<T> {
    /// Value stored inline
    Embedded(T),
    /// Value owned through a box
    Owned(Box<T>),
    /// Non-owning reference (dangling = null)
    Borrowed(Weak<T>),
    /// Co-owned reference
    Shared(Arc<T>),
    /// Finalized; no value
    Released,
}

impl<T> Slot<T> {
    /// Store the value inline
    pub fn embedded(value: T) -> Self {
        Slot::Embedded(value)
    }

    /// Box the value and own it
    pub fn owned(value: T) -> Self {
        Slot::Owned(Box::new(value))
    }

    /// Reference a value owned elsewhere
    pub fn borrowed(value: &Arc<T>) -> Self {
        Slot::Borrowed(Arc::downgrade(value))
    }

    /// Null reference
    pub fn null() -> Self {
        Slot::Borrowed(Weak::new())
    }

    /// Co-own a value
    pub fn shared(value: Arc<T>) -> Self {
        Slot::Shared(value)
    }

    /// Ownership mode, `None` once released
    pub fn mode(&self) -> Option<OwnershipMode> {
        match self {
            Slot::Embedded(_) => Some(OwnershipMode::Embedded),
            Slot::Owned(_) => Some(OwnershipMode::Owned),
            Slot::Borrowed(_) => Some(OwnershipMode::Borrowed),
            Slot::Shared(_) => Some(OwnershipMode::Shared),
            Slot::Released => None,
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Borrowed(weak) if weak.strong_count() == 0 => f.write_str("Borrowed(null)"),
            Slot::Released => f.write_str("Released"),
            other => match other.mode() {
                Some(mode) => write!(f, "{:?}", mode),
                None => f.write_str("Released"),
            },
        }
    }
}

// ============================================================================
// HandleCell / Handle
// ============================================================================

/// Userdata payload wrapping a slot
pub struct HandleCell<T> {
    slot: RefCell<Slot<T>>,
}

impl<T> HandleCell<T> {
    /// Wrap a slot
    pub fn new(slot: Slot<T>) -> Self {
        Self {
            slot: RefCell::new(slot),
        }
    }

    /// Release the payload according to its ownership mode.
    ///
    /// Returns `true` if this call released it. The old slot is dropped after
    /// the borrow ends, so a destructor that touches the handle sees it
    /// released rather than panicking.
    pub fn release(&self) -> bool {
        let old = match self.slot.try_borrow_mut() {
            Ok(mut slot) => std::mem::replace(&mut *slot, Slot::Released),
            Err(_) => return false,
        };
        let released = !matches!(old, Slot::Released);
        drop(old);
        released
    }
}

/// Typed view of a handle's payload
pub struct Handle<T>(Rc<HandleCell<T>>);

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Handle(Rc::clone(&self.0))
    }
}

impl<T> Handle<T> {
    pub(crate) fn from_cell(cell: Rc<HandleCell<T>>) -> Self {
        Handle(cell)
    }

    fn busy() -> BridgeError {
        BridgeError::Argument("handle is already in use".to_string())
    }

    /// Run `f` on the referenced value
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> BridgeResult<R> {
        let slot = self.0.slot.try_borrow().map_err(|_| Self::busy())?;
        match &*slot {
            Slot::Embedded(value) => Ok(f(value)),
            Slot::Owned(value) => Ok(f(value.as_ref())),
            Slot::Shared(value) => Ok(f(value.as_ref())),
            Slot::Borrowed(weak) => match weak.upgrade() {
                Some(value) => Ok(f(value.as_ref())),
                None => Err(BridgeError::InvalidReference),
            },
            Slot::Released => Err(BridgeError::InvalidReference),
        }
    }

    /// Run `f` on the value mutably. Only handles that own their value
    /// (Embedded, Owned) are writable.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> BridgeResult<R> {
        let mut slot = self.0.slot.try_borrow_mut().map_err(|_| Self::busy())?;
        match &mut *slot {
            Slot::Embedded(value) => Ok(f(value)),
            Slot::Owned(value) => Ok(f(value.as_mut())),
            Slot::Borrowed(weak) if weak.strong_count() == 0 => Err(BridgeError::InvalidReference),
            Slot::Borrowed(_) | Slot::Shared(_) => {
                Err(BridgeError::Argument("handle is read-only".to_string()))
            }
            Slot::Released => Err(BridgeError::InvalidReference),
        }
    }

    /// Clone out the co-owned value of a Shared handle
    pub fn shared(&self) -> BridgeResult<Arc<T>> {
        let slot = self.0.slot.try_borrow().map_err(|_| Self::busy())?;
        match &*slot {
            Slot::Shared(value) => Ok(Arc::clone(value)),
            Slot::Released => Err(BridgeError::InvalidReference),
            _ => Err(BridgeError::Argument("handle is not shared".to_string())),
        }
    }

    /// Check whether the handle still references a value.
    ///
    /// A slot that cannot be borrowed is inside [`Handle::with_mut`], which
    /// only holds the borrow while running on an Embedded or Owned value, so
    /// it is reported live. [`HandleCell::release`] never holds the borrow
    /// across a call.
    pub fn is_valid(&self) -> bool {
        match self.0.slot.try_borrow() {
            Ok(slot) => match &*slot {
                Slot::Borrowed(weak) => weak.strong_count() > 0,
                Slot::Released => false,
                Slot::Embedded(_) | Slot::Owned(_) | Slot::Shared(_) => true,
            },
            Err(_) => true,
        }
    }

    /// Ownership mode, `None` once released
    pub fn mode(&self) -> Option<OwnershipMode> {
        self.0.slot.try_borrow().ok().and_then(|slot| slot.mode())
    }

    /// Release the payload now; see [`HandleCell::release`]
    pub fn release(&self) -> bool {
        self.0.release()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.slot.try_borrow() {
            Ok(slot) => write!(f, "Handle({:?})", &*slot),
            Err(_) => f.write_str("Handle(<busy>)"),
        }
    }
}

// ============================================================================
// Allocation and finalization
// ============================================================================

/// Finalizer attached to every handle of type `T`
pub fn finalize_shim<T: 'static>(payload: &dyn Any) {
    if let Some(cell) = payload.downcast_ref::<HandleCell<T>>() {
        cell.release();
    }
}

/// Materialize a handle as a runtime userdata tagged and dispatched by
/// `table`
pub fn allocate<T: 'static>(
    ctx: &mut dyn ScriptContext,
    table: &Arc<DispatchTable<T>>,
    slot: Slot<T>,
) -> BridgeResult<ScriptValue> {
    let metatable = dispatch::metatable(ctx, table)?;
    let mode = slot.mode();
    let value = ctx.create_userdata(UserdataInit {
        tag: Some(table.tag().clone()),
        payload: Rc::new(HandleCell::new(slot)),
        metatable: Some(metatable),
        finalizer: Some(finalize_shim::<T>),
    })?;
    trace!(tag = %table.tag(), mode = ?mode, "allocated handle");
    Ok(value)
}

/// Allocate a handle, or return `nil` when `slot` is `None`
pub fn allocate_optional<T: 'static>(
    ctx: &mut dyn ScriptContext,
    table: &Arc<DispatchTable<T>>,
    slot: Option<Slot<T>>,
) -> BridgeResult<ScriptValue> {
    match slot {
        Some(slot) => allocate(ctx, table, slot),
        None => Ok(ScriptValue::Nil),
    }
}
