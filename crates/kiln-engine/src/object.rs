//! Heap object kinds

use std::any::Any;
use std::rc::Rc;

use kiln_sdk::{FinalizeFn, NativeFn, ObjectRef};

use crate::table::Table;

/// Object stored in a heap slot
pub enum HeapObject {
    /// Ordered table
    Table(Table),
    /// Native function
    Function(FunctionObject),
    /// Native object handle
    Userdata(UserdataObject),
}

impl HeapObject {
    /// Kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::Table(_) => "table",
            HeapObject::Function(_) => "function",
            HeapObject::Userdata(_) => "userdata",
        }
    }
}

/// Native function object
pub struct FunctionObject {
    /// Name used in error messages and `tostring`
    pub name: String,
    /// Implementation
    pub func: NativeFn,
}

/// Userdata object.
///
/// The payload is taken out when the finalizer runs; a userdata without
/// payload is a finalized husk awaiting reclamation.
pub struct UserdataObject {
    /// Native payload
    pub payload: Option<Rc<dyn Any>>,
    /// Metatable used for member access
    pub metatable: Option<ObjectRef>,
    /// Finalizer run once before the payload is dropped
    pub finalizer: Option<FinalizeFn>,
}
