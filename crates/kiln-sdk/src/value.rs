//! ScriptValue: the dynamic value representation shared by runtime and bindings
//!
//! Scalars (nil, booleans, integers, floats, strings) are carried inline.
//! Heap objects (tables, functions, userdata) are referenced through an
//! [`ObjectRef`] that only the owning runtime can resolve.
//!
//! # Numbers
//!
//! Numbers have two subtypes, as in Lua 5.3+: `Integer(i64)` and
//! `Number(f64)`. The subtype is preserved across the document bridge, so
//! `2` and `2.0` stay distinct.

use std::fmt;
use std::sync::Arc;

// ============================================================================
// ObjectRef
// ============================================================================

/// Reference to a heap object owned by a runtime.
///
/// The generation counter lets the runtime detect references to slots that
/// have been collected and reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    /// Create a reference from a slot index and generation (runtime-internal)
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the owning heap
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this reference was created
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

// ============================================================================
// ScriptString
// ============================================================================

/// Immutable byte string, cheap to clone.
///
/// Script strings are byte strings; they are not required to be UTF-8.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptString(Arc<[u8]>);

impl ScriptString {
    /// Create a string from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Borrow as `&str` if the bytes are valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Lossy UTF-8 conversion
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the string is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ScriptString {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<String> for ScriptString {
    fn from(s: String) -> Self {
        Self(Arc::from(s.into_bytes()))
    }
}

impl From<Vec<u8>> for ScriptString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl fmt::Debug for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for ScriptString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

// ============================================================================
// ScriptValue
// ============================================================================

/// A dynamic value as seen by scripts.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ScriptValue {
    /// Absent value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer number subtype
    Integer(i64),
    /// Float number subtype
    Number(f64),
    /// Byte string
    String(ScriptString),
    /// Table (ordered mapping)
    Table(ObjectRef),
    /// Native function
    Function(ObjectRef),
    /// Native object handle
    Userdata(ObjectRef),
}

impl ScriptValue {
    /// Script-visible type name, as reported in type errors
    pub const fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Integer(_) | ScriptValue::Number(_) => "number",
            ScriptValue::String(_) => "string",
            ScriptValue::Table(_) => "table",
            ScriptValue::Function(_) => "function",
            ScriptValue::Userdata(_) => "userdata",
        }
    }

    /// Check if value is nil
    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    /// Extract boolean value
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer, accepting floats with an exact integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(i) => Some(*i),
            ScriptValue::Number(n) => float_to_integer(*n),
            _ => None,
        }
    }

    /// Extract a number of either subtype as f64
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(i) => Some(*i as f64),
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow the string payload
    pub fn as_script_str(&self) -> Option<&ScriptString> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the string payload as UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_script_str().and_then(ScriptString::as_str)
    }

    /// Heap reference, if this value lives on the runtime heap
    pub const fn object_ref(&self) -> Option<ObjectRef> {
        match self {
            ScriptValue::Table(r) | ScriptValue::Function(r) | ScriptValue::Userdata(r) => {
                Some(*r)
            }
            _ => None,
        }
    }

    /// Lua truthiness: everything except nil and false
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, ScriptValue::Nil | ScriptValue::Bool(false))
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        ScriptValue::Integer(i)
    }
}

impl From<i32> for ScriptValue {
    fn from(i: i32) -> Self {
        ScriptValue::Integer(i as i64)
    }
}

impl From<u32> for ScriptValue {
    fn from(u: u32) -> Self {
        ScriptValue::Integer(u as i64)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.into())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s.into())
    }
}

impl From<ScriptString> for ScriptValue {
    fn from(s: ScriptString) -> Self {
        ScriptValue::String(s)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ScriptValue::Nil)
    }
}

// ============================================================================
// Number helpers
// ============================================================================

/// Convert a float to an integer if it has an exact integer representation
pub fn float_to_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= -(2f64.powi(63)) && n < 2f64.powi(63) {
        Some(n as i64)
    } else {
        None
    }
}

/// Format a float the way scripts print it.
///
/// Integral floats keep a trailing `.0` so they stay distinguishable from
/// integers (`1.0` vs `1`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{:.1}", n)
    } else {
        format!("{}", n)
    }
}
