//! GC object header
//!
//! Every heap slot carries a header with collector state and the userdata
//! metadata (type tag and finalized flag).

use kiln_sdk::TypeTag;

/// GC header stored alongside each heap object
#[derive(Debug, Clone, Default)]
pub struct GcHeader {
    /// Mark bit for GC (true = reachable)
    marked: bool,

    /// Set once the finalizer has run; guards against double finalization
    finalized: bool,

    /// Native type tag (userdata only)
    tag: Option<TypeTag>,
}

impl GcHeader {
    /// Create a header for an untagged object
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a header carrying a type tag
    pub fn tagged(tag: Option<TypeTag>) -> Self {
        Self {
            tag,
            ..Self::default()
        }
    }

    /// Check if this object is marked
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Mark this object as reachable
    #[inline]
    pub fn mark(&mut self) {
        self.marked = true;
    }

    /// Unmark this object (for next GC cycle)
    #[inline]
    pub fn unmark(&mut self) {
        self.marked = false;
    }

    /// Check if the finalizer already ran
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Record that the finalizer ran.
    ///
    /// Returns `false` if it had already been recorded.
    #[inline]
    pub fn set_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }

    /// Type tag
    #[inline]
    pub fn tag(&self) -> Option<&TypeTag> {
        self.tag.as_ref()
    }
}
