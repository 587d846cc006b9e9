//! GC root tracking
//!
//! Roots are starting points for GC traversal:
//! - The global and registry tables
//! - Values pinned by the host between calls

use kiln_sdk::{ObjectRef, ScriptValue};
use rustc_hash::FxHashMap;

/// Root set for garbage collection
#[derive(Debug, Default)]
pub struct RootSet {
    /// Tables that are always reachable (globals, registry)
    permanent: Vec<ObjectRef>,

    /// Host pins with nesting counts
    pinned: FxHashMap<ObjectRef, usize>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root that is never released
    pub fn add_permanent(&mut self, r: ObjectRef) {
        self.permanent.push(r);
    }

    /// Pin a value; heap values stay alive until unpinned as many times
    pub fn pin(&mut self, value: &ScriptValue) {
        if let Some(r) = value.object_ref() {
            *self.pinned.entry(r).or_insert(0) += 1;
        }
    }

    /// Release one pin on a value
    pub fn unpin(&mut self, value: &ScriptValue) {
        if let Some(r) = value.object_ref() {
            if let Some(count) = self.pinned.get_mut(&r) {
                *count -= 1;
                if *count == 0 {
                    self.pinned.remove(&r);
                }
            }
        }
    }

    /// Iterate over all roots
    pub fn iter(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.permanent
            .iter()
            .copied()
            .chain(self.pinned.keys().copied())
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.permanent.len() + self.pinned.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
