//! Mark-sweep garbage collector
//!
//! Marking starts from the root set and follows table entries and userdata
//! metatables. Unmarked userdata are finalized before their slot is freed.
//! Finalizers and payload destructors run under `catch_unwind`. A panic is
//! logged and swallowed.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use kiln_sdk::ObjectRef;
use tracing::{debug, warn};

use super::heap::{GcBox, Heap};
use super::roots::RootSet;
use crate::object::HeapObject;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total finalizers run (including forced finalization)
    pub finalizers_run: usize,

    /// Finalizers or destructors that panicked
    pub finalizer_panics: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,

    /// Last collection duration
    pub last_pause_time: Duration,
}

/// Mark everything reachable from the roots
pub fn mark(heap: &mut Heap, roots: &RootSet) -> usize {
    let mut worklist: Vec<ObjectRef> = roots.iter().collect();
    let mut marked = 0;

    while let Some(r) = worklist.pop() {
        let Some(cell) = heap.get_mut(r) else {
            continue;
        };
        if cell.header.is_marked() {
            continue;
        }
        cell.header.mark();
        marked += 1;

        match &cell.object {
            HeapObject::Table(table) => {
                for (key, value) in table.entries() {
                    worklist.extend(key.object_ref());
                    worklist.extend(value.object_ref());
                }
            }
            HeapObject::Userdata(ud) => worklist.extend(ud.metatable),
            HeapObject::Function(_) => {}
        }
    }

    marked
}

/// Run a userdata's finalizer if it has not run yet.
///
/// Returns `true` if the finalizer ran by this call.
pub fn finalize(cell: &mut GcBox, stats: &mut GcStats) -> bool {
    let HeapObject::Userdata(ud) = &mut cell.object else {
        return false;
    };
    if !cell.header.set_finalized() {
        return false;
    }

    let payload = ud.payload.take();
    let finalizer = ud.finalizer;
    if let Some(payload) = payload {
        let outcome = catch_unwind(AssertUnwindSafe(move || {
            if let Some(finalizer) = finalizer {
                finalizer(&*payload);
            }
            drop(payload);
        }));
        if outcome.is_err() {
            stats.finalizer_panics += 1;
            warn!(
                tag = cell.header.tag().map(|t| t.as_str()).unwrap_or("<untagged>"),
                "finalizer panicked; ignoring"
            );
        }
    }
    stats.finalizers_run += 1;
    true
}

/// Free all unmarked objects and clear marks on survivors
pub fn sweep(heap: &mut Heap, stats: &mut GcStats) -> usize {
    let mut freed = 0;
    for r in heap.live_refs() {
        let Some(cell) = heap.get_mut(r) else {
            continue;
        };
        if cell.header.is_marked() {
            cell.header.unmark();
            continue;
        }
        finalize(cell, stats);
        heap.free(r);
        freed += 1;
    }
    freed
}

/// Full collection: mark, then sweep
pub fn collect(heap: &mut Heap, roots: &RootSet, stats: &mut GcStats) {
    let start = Instant::now();
    let marked = mark(heap, roots);
    let freed = sweep(heap, stats);

    stats.collections += 1;
    stats.objects_freed += freed;
    stats.last_freed_count = freed;
    stats.live_objects = heap.len();
    stats.last_pause_time = start.elapsed();

    debug!(marked, freed, live = heap.len(), "garbage collection finished");
}

/// Finalize every live userdata (runtime shutdown)
pub fn finalize_all(heap: &mut Heap, stats: &mut GcStats) {
    for r in heap.live_refs() {
        if let Some(cell) = heap.get_mut(r) {
            finalize(cell, stats);
        }
    }
}
