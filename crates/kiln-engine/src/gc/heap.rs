//! Slot heap for GC-managed objects
//!
//! Objects live in a vector of slots. Freed slots go on a free list and are
//! reused with a bumped generation, so stale `ObjectRef`s never resolve to
//! the new occupant.

use kiln_sdk::ObjectRef;

use super::header::GcHeader;
use crate::object::HeapObject;

/// Header plus object
pub struct GcBox {
    /// Collector state and metadata
    pub header: GcHeader,
    /// The object itself
    pub object: HeapObject,
}

struct Slot {
    generation: u32,
    cell: Option<GcBox>,
}

/// Heap allocator for GC-managed objects
#[derive(Default)]
pub struct Heap {
    /// All slots (occupied or free)
    slots: Vec<Slot>,

    /// Indices of free slots
    free: Vec<u32>,

    /// Number of occupied slots
    live: usize,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object and return a reference to it
    pub fn allocate(&mut self, header: GcHeader, object: HeapObject) -> ObjectRef {
        let cell = GcBox { header, object };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.cell = Some(cell);
                ObjectRef::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    cell: Some(cell),
                });
                ObjectRef::new(index, 0)
            }
        }
    }

    /// Resolve a reference
    pub fn get(&self, r: ObjectRef) -> Option<&GcBox> {
        self.slots
            .get(r.index() as usize)
            .filter(|slot| slot.generation == r.generation())
            .and_then(|slot| slot.cell.as_ref())
    }

    /// Resolve a reference mutably
    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut GcBox> {
        self.slots
            .get_mut(r.index() as usize)
            .filter(|slot| slot.generation == r.generation())
            .and_then(|slot| slot.cell.as_mut())
    }

    /// Free the slot a reference points to, returning its contents
    pub fn free(&mut self, r: ObjectRef) -> Option<GcBox> {
        let slot = self.slots.get_mut(r.index() as usize)?;
        if slot.generation != r.generation() {
            return None;
        }
        let cell = slot.cell.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.index());
        self.live -= 1;
        Some(cell)
    }

    /// References to all live objects
    pub fn live_refs(&self) -> Vec<ObjectRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.cell.is_some())
            .map(|(index, slot)| ObjectRef::new(index as u32, slot.generation))
            .collect()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if the heap holds no objects
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
