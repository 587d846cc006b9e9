//! Garbage collection: slot heap, root set and mark-sweep collector

pub mod collector;
pub mod header;
pub mod heap;
pub mod roots;

pub use collector::GcStats;
pub use header::GcHeader;
pub use heap::{GcBox, Heap};
pub use roots::RootSet;
