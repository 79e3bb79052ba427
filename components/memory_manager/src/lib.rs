//! Memory Manager - Garbage-collected object heap
//!
//! This component provides:
//! - A semispace heap with bump-pointer allocation
//! - A Cheney-style copying collector driven by an explicit root set
//! - Object layout for instances, static storage and arrays
//! - Safepoint coordination for stop-the-world collection across threads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gc;
pub mod heap;
pub mod layout;
pub mod roots;
pub mod safepoint;

pub use error::{HeapError, HeapResult};
pub use heap::{GcStats, Heap, DEFAULT_SEMISPACE_SIZE, MIN_SEMISPACE_SIZE};
pub use layout::{ObjectHeader, ObjectKind, ObjectShape, HEADER_SIZE, SLOT_SIZE};
pub use roots::{LayoutOracle, NoReferences, RootSet};
pub use safepoint::{CollectionTicket, GcPhase, SafepointCoordinator};
