//! Heap error types.

use core_types::{ErrorKind, JvmError};
use thiserror::Error;

/// Failures reported by the heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The active semispace cannot satisfy the request without a collection
    #[error("semispace exhausted: {requested} bytes requested, {available} available")]
    Exhausted {
        /// Bytes requested including the header
        requested: usize,
        /// Bytes left in the active semispace
        available: usize,
    },
    /// The request does not fit even after a full collection
    #[error("out of memory: {requested} bytes requested, semispace holds {capacity}")]
    OutOfMemory {
        /// Bytes requested including the header
        requested: usize,
        /// Usable bytes per semispace
        capacity: usize,
    },
    /// A handle does not name an object in the active semispace
    #[error("invalid object reference {0:#x}")]
    InvalidReference(u32),
    /// Slot or element index outside the object
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Object length
        length: u32,
    },
    /// Operation applied to the wrong kind of object
    #[error("object at {offset:#x} is not {expected}")]
    WrongKind {
        /// Object offset
        offset: u32,
        /// Kind required by the operation
        expected: &'static str,
    },
}

impl HeapError {
    /// Returns true for the two out-of-space conditions.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            HeapError::Exhausted { .. } | HeapError::OutOfMemory { .. }
        )
    }
}

impl From<HeapError> for JvmError {
    fn from(err: HeapError) -> Self {
        let kind = if err.is_exhaustion() {
            ErrorKind::OutOfMemory
        } else {
            ErrorKind::Internal
        };
        JvmError::new(kind, err.to_string())
    }
}

/// Result alias for heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
