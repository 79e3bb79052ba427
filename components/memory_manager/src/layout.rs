//! Object layout inside a semispace.
//!
//! Every object starts with a 24-byte header:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | class id                                |
//! | 4      | 1    | object kind                             |
//! | 5      | 1    | element type tag (arrays)               |
//! | 6      | 2    | reserved                                |
//! | 8      | 4    | slot count or array length              |
//! | 12     | 4    | forwarding offset (0 = not forwarded)   |
//! | 16     | 4    | identity hash                           |
//! | 20     | 4    | total object size in bytes              |
//!
//! Instance and static-storage payloads are 8-byte slots. Array payloads
//! are packed by element size. Objects are 8-byte aligned.

use core_types::{BasicType, ClassId};

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 24;
/// Size of an instance or static field slot.
pub const SLOT_SIZE: usize = 8;
/// Alignment of every object.
pub const ALIGNMENT: usize = 8;
/// Offset of the first object; offset 0 is reserved for `null`.
pub const HEAP_BASE: usize = 8;

pub(crate) const CLASS_OFFSET: usize = 0;
pub(crate) const KIND_OFFSET: usize = 4;
pub(crate) const ELEMENT_OFFSET: usize = 5;
pub(crate) const LENGTH_OFFSET: usize = 8;
pub(crate) const FORWARD_OFFSET: usize = 12;
pub(crate) const HASH_OFFSET: usize = 16;
pub(crate) const SIZE_OFFSET: usize = 20;

/// Kind of heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    /// Instance of a class
    Instance = 1,
    /// Static field storage of a class
    Statics = 2,
    /// Array
    Array = 3,
}

impl ObjectKind {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ObjectKind::Instance),
            2 => Some(ObjectKind::Statics),
            3 => Some(ObjectKind::Array),
            _ => None,
        }
    }
}

/// What to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectShape {
    /// Instance with `slots` field slots
    Instance {
        /// Class of the instance
        class: ClassId,
        /// Number of 8-byte field slots
        slots: u32,
    },
    /// Static storage with `slots` field slots
    Statics {
        /// Owning class
        class: ClassId,
        /// Number of 8-byte static slots
        slots: u32,
    },
    /// Array of `length` elements
    Array {
        /// Array class (`[I`, `[Ljava/lang/String;`, ...)
        class: ClassId,
        /// Element storage kind
        element: BasicType,
        /// Element count
        length: u32,
    },
}

impl ObjectShape {
    /// Total aligned size in bytes, or `None` if it overflows `u32`.
    pub fn size_bytes(&self) -> Option<usize> {
        let payload = match *self {
            ObjectShape::Instance { slots, .. } | ObjectShape::Statics { slots, .. } => {
                (slots as usize).checked_mul(SLOT_SIZE)?
            }
            ObjectShape::Array {
                element, length, ..
            } => (length as usize).checked_mul(element.element_size())?,
        };
        let size = align_up(HEADER_SIZE.checked_add(payload)?)?;
        if size > u32::MAX as usize {
            None
        } else {
            Some(size)
        }
    }

    /// Class recorded in the header.
    pub fn class(&self) -> ClassId {
        match *self {
            ObjectShape::Instance { class, .. }
            | ObjectShape::Statics { class, .. }
            | ObjectShape::Array { class, .. } => class,
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            ObjectShape::Instance { .. } => ObjectKind::Instance,
            ObjectShape::Statics { .. } => ObjectKind::Statics,
            ObjectShape::Array { .. } => ObjectKind::Array,
        }
    }
}

/// Decoded object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Class id
    pub class: ClassId,
    /// Object kind
    pub kind: ObjectKind,
    /// Element type for arrays
    pub element: Option<BasicType>,
    /// Slot count or array length
    pub length: u32,
    /// Identity hash, stable across collections
    pub hash: i32,
    /// Total size in bytes
    pub size: u32,
}

pub(crate) fn align_up(size: usize) -> Option<usize> {
    Some(size.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1))
}

pub(crate) fn read_u32(space: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&space[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn write_u32(space: &mut [u8], at: usize, value: u32) {
    space[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u64(space: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&space[at..at + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn write_u64(space: &mut [u8], at: usize, value: u64) {
    space[at..at + 8].copy_from_slice(&value.to_le_bytes());
}
