//! Semispace heap with bump-pointer allocation.
//!
//! This module owns all object storage. Objects are addressed by
//! [`ObjectRef`] offsets into the active ("from") semispace; the copying
//! collector in [`crate::gc`] moves live objects into the other semispace
//! and swaps the two.

use core_types::{BasicType, ClassId, ObjectRef, Value};
use tracing::debug;

use crate::error::{HeapError, HeapResult};
use crate::layout::{
    read_u32, read_u64, write_u32, write_u64, ObjectHeader, ObjectKind, ObjectShape,
    CLASS_OFFSET, ELEMENT_OFFSET, HASH_OFFSET, HEADER_SIZE, HEAP_BASE, KIND_OFFSET, LENGTH_OFFSET,
    SIZE_OFFSET, SLOT_SIZE,
};
use crate::roots::{LayoutOracle, RootSet};

/// Default size of each semispace (8MB)
pub const DEFAULT_SEMISPACE_SIZE: usize = 8 * 1024 * 1024;
/// Smallest accepted semispace size
pub const MIN_SEMISPACE_SIZE: usize = 4 * 1024;

/// Heap statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of collections performed
    pub collections: usize,
    /// Total bytes copied by all collections
    pub bytes_copied: usize,
    /// Total objects copied by all collections
    pub objects_copied: usize,
    /// Bytes that survived the most recent collection
    pub live_bytes_after_last: usize,
    /// Bytes reclaimed by the most recent collection
    pub freed_bytes_last: usize,
    /// Objects allocated since the heap was created
    pub objects_allocated: usize,
    /// Bytes allocated since the heap was created
    pub bytes_allocated: usize,
}

/// The garbage-collected object heap.
///
/// # Examples
///
/// ```
/// use core_types::{ClassId, Value};
/// use memory_manager::{Heap, ObjectShape};
///
/// let mut heap = Heap::new(64 * 1024);
/// let obj = heap
///     .try_allocate(ObjectShape::Instance { class: ClassId(3), slots: 2 })
///     .unwrap();
/// heap.write_slot(obj, 1, Value::Int(42)).unwrap();
/// assert_eq!(heap.read_slot(obj, 1, core_types::BasicType::Int).unwrap(), Value::Int(42));
/// assert_eq!(heap.class_of(obj).unwrap(), ClassId(3));
/// ```
#[derive(Debug)]
pub struct Heap {
    /// Space objects are allocated in
    pub(crate) from_space: Box<[u8]>,
    /// Space live objects are copied into during collection
    pub(crate) to_space: Box<[u8]>,
    /// Bump pointer into from_space
    pub(crate) top: usize,
    /// Size of each semispace in bytes
    pub(crate) space_size: usize,
    /// Sequence used to derive identity hashes
    hash_seed: u32,
    pub(crate) stats: GcStats,
}

impl Heap {
    /// Creates a heap with two semispaces of `space_size` bytes each.
    ///
    /// The size is clamped to at least [`MIN_SEMISPACE_SIZE`] and at most
    /// the range addressable by a 32-bit handle.
    pub fn new(space_size: usize) -> Self {
        let space_size = space_size.clamp(MIN_SEMISPACE_SIZE, u32::MAX as usize);
        Heap {
            from_space: vec![0u8; space_size].into_boxed_slice(),
            to_space: vec![0u8; space_size].into_boxed_slice(),
            top: HEAP_BASE,
            space_size,
            hash_seed: 0,
            stats: GcStats::default(),
        }
    }

    /// Size of each semispace in bytes.
    pub fn capacity(&self) -> usize {
        self.space_size - HEAP_BASE
    }

    /// Bytes currently allocated in the active semispace.
    pub fn used(&self) -> usize {
        self.top - HEAP_BASE
    }

    /// Bytes still available in the active semispace.
    pub fn free(&self) -> usize {
        self.space_size - self.top
    }

    /// Bytes occupied by objects; equal to the live bytes right after a
    /// collection.
    pub fn live_bytes(&self) -> usize {
        self.used()
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Number of collections performed.
    pub fn collection_count(&self) -> usize {
        self.stats.collections
    }

    /// Allocates without collecting.
    ///
    /// # Returns
    ///
    /// `HeapError::Exhausted` if the active semispace cannot hold the
    /// object, or `HeapError::OutOfMemory` if no collection could ever make
    /// room for it.
    pub fn try_allocate(&mut self, shape: ObjectShape) -> HeapResult<ObjectRef> {
        let size = match shape.size_bytes() {
            Some(size) if size <= self.capacity() => size,
            Some(size) => {
                return Err(HeapError::OutOfMemory {
                    requested: size,
                    capacity: self.capacity(),
                })
            }
            None => {
                return Err(HeapError::OutOfMemory {
                    requested: usize::MAX,
                    capacity: self.capacity(),
                })
            }
        };
        if self.top + size > self.space_size {
            return Err(HeapError::Exhausted {
                requested: size,
                available: self.free(),
            });
        }

        let at = self.top;
        self.top += size;
        let space = &mut self.from_space[at..at + size];
        space.fill(0);

        let (length, element) = match shape {
            ObjectShape::Instance { slots, .. } | ObjectShape::Statics { slots, .. } => (slots, 0),
            ObjectShape::Array {
                element, length, ..
            } => (length, element as u8),
        };
        self.hash_seed = self.hash_seed.wrapping_add(1);
        let hash = self.hash_seed.wrapping_mul(0x9E37_79B1) >> 1;

        write_u32(space, CLASS_OFFSET, shape.class().0);
        space[KIND_OFFSET] = shape.kind() as u8;
        space[ELEMENT_OFFSET] = element;
        write_u32(space, LENGTH_OFFSET, length);
        write_u32(space, HASH_OFFSET, hash);
        write_u32(space, SIZE_OFFSET, size as u32);

        self.stats.objects_allocated += 1;
        self.stats.bytes_allocated += size;

        ObjectRef::from_offset(at as u32).ok_or(HeapError::InvalidReference(0))
    }

    /// Allocates, running one full collection if the semispace is
    /// exhausted.
    ///
    /// This is the single-mutator entry point; multi-threaded callers
    /// coordinate a safepoint first and then call [`Heap::collect`]
    /// themselves.
    ///
    /// # Arguments
    ///
    /// * `shape` - Object to allocate
    /// * `roots` - Every live reference; rewritten if a collection runs
    /// * `layouts` - Reference maps of instance and static objects
    pub fn allocate(
        &mut self,
        shape: ObjectShape,
        roots: &mut dyn RootSet,
        layouts: &dyn LayoutOracle,
    ) -> HeapResult<ObjectRef> {
        match self.try_allocate(shape) {
            Err(HeapError::Exhausted { .. }) => {
                self.collect(roots, layouts)?;
                self.try_allocate(shape).map_err(|err| match err {
                    HeapError::Exhausted { requested, .. } => {
                        debug!(requested, "allocation failed after full collection");
                        HeapError::OutOfMemory {
                            requested,
                            capacity: self.capacity(),
                        }
                    }
                    other => other,
                })
            }
            other => other,
        }
    }

    /// Validates `obj` and returns the header offset.
    pub(crate) fn locate(&self, obj: ObjectRef) -> HeapResult<usize> {
        let at = obj.offset() as usize;
        if at < HEAP_BASE || at + HEADER_SIZE > self.top || at % 8 != 0 {
            return Err(HeapError::InvalidReference(obj.offset()));
        }
        let size = read_u32(&self.from_space, at + SIZE_OFFSET) as usize;
        if size < HEADER_SIZE || at + size > self.top {
            return Err(HeapError::InvalidReference(obj.offset()));
        }
        Ok(at)
    }

    /// Returns true if `obj` names an object in the active semispace.
    pub fn is_valid(&self, obj: ObjectRef) -> bool {
        self.locate(obj).is_ok()
    }

    /// Decodes the header of `obj`.
    pub fn header(&self, obj: ObjectRef) -> HeapResult<ObjectHeader> {
        let at = self.locate(obj)?;
        let space = &self.from_space[at..at + HEADER_SIZE];
        let kind = ObjectKind::from_tag(space[KIND_OFFSET])
            .ok_or(HeapError::InvalidReference(obj.offset()))?;
        Ok(ObjectHeader {
            class: ClassId(read_u32(space, CLASS_OFFSET)),
            kind,
            element: BasicType::from_tag(space[ELEMENT_OFFSET]),
            length: read_u32(space, LENGTH_OFFSET),
            hash: read_u32(space, HASH_OFFSET) as i32,
            size: read_u32(space, SIZE_OFFSET),
        })
    }

    /// Class of `obj` (the array class for arrays).
    pub fn class_of(&self, obj: ObjectRef) -> HeapResult<ClassId> {
        let at = self.locate(obj)?;
        Ok(ClassId(read_u32(&self.from_space, at + CLASS_OFFSET)))
    }

    /// Identity hash of `obj`; unchanged when the object moves.
    pub fn identity_hash(&self, obj: ObjectRef) -> HeapResult<i32> {
        let at = self.locate(obj)?;
        Ok(read_u32(&self.from_space, at + HASH_OFFSET) as i32)
    }

    fn slot_offset(&self, obj: ObjectRef, slot: u32) -> HeapResult<usize> {
        let header = self.header(obj)?;
        if header.kind == ObjectKind::Array {
            return Err(HeapError::WrongKind {
                offset: obj.offset(),
                expected: "an instance or static storage",
            });
        }
        if slot >= header.length {
            return Err(HeapError::IndexOutOfBounds {
                index: slot as i64,
                length: header.length,
            });
        }
        Ok(obj.offset() as usize + HEADER_SIZE + slot as usize * SLOT_SIZE)
    }

    /// Reads field slot `slot` of an instance or static storage.
    pub fn read_slot(&self, obj: ObjectRef, slot: u32, ty: BasicType) -> HeapResult<Value> {
        let at = self.slot_offset(obj, slot)?;
        Ok(Value::from_slot_bits(read_u64(&self.from_space, at), ty))
    }

    /// Writes field slot `slot` of an instance or static storage.
    pub fn write_slot(&mut self, obj: ObjectRef, slot: u32, value: Value) -> HeapResult<()> {
        let at = self.slot_offset(obj, slot)?;
        write_u64(&mut self.from_space, at, value.to_slot_bits());
        Ok(())
    }

    fn array_header(&self, obj: ObjectRef) -> HeapResult<(usize, BasicType, u32)> {
        let header = self.header(obj)?;
        match (header.kind, header.element) {
            (ObjectKind::Array, Some(element)) => {
                Ok((obj.offset() as usize + HEADER_SIZE, element, header.length))
            }
            _ => Err(HeapError::WrongKind {
                offset: obj.offset(),
                expected: "an array",
            }),
        }
    }

    /// Length of array `obj`.
    pub fn array_length(&self, obj: ObjectRef) -> HeapResult<u32> {
        Ok(self.array_header(obj)?.2)
    }

    /// Element type of array `obj`.
    pub fn array_element_type(&self, obj: ObjectRef) -> HeapResult<BasicType> {
        Ok(self.array_header(obj)?.1)
    }

    fn element_offset(&self, obj: ObjectRef, index: i32) -> HeapResult<(usize, BasicType)> {
        let (base, element, length) = self.array_header(obj)?;
        if index < 0 || index as u32 >= length {
            return Err(HeapError::IndexOutOfBounds {
                index: index as i64,
                length,
            });
        }
        Ok((base + index as usize * element.element_size(), element))
    }

    /// Loads element `index`, widening narrow types to `int`.
    pub fn array_load(&self, obj: ObjectRef, index: i32) -> HeapResult<Value> {
        let (at, element) = self.element_offset(obj, index)?;
        let s = &self.from_space;
        Ok(match element {
            BasicType::Boolean => Value::Int(s[at] as i32),
            BasicType::Byte => Value::Int(s[at] as i8 as i32),
            BasicType::Char => Value::Int(u16::from_le_bytes([s[at], s[at + 1]]) as i32),
            BasicType::Short => Value::Int(i16::from_le_bytes([s[at], s[at + 1]]) as i32),
            BasicType::Int => Value::Int(read_u32(s, at) as i32),
            BasicType::Float => Value::Float(f32::from_bits(read_u32(s, at))),
            BasicType::Long => Value::Long(read_u64(s, at) as i64),
            BasicType::Double => Value::Double(f64::from_bits(read_u64(s, at))),
            BasicType::Reference => Value::Reference(ObjectRef::from_offset(read_u32(s, at))),
        })
    }

    /// Stores element `index`, narrowing `int` values to the element type.
    pub fn array_store(&mut self, obj: ObjectRef, index: i32, value: Value) -> HeapResult<()> {
        let (at, element) = self.element_offset(obj, index)?;
        let s = &mut self.from_space;
        let bits = value.to_slot_bits();
        match element {
            BasicType::Boolean => s[at] = (bits & 1) as u8,
            BasicType::Byte => s[at] = bits as u8,
            BasicType::Char | BasicType::Short => {
                s[at..at + 2].copy_from_slice(&(bits as u16).to_le_bytes())
            }
            BasicType::Int | BasicType::Float | BasicType::Reference => {
                write_u32(s, at, bits as u32)
            }
            BasicType::Long | BasicType::Double => write_u64(s, at, bits),
        }
        Ok(())
    }

    /// Copies `length` elements between arrays of the same element type.
    ///
    /// Overlapping ranges within one array behave as if copied through a
    /// temporary buffer. Bounds are checked before anything is copied.
    pub fn array_copy(
        &mut self,
        src: ObjectRef,
        src_pos: i32,
        dst: ObjectRef,
        dst_pos: i32,
        length: i32,
    ) -> HeapResult<()> {
        let (src_base, src_ty, src_len) = self.array_header(src)?;
        let (dst_base, dst_ty, dst_len) = self.array_header(dst)?;
        if src_ty != dst_ty {
            return Err(HeapError::WrongKind {
                offset: dst.offset(),
                expected: "an array of the same element type",
            });
        }
        let in_bounds = |pos: i32, len: u32| {
            pos >= 0 && length >= 0 && (pos as i64 + length as i64) <= len as i64
        };
        if !in_bounds(src_pos, src_len) {
            return Err(HeapError::IndexOutOfBounds {
                index: src_pos as i64 + length as i64,
                length: src_len,
            });
        }
        if !in_bounds(dst_pos, dst_len) {
            return Err(HeapError::IndexOutOfBounds {
                index: dst_pos as i64 + length as i64,
                length: dst_len,
            });
        }
        let width = src_ty.element_size();
        let from = src_base + src_pos as usize * width;
        let to = dst_base + dst_pos as usize * width;
        let bytes = length as usize * width;
        self.from_space.copy_within(from..from + bytes, to);
        Ok(())
    }

    /// Reads a `char[]` as UTF-16 code units.
    pub fn read_chars(&self, obj: ObjectRef) -> HeapResult<Vec<u16>> {
        let (base, element, length) = self.array_header(obj)?;
        if element != BasicType::Char {
            return Err(HeapError::WrongKind {
                offset: obj.offset(),
                expected: "a char array",
            });
        }
        let s = &self.from_space[base..base + length as usize * 2];
        Ok(s.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    /// Fills a freshly allocated `char[]` from UTF-16 code units.
    pub fn write_chars(&mut self, obj: ObjectRef, units: &[u16]) -> HeapResult<()> {
        let (base, element, length) = self.array_header(obj)?;
        if element != BasicType::Char || units.len() > length as usize {
            return Err(HeapError::WrongKind {
                offset: obj.offset(),
                expected: "a char array large enough",
            });
        }
        for (i, unit) in units.iter().enumerate() {
            let at = base + i * 2;
            self.from_space[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
        Ok(())
    }

    /// Allocates a shallow copy of `obj` (used by `Object.clone` on arrays).
    pub fn try_clone_object(&mut self, obj: ObjectRef) -> HeapResult<ObjectRef> {
        let header = self.header(obj)?;
        let shape = match header.kind {
            ObjectKind::Instance => ObjectShape::Instance {
                class: header.class,
                slots: header.length,
            },
            ObjectKind::Statics => ObjectShape::Statics {
                class: header.class,
                slots: header.length,
            },
            ObjectKind::Array => ObjectShape::Array {
                class: header.class,
                element: header.element.ok_or(HeapError::InvalidReference(obj.offset()))?,
                length: header.length,
            },
        };
        let copy = self.try_allocate(shape)?;
        let src = obj.offset() as usize + HEADER_SIZE;
        let dst = copy.offset() as usize + HEADER_SIZE;
        let payload = header.size as usize - HEADER_SIZE;
        self.from_space.copy_within(src..src + payload, dst);
        Ok(copy)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_SEMISPACE_SIZE)
    }
}
