//! Semi-space copying garbage collector.
//!
//! This module implements Cheney's algorithm over the two semispaces of a
//! [`Heap`]:
//! - Every root is evacuated into to_space and rewritten in place
//! - to_space is scanned breadth-first, evacuating what each object refers to
//! - A forwarding offset in the from_space header keeps shared objects unique
//! - The spaces are swapped once the scan pointer meets the allocation pointer
//!
//! The collector is stop-the-world: callers make sure no mutator touches the
//! heap while [`Heap::collect`] runs.

use std::collections::HashMap;
use std::sync::Arc;

use core_types::{BasicType, ClassId, ObjectRef};
use tracing::{debug, trace};

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::layout::{
    read_u32, read_u64, write_u32, write_u64, ObjectKind, CLASS_OFFSET, ELEMENT_OFFSET,
    FORWARD_OFFSET, HEADER_SIZE, HEAP_BASE, KIND_OFFSET, LENGTH_OFFSET, SIZE_OFFSET, SLOT_SIZE,
};
use crate::roots::{LayoutOracle, RootSet};

/// State of one collection.
struct Evacuation<'a> {
    from_space: &'a mut [u8],
    to_space: &'a mut [u8],
    from_top: usize,
    to_top: usize,
    objects: usize,
}

impl Evacuation<'_> {
    /// Moves the object named by `r` into to_space (once) and rewrites `r`.
    fn forward(&mut self, r: &mut ObjectRef) -> HeapResult<()> {
        let at = r.offset() as usize;
        if at < HEAP_BASE || at + HEADER_SIZE > self.from_top || at % 8 != 0 {
            return Err(HeapError::InvalidReference(r.offset()));
        }

        let forwarded = read_u32(self.from_space, at + FORWARD_OFFSET);
        if forwarded != 0 {
            *r = ObjectRef::from_offset(forwarded).ok_or(HeapError::InvalidReference(0))?;
            return Ok(());
        }

        let size = read_u32(self.from_space, at + SIZE_OFFSET) as usize;
        if size < HEADER_SIZE || at + size > self.from_top {
            return Err(HeapError::InvalidReference(r.offset()));
        }

        let new = self.to_top;
        self.to_space[new..new + size].copy_from_slice(&self.from_space[at..at + size]);
        write_u32(self.to_space, new + FORWARD_OFFSET, 0);
        write_u32(self.from_space, at + FORWARD_OFFSET, new as u32);
        self.to_top += size;
        self.objects += 1;

        *r = ObjectRef::from_offset(new as u32).ok_or(HeapError::InvalidReference(0))?;
        Ok(())
    }

    /// Forwards the reference stored in a 4-byte field at `at` in to_space.
    fn forward_field32(&mut self, at: usize) -> HeapResult<()> {
        if let Some(mut r) = ObjectRef::from_offset(read_u32(self.to_space, at)) {
            self.forward(&mut r)?;
            write_u32(self.to_space, at, r.offset());
        }
        Ok(())
    }

    /// Forwards the reference stored in an 8-byte slot at `at` in to_space.
    fn forward_slot(&mut self, at: usize) -> HeapResult<()> {
        if let Some(mut r) = ObjectRef::from_offset(read_u64(self.to_space, at) as u32) {
            self.forward(&mut r)?;
            write_u64(self.to_space, at, r.offset() as u64);
        }
        Ok(())
    }
}

/// Per-collection cache of reference maps.
struct RefMaps<'a> {
    layouts: &'a dyn LayoutOracle,
    instances: HashMap<ClassId, Arc<[u32]>>,
    statics: HashMap<ClassId, Arc<[u32]>>,
}

impl<'a> RefMaps<'a> {
    fn new(layouts: &'a dyn LayoutOracle) -> Self {
        RefMaps {
            layouts,
            instances: HashMap::new(),
            statics: HashMap::new(),
        }
    }

    fn slots(&mut self, kind: ObjectKind, class: ClassId) -> Arc<[u32]> {
        let layouts = self.layouts;
        match kind {
            ObjectKind::Statics => self
                .statics
                .entry(class)
                .or_insert_with(|| layouts.static_reference_slots(class))
                .clone(),
            _ => self
                .instances
                .entry(class)
                .or_insert_with(|| layouts.instance_reference_slots(class))
                .clone(),
        }
    }
}

impl Heap {
    /// Performs a full collection.
    ///
    /// Every object reachable from `roots` survives and keeps its class,
    /// contents and identity hash; every root is rewritten to the new
    /// location. Unreachable objects are reclaimed.
    ///
    /// # Arguments
    ///
    /// * `roots` - Complete root set (frames, statics, handle areas)
    /// * `layouts` - Reference maps for instance and static objects
    ///
    /// # Returns
    ///
    /// `HeapError::InvalidReference` if a root or field held a handle that
    /// does not name an object. The collection still completes for every
    /// valid reference.
    pub fn collect(
        &mut self,
        roots: &mut dyn RootSet,
        layouts: &dyn LayoutOracle,
    ) -> HeapResult<()> {
        let used_before = self.used();
        let mut evac = Evacuation {
            from_space: &mut self.from_space,
            to_space: &mut self.to_space,
            from_top: self.top,
            to_top: HEAP_BASE,
            objects: 0,
        };
        let mut first_error: Option<HeapError> = None;

        roots.visit_roots(&mut |r| {
            if let Err(err) = evac.forward(r) {
                first_error.get_or_insert(err);
            }
        });

        let mut maps = RefMaps::new(layouts);
        let mut scan = HEAP_BASE;
        while scan < evac.to_top {
            let header = &evac.to_space[scan..scan + HEADER_SIZE];
            let class = ClassId(read_u32(header, CLASS_OFFSET));
            let kind = ObjectKind::from_tag(header[KIND_OFFSET]);
            let element = BasicType::from_tag(header[ELEMENT_OFFSET]);
            let length = read_u32(header, LENGTH_OFFSET) as usize;
            let size = read_u32(header, SIZE_OFFSET) as usize;
            let payload = scan + HEADER_SIZE;

            let result = match kind {
                Some(ObjectKind::Array) if element == Some(BasicType::Reference) => (0..length)
                    .try_for_each(|i| evac.forward_field32(payload + i * 4)),
                Some(ObjectKind::Array) => Ok(()),
                Some(kind) => {
                    let slots = maps.slots(kind, class);
                    slots
                        .iter()
                        .filter(|&&slot| (slot as usize) < length)
                        .try_for_each(|&slot| {
                            evac.forward_slot(payload + slot as usize * SLOT_SIZE)
                        })
                }
                None => Err(HeapError::InvalidReference(scan as u32)),
            };
            if let Err(err) = result {
                trace!(offset = scan, error = %err, "skipping bad reference during scan");
                first_error.get_or_insert(err);
            }
            scan += size.max(HEADER_SIZE);
        }

        let live = evac.to_top;
        let objects = evac.objects;
        std::mem::swap(&mut self.from_space, &mut self.to_space);
        self.top = live;

        let live_bytes = live - HEAP_BASE;
        self.stats.collections += 1;
        self.stats.objects_copied += objects;
        self.stats.bytes_copied += live_bytes;
        self.stats.live_bytes_after_last = live_bytes;
        self.stats.freed_bytes_last = used_before.saturating_sub(live_bytes);

        debug!(
            collection = self.stats.collections,
            live_bytes,
            freed_bytes = self.stats.freed_bytes_last,
            objects,
            "garbage collection finished"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
