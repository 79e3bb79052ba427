//! Root enumeration for stop-the-world collections
//!
//! The collector runs on whichever thread won `begin_collection`. Every
//! other mutator is parked with its frame stack unlocked, so the collector
//! can lock and rewrite all of them.

use core_types::{JavaThreadId, JvmResult, ObjectRef};
use memory_manager::RootSet;
use parking_lot::MutexGuard;
use tracing::debug;

use crate::call_frame::FrameStack;
use crate::context::VmContext;
use crate::monitors::MonitorState;
use crate::strings::InternTable;

/// Every root of one VM while the world is stopped.
pub(crate) struct VmRoots<'a, 'g> {
    current: Option<&'a mut FrameStack>,
    others: &'a mut [MutexGuard<'g, FrameStack>],
    strings: &'a mut InternTable,
    monitors: &'a mut MonitorState,
    vm: &'a VmContext,
}

impl RootSet for VmRoots<'_, '_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        if let Some(current) = self.current.as_mut() {
            current.visit_roots(visitor);
        }
        for stack in self.others.iter_mut() {
            stack.visit_roots(visitor);
        }
        self.strings.visit_roots(visitor);
        self.monitors.visit_roots(visitor);
        self.vm.loader().visit_static_roots(visitor);
    }
}

impl VmContext {
    /// Collects the heap. The caller must hold the collection ticket.
    ///
    /// # Arguments
    ///
    /// * `current` - Frame stack of the collecting thread, already locked;
    ///   `None` when the embedder collects from outside any Java thread
    pub(crate) fn collect_stopped(&self, current: Option<&mut FrameStack>) -> JvmResult<()> {
        let current_id: Option<JavaThreadId> = current.as_ref().map(|s| s.thread_id());
        let stacks = self.thread_stacks(current_id);
        let mut others: Vec<MutexGuard<'_, FrameStack>> = stacks.iter().map(|s| s.lock()).collect();
        let mut heap = self.heap().lock();
        let mut strings = self.interned().lock();
        let mut monitors = self.monitors().lock_state();

        let before = heap.used();
        let mut roots = VmRoots {
            current,
            others: &mut others,
            strings: &mut strings,
            monitors: &mut monitors,
            vm: self,
        };
        heap.collect(&mut roots, self.loader())?;
        debug!(
            threads = stacks.len() + current_id.is_some() as usize,
            before,
            after = heap.used(),
            "heap collected"
        );
        Ok(())
    }
}
