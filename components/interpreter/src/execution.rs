//! Execution state of one attached Java thread
//!
//! An [`ExecutionContext`] holds the lock on its thread's frame stack and,
//! in non-`threaded` builds, the global interpreter lock. Both are released
//! whenever the thread parks at a safepoint or blocks, so a collector on
//! another thread can scan and rewrite the frames.

use core_types::{JavaThreadId, ObjectRef, Value};
use memory_manager::{CollectionTicket, Heap, HeapError, HeapResult, ObjectShape};
use parking_lot::{Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::call_frame::FrameStack;
use crate::context::VmContext;
use crate::exceptions::Unwind;
use crate::monitors::Acquire;

/// Collections an allocation may wait on before giving up.
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Per-thread interpreter state.
pub struct ExecutionContext<'t> {
    vm: &'t VmContext,
    stack: MutexGuard<'t, FrameStack>,
    gil: Option<MutexGuard<'t, ()>>,
    thread: JavaThreadId,
    slice: u32,
}

impl<'t> ExecutionContext<'t> {
    /// Takes the interpreter lock and the frame stack of a registered
    /// thread.
    pub(crate) fn attach(vm: &'t VmContext, stack: &'t Mutex<FrameStack>) -> Self {
        let gil = vm.safepoint().in_safe_region(|| vm.lock_gil());
        let stack = stack.lock();
        let thread = stack.thread_id();
        ExecutionContext {
            vm,
            stack,
            gil,
            thread,
            slice: vm.config().time_slice,
        }
    }

    /// The shared VM state.
    pub fn vm(&self) -> &'t VmContext {
        self.vm
    }

    /// Identity of this thread.
    pub fn thread_id(&self) -> JavaThreadId {
        self.thread
    }

    /// The frame stack.
    pub fn stack(&self) -> &FrameStack {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut FrameStack {
        &mut self.stack
    }

    pub(crate) fn push_handle(&mut self, value: Value) -> usize {
        self.stack.push_handle(value)
    }

    pub(crate) fn handle(&self, index: usize) -> Value {
        self.stack.handle(index)
    }

    pub(crate) fn truncate_handles(&mut self, mark: usize) {
        self.stack.truncate_handles(mark);
    }

    /// Runs `f` with the frame stack and interpreter lock released, inside a
    /// safe region. `f` must not touch the heap.
    pub(crate) fn blocking<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let vm = self.vm;
        if let Some(gil) = self.gil.take() {
            MutexGuard::unlock_fair(gil);
        }
        let (result, gil) = MutexGuard::unlocked(&mut self.stack, || {
            vm.safepoint().in_safe_region(|| {
                let result = f();
                (result, vm.lock_gil())
            })
        });
        self.gil = gil;
        result
    }

    /// Safepoint poll at method entry and backward branches. Also hands the
    /// interpreter lock to other threads once per time slice.
    pub(crate) fn safepoint_poll(&mut self) {
        let vm = self.vm;
        if vm.safepoint().is_requested() {
            MutexGuard::unlocked(&mut self.stack, || vm.safepoint().poll());
        }
        if self.gil.is_some() {
            self.slice -= 1;
            if self.slice == 0 {
                self.slice = vm.config().time_slice;
                self.blocking(std::thread::yield_now);
            }
        }
    }

    /// Allocates an object, collecting once if the heap is exhausted.
    ///
    /// # Returns
    ///
    /// `Unwind::Fatal` with an out-of-memory error if the object does not
    /// fit after a collection.
    pub fn allocate(&mut self, shape: ObjectShape) -> Result<ObjectRef, Unwind> {
        self.allocate_with(|heap, _| heap.try_allocate(shape))
    }

    /// Allocation loop shared by plain allocation and cloning. `attempt`
    /// must re-read any object it copies from the frame stack, since a
    /// collection may have moved it.
    pub(crate) fn allocate_with(
        &mut self,
        mut attempt: impl FnMut(&mut Heap, &FrameStack) -> HeapResult<ObjectRef>,
    ) -> Result<ObjectRef, Unwind> {
        let vm = self.vm;
        let mut collected = false;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let result = {
                let mut heap = vm.heap().lock();
                attempt(&mut heap, &self.stack)
            };
            match result {
                Ok(obj) => return Ok(obj),
                Err(HeapError::Exhausted { .. }) if !collected => {
                    collected = self.collect_garbage()?;
                }
                Err(err) => {
                    if err.is_exhaustion() {
                        warn!(thread = self.thread.0, error = %err, "heap exhausted");
                    }
                    return Err(Unwind::Fatal(err.into()));
                }
            }
        }
        Err(Unwind::Fatal(core_types::JvmError::out_of_memory(
            "allocation kept losing the race with other collections",
        )))
    }

    /// Runs a stop-the-world collection on behalf of this thread.
    ///
    /// # Returns
    ///
    /// `false` if another thread collected while this one waited; the
    /// caller should simply retry.
    pub fn collect_garbage(&mut self) -> Result<bool, Unwind> {
        let vm = self.vm;
        let ticket = MutexGuard::unlocked(&mut self.stack, || vm.safepoint().begin_collection(true));
        if ticket == CollectionTicket::Busy {
            trace!(thread = self.thread.0, "collection finished by another thread");
            return Ok(false);
        }
        let result = vm.collect_stopped(Some(&mut *self.stack));
        vm.safepoint().end_collection();
        result.map(|()| true).map_err(Unwind::Fatal)
    }

    /// Acquires the monitor of `object`, waiting if another thread owns it.
    pub(crate) fn monitor_enter(&mut self, object: ObjectRef) {
        let vm = self.vm;
        let thread = self.thread;
        if let Acquire::Contended(entry) = vm.monitors().try_enter(object, thread) {
            trace!(thread = thread.0, "waiting for monitor");
            self.blocking(|| vm.monitors().wait_for(entry, thread));
        }
    }

    /// Releases one hold of the monitor of `object`.
    pub(crate) fn monitor_exit(&mut self, object: ObjectRef) -> Result<(), Unwind> {
        if self.vm.monitors().exit(object, self.thread) {
            Ok(())
        } else {
            Err(self.throw_new(class_loader::names::ILLEGAL_MONITOR_STATE_EXCEPTION, None))
        }
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("thread", &self.thread)
            .field("depth", &self.stack.depth())
            .finish()
    }
}
