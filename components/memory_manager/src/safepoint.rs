//! Stop-the-world coordination between mutator threads and the collector.
//!
//! Mutator threads register with the coordinator and poll it at safepoints
//! (backward branches, calls, allocation). A thread that needs a collection
//! calls [`SafepointCoordinator::begin_collection`], which raises the
//! request and waits until every other registered mutator is parked, either
//! inside [`SafepointCoordinator::poll`] or in a safe region (blocked on a
//! lock, a condition variable or I/O while holding no heap references
//! outside its published roots).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Collector phase as seen by mutators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    /// No collection pending
    Idle,
    /// A collection was requested; mutators are being stopped
    Requested,
    /// All mutators are stopped and the heap is being collected
    Collecting,
}

/// Result of [`SafepointCoordinator::begin_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionTicket {
    /// The caller owns the collection and must call `end_collection`
    Acquired,
    /// Another thread collected while the caller waited; retry the allocation
    Busy,
}

#[derive(Debug, Default)]
struct Registry {
    mutators: usize,
    parked: usize,
    epoch: u64,
}

/// Safepoint coordinator shared by every thread of one VM.
#[derive(Debug)]
pub struct SafepointCoordinator {
    requested: AtomicBool,
    phase: AtomicCell<GcPhase>,
    state: Mutex<Registry>,
    cond: Condvar,
    poll_count: AtomicU64,
}

impl SafepointCoordinator {
    /// Creates a coordinator with no registered mutators.
    pub fn new() -> Self {
        SafepointCoordinator {
            requested: AtomicBool::new(false),
            phase: AtomicCell::new(GcPhase::Idle),
            state: Mutex::new(Registry::default()),
            cond: Condvar::new(),
            poll_count: AtomicU64::new(0),
        }
    }

    /// Registers the calling thread as a mutator.
    ///
    /// Blocks while a collection is in progress so a new thread never
    /// observes a half-moved heap.
    pub fn register(&self) {
        let mut state = self.state.lock();
        while self.requested.load(Ordering::Acquire) {
            self.cond.wait(&mut state);
        }
        state.mutators += 1;
    }

    /// Removes the calling thread from the mutator set.
    pub fn unregister(&self) {
        let mut state = self.state.lock();
        state.mutators = state.mutators.saturating_sub(1);
        self.cond.notify_all();
    }

    /// Number of registered mutators.
    pub fn mutator_count(&self) -> usize {
        self.state.lock().mutators
    }

    /// Current phase.
    pub fn phase(&self) -> GcPhase {
        self.phase.load()
    }

    /// Returns true if a collection has been requested.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Safepoint poll. Parks the caller if a collection is pending.
    ///
    /// # Returns
    ///
    /// `true` if the thread was parked (its roots may have moved).
    #[inline]
    pub fn poll(&self) -> bool {
        self.poll_count.fetch_add(1, Ordering::Relaxed);
        if !self.is_requested() {
            return false;
        }
        self.park();
        true
    }

    /// Parks the caller until the pending collection (if any) finishes.
    pub fn park(&self) {
        let mut state = self.state.lock();
        if !self.requested.load(Ordering::Acquire) {
            return;
        }
        let epoch = state.epoch;
        state.parked += 1;
        self.cond.notify_all();
        trace!(parked = state.parked, "mutator parked at safepoint");
        while state.epoch == epoch && self.requested.load(Ordering::Acquire) {
            self.cond.wait(&mut state);
        }
        state.parked -= 1;
    }

    /// Marks the caller as stopped for the duration of a blocking operation.
    ///
    /// The caller must not touch the heap until
    /// [`SafepointCoordinator::leave_safe_region`].
    pub fn enter_safe_region(&self) {
        let mut state = self.state.lock();
        state.parked += 1;
        self.cond.notify_all();
    }

    /// Leaves a safe region, waiting for any collection in progress.
    pub fn leave_safe_region(&self) {
        let mut state = self.state.lock();
        while self.requested.load(Ordering::Acquire) {
            self.cond.wait(&mut state);
        }
        state.parked -= 1;
    }

    /// Runs `f` inside a safe region.
    pub fn in_safe_region<R>(&self, f: impl FnOnce() -> R) -> R {
        self.enter_safe_region();
        let guard = SafeRegion { coordinator: self };
        let result = f();
        drop(guard);
        result
    }

    /// Requests a collection and waits for the other mutators to stop.
    ///
    /// # Arguments
    ///
    /// * `caller_is_mutator` - Whether the caller is itself registered
    ///
    /// # Returns
    ///
    /// [`CollectionTicket::Acquired`] when the world is stopped and the
    /// caller may collect, or [`CollectionTicket::Busy`] if another thread
    /// collected first (the caller was parked meanwhile).
    pub fn begin_collection(&self, caller_is_mutator: bool) -> CollectionTicket {
        let mut state = self.state.lock();
        if self.requested.load(Ordering::Acquire) {
            let epoch = state.epoch;
            if caller_is_mutator {
                state.parked += 1;
                self.cond.notify_all();
            }
            while state.epoch == epoch && self.requested.load(Ordering::Acquire) {
                self.cond.wait(&mut state);
            }
            if caller_is_mutator {
                state.parked -= 1;
            }
            return CollectionTicket::Busy;
        }

        self.requested.store(true, Ordering::Release);
        self.phase.store(GcPhase::Requested);
        loop {
            let others = state.mutators.saturating_sub(caller_is_mutator as usize);
            if state.parked >= others {
                break;
            }
            self.cond.wait(&mut state);
        }
        self.phase.store(GcPhase::Collecting);
        trace!(mutators = state.mutators, "world stopped for collection");
        CollectionTicket::Acquired
    }

    /// Ends a collection started with `begin_collection` and resumes the
    /// parked mutators.
    pub fn end_collection(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        self.phase.store(GcPhase::Idle);
        self.requested.store(false, Ordering::Release);
        self.cond.notify_all();
    }

    /// Number of collections completed through this coordinator.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Number of safepoint polls performed.
    pub fn poll_count(&self) -> u64 {
        self.poll_count.load(Ordering::Relaxed)
    }
}

impl Default for SafepointCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

struct SafeRegion<'a> {
    coordinator: &'a SafepointCoordinator,
}

impl Drop for SafeRegion<'_> {
    fn drop(&mut self) {
        self.coordinator.leave_safe_region();
    }
}
