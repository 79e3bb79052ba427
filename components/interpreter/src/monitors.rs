//! Object monitors for `monitorenter`/`monitorexit` and synchronized
//! methods.
//!
//! Monitors live in a side table keyed by object. Entries hold the object
//! handle, so the table is a GC root and the collector rewrites the key
//! when the object moves. Contended acquisition waits on the table's
//! condition variable; callers do that inside a safe region.

use core_types::{JavaThreadId, ObjectRef};
use memory_manager::RootSet;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug)]
struct MonitorEntry {
    id: u64,
    object: ObjectRef,
    owner: Option<JavaThreadId>,
    count: u32,
    waiters: u32,
}

/// Monitor entries, guarded by the table lock.
#[derive(Debug, Default)]
pub struct MonitorState {
    entries: Vec<MonitorEntry>,
    next_id: u64,
}

impl MonitorState {
    fn find(&mut self, object: ObjectRef) -> Option<&mut MonitorEntry> {
        self.entries.iter_mut().find(|e| e.object == object)
    }

    /// Number of objects with an owned or contended monitor.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no monitor is in use.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RootSet for MonitorState {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for entry in &mut self.entries {
            visitor(&mut entry.object);
        }
    }
}

/// Outcome of a non-blocking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The caller owns the monitor
    Acquired,
    /// Another thread owns it; wait with [`MonitorTable::wait_for`] on this
    /// entry
    Contended(u64),
}

/// Monitor table shared by the threads of one VM.
#[derive(Debug, Default)]
pub struct MonitorTable {
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl MonitorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the monitor of `object` if it is free or already owned by
    /// `thread`; otherwise registers `thread` as a waiter.
    pub fn try_enter(&self, object: ObjectRef, thread: JavaThreadId) -> Acquire {
        let mut state = self.state.lock();
        if let Some(entry) = state.find(object) {
            return match entry.owner {
                None => {
                    entry.owner = Some(thread);
                    entry.count = 1;
                    Acquire::Acquired
                }
                Some(owner) if owner == thread => {
                    entry.count += 1;
                    Acquire::Acquired
                }
                Some(_) => {
                    entry.waiters += 1;
                    Acquire::Contended(entry.id)
                }
            };
        }
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(MonitorEntry {
            id,
            object,
            owner: Some(thread),
            count: 1,
            waiters: 0,
        });
        Acquire::Acquired
    }

    /// Blocks until the contended entry `id` is free, then takes it.
    pub fn wait_for(&self, id: u64, thread: JavaThreadId) {
        let mut state = self.state.lock();
        loop {
            match state.entries.iter_mut().find(|e| e.id == id) {
                Some(entry) if entry.owner.is_none() => {
                    entry.owner = Some(thread);
                    entry.count = 1;
                    entry.waiters -= 1;
                    trace!(monitor = id, thread = thread.0, "contended monitor acquired");
                    return;
                }
                Some(_) => self.released.wait(&mut state),
                // Entries with waiters are never removed.
                None => return,
            }
        }
    }

    /// Releases one hold of `object`'s monitor by `thread`.
    ///
    /// # Returns
    ///
    /// `false` if `thread` does not own the monitor.
    pub fn exit(&self, object: ObjectRef, thread: JavaThreadId) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state
            .entries
            .iter()
            .position(|e| e.object == object && e.owner == Some(thread))
        else {
            return false;
        };
        let entry = &mut state.entries[index];
        entry.count -= 1;
        if entry.count == 0 {
            entry.owner = None;
            if entry.waiters == 0 {
                state.entries.swap_remove(index);
            }
            self.released.notify_all();
        }
        true
    }

    /// Releases every monitor still held by a terminating thread.
    pub fn release_all(&self, thread: JavaThreadId) -> usize {
        let mut state = self.state.lock();
        let mut released = 0;
        for entry in state.entries.iter_mut().filter(|e| e.owner == Some(thread)) {
            entry.owner = None;
            entry.count = 0;
            released += 1;
        }
        state.entries.retain(|e| e.owner.is_some() || e.waiters > 0);
        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    /// Hold count of `object`'s monitor by `thread`.
    pub fn hold_count(&self, object: ObjectRef, thread: JavaThreadId) -> u32 {
        let mut state = self.state.lock();
        match state.find(object) {
            Some(entry) if entry.owner == Some(thread) => entry.count,
            _ => 0,
        }
    }

    /// Locks the table for root scanning.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock()
    }
}
