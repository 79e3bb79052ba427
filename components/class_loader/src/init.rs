//! Class initialization state machine.
//!
//! The interpreter drives initialization; this module only arbitrates who
//! runs `<clinit>` and records the outcome:
//!
//! 1. [`ClassDescriptor::begin_initialization`] tells the caller whether the
//!    class is usable, whether it must run the initializer itself, or
//!    whether another thread is doing so.
//! 2. The initializing thread finishes with
//!    [`ClassDescriptor::complete_initialization`] or
//!    [`ClassDescriptor::fail_initialization`].
//! 3. Other threads block in [`ClassDescriptor::wait_for_initialization`]
//!    until one of those happens.

use core_types::{ClassState, JavaThreadId, JvmError, JvmResult};
use tracing::{debug, trace};

use crate::class::{ClassDescriptor, Lifecycle};
use crate::names;

/// What the caller of `begin_initialization` must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAction {
    /// The class is initialized, or is being initialized by the caller
    Ready,
    /// The caller owns initialization: initialize the superclass, run
    /// `<clinit>`, then complete or fail
    Proceed,
    /// Another thread is initializing; call `wait_for_initialization`
    Wait,
}

impl ClassDescriptor {
    fn transition(&self, lifecycle: &mut Lifecycle, next: ClassState) -> JvmResult<()> {
        if !lifecycle.state.can_advance_to(next) {
            return Err(JvmError::internal(format!(
                "illegal state transition {:?} -> {:?} for {}",
                lifecycle.state,
                next,
                self.name()
            )));
        }
        trace!(class = self.name(), from = ?lifecycle.state, to = ?next, "class state");
        lifecycle.state = next;
        lifecycle.history.push(next);
        Ok(())
    }

    fn sticky_error(&self, lifecycle: &Lifecycle) -> JvmError {
        lifecycle.error.clone().unwrap_or_else(|| {
            JvmError::initialization(format!(
                "Could not initialize class {}",
                names::to_binary(self.name())
            ))
        })
    }

    fn evaluate(&self, lifecycle: &Lifecycle, thread: JavaThreadId) -> JvmResult<Option<InitAction>> {
        match lifecycle.state {
            ClassState::FullyInitialized => Ok(Some(InitAction::Ready)),
            ClassState::InitializationError => Err(self.sticky_error(lifecycle)),
            ClassState::BeingInitialized if lifecycle.initializer == Some(thread) => {
                Ok(Some(InitAction::Ready))
            }
            ClassState::BeingInitialized => Ok(Some(InitAction::Wait)),
            ClassState::Linked => Ok(None),
            other => Err(JvmError::internal(format!(
                "{} cannot be initialized in state {:?}",
                self.name(),
                other
            ))),
        }
    }

    /// Starts initialization on behalf of `thread`.
    ///
    /// # Returns
    ///
    /// * `Ready` - initialized already, or `thread` is the initializer
    ///   (reentrant use during `<clinit>`)
    /// * `Proceed` - the class moved to `BeingInitialized` and `thread` owns it
    /// * `Wait` - another thread owns initialization
    /// * `Err` - the sticky error of a class whose initialization failed
    pub fn begin_initialization(&self, thread: JavaThreadId) -> JvmResult<InitAction> {
        if self.is_initialized() {
            return Ok(InitAction::Ready);
        }
        let mut lifecycle = self.lifecycle.lock();
        if let Some(action) = self.evaluate(&lifecycle, thread)? {
            return Ok(action);
        }
        self.transition(&mut lifecycle, ClassState::BeingInitialized)?;
        lifecycle.initializer = Some(thread);
        debug!(class = self.name(), thread = thread.0, "initializing class");
        Ok(InitAction::Proceed)
    }

    /// Blocks until the initializing thread finishes, then re-evaluates.
    ///
    /// Callers that take part in garbage collection must wrap this in a
    /// safe region.
    pub fn wait_for_initialization(&self, thread: JavaThreadId) -> JvmResult<InitAction> {
        let mut lifecycle = self.lifecycle.lock();
        loop {
            match self.evaluate(&lifecycle, thread)? {
                Some(InitAction::Wait) => self.init_done.wait(&mut lifecycle),
                Some(action) => return Ok(action),
                None => {
                    // The initializer never started; claim it.
                    self.transition(&mut lifecycle, ClassState::BeingInitialized)?;
                    lifecycle.initializer = Some(thread);
                    return Ok(InitAction::Proceed);
                }
            }
        }
    }

    /// Marks the class `FullyInitialized` and wakes waiting threads.
    pub fn complete_initialization(&self) -> JvmResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.transition(&mut lifecycle, ClassState::FullyInitialized)?;
        lifecycle.initializer = None;
        self.mark_initialized();
        self.init_done.notify_all();
        debug!(class = self.name(), "class initialized");
        Ok(())
    }

    /// Marks the class `InitializationError` forever and wakes waiting
    /// threads.
    ///
    /// # Arguments
    ///
    /// * `reason` - Description of the failure, kept for diagnostics
    pub fn fail_initialization(&self, reason: &str) -> JvmResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        self.transition(&mut lifecycle, ClassState::InitializationError)?;
        lifecycle.initializer = None;
        lifecycle.error = Some(JvmError::initialization(format!(
            "Could not initialize class {}",
            names::to_binary(self.name())
        )));
        self.init_done.notify_all();
        debug!(class = self.name(), reason, "class initialization failed");
        Ok(())
    }

    /// Thread currently running `<clinit>`, if any.
    pub fn initializing_thread(&self) -> Option<JavaThreadId> {
        self.lifecycle.lock().initializer
    }
}
