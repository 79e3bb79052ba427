//! Class lifecycle states.

use std::fmt;

/// Lifecycle state of a class descriptor.
///
/// States are ordered; a descriptor only ever moves forward through
/// `Allocated, Loaded, Linked, BeingInitialized` and then into exactly one
/// of the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassState {
    /// Registered under its name, bytes not yet parsed
    Allocated,
    /// Class file parsed
    Loaded,
    /// Superclass and interfaces resolved, layout computed
    Linked,
    /// `<clinit>` running
    BeingInitialized,
    /// `<clinit>` completed
    FullyInitialized,
    /// `<clinit>` threw; terminal and sticky
    InitializationError,
}

impl ClassState {
    /// The canonical order of states for a successful initialization.
    pub const CANONICAL: [ClassState; 5] = [
        ClassState::Allocated,
        ClassState::Loaded,
        ClassState::Linked,
        ClassState::BeingInitialized,
        ClassState::FullyInitialized,
    ];

    /// Returns true once field and method resolution may use the class.
    pub fn is_linked(self) -> bool {
        self >= ClassState::Linked
    }

    /// Returns true for `FullyInitialized` and `InitializationError`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClassState::FullyInitialized | ClassState::InitializationError
        )
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    ///
    /// Only single forward steps are legal, except that `BeingInitialized`
    /// may end in either terminal state.
    pub fn can_advance_to(self, next: ClassState) -> bool {
        use ClassState::*;
        matches!(
            (self, next),
            (Allocated, Loaded)
                | (Loaded, Linked)
                | (Linked, BeingInitialized)
                | (BeingInitialized, FullyInitialized)
                | (BeingInitialized, InitializationError)
        )
    }

    /// Returns true if `sequence` is a prefix of the canonical order, where
    /// the last step may be `InitializationError` in place of
    /// `FullyInitialized`.
    pub fn is_valid_sequence(sequence: &[ClassState]) -> bool {
        if sequence.len() > Self::CANONICAL.len() {
            return false;
        }
        sequence.iter().enumerate().all(|(i, state)| {
            *state == Self::CANONICAL[i]
                || (i == 4 && *state == ClassState::InitializationError)
        })
    }
}

impl fmt::Display for ClassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
