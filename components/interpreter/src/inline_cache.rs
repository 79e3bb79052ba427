//! Inline caching for virtual and interface call sites
//!
//! Provides mono/poly/megamorphic caching states keyed by receiver class.

use std::sync::Arc;

use arrayvec::ArrayVec;
use class_loader::MethodInfo;
use core_types::ClassId;

/// Receiver classes a polymorphic site remembers before going megamorphic
pub const POLYMORPHIC_LIMIT: usize = 4;

/// Identity of a call instruction: the calling method and the pc of the
/// invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    method: usize,
    pc: u32,
}

impl CallSite {
    /// Names the invoke at `pc` in `method`.
    ///
    /// Methods live as long as their loader, so the record address is a
    /// stable identity.
    pub fn new(method: &Arc<MethodInfo>, pc: usize) -> Self {
        CallSite {
            method: Arc::as_ptr(method) as usize,
            pc: pc as u32,
        }
    }
}

/// Inline cache for method selection
///
/// Caches the receiver class and the selected implementation of one call
/// site. Transitions through states as more receiver classes are seen.
#[derive(Debug, Clone)]
pub enum InlineCache {
    /// No receiver seen yet
    Uninitialized,
    /// Single receiver class cached (most common case)
    Monomorphic {
        /// The cached receiver class
        receiver: ClassId,
        /// Implementation selected for it
        target: Arc<MethodInfo>,
    },
    /// Several receiver classes cached
    Polymorphic {
        /// List of (receiver, target) pairs
        entries: ArrayVec<(ClassId, Arc<MethodInfo>), POLYMORPHIC_LIMIT>,
    },
    /// Too many receiver classes, always select through the virtual table
    Megamorphic,
}

impl InlineCache {
    /// Create a new uninitialized cache
    pub fn new() -> Self {
        InlineCache::Uninitialized
    }

    /// Look up the implementation for `receiver`
    pub fn lookup(&self, receiver: ClassId) -> Option<Arc<MethodInfo>> {
        match self {
            InlineCache::Uninitialized | InlineCache::Megamorphic => None,
            InlineCache::Monomorphic {
                receiver: cached,
                target,
            } => (*cached == receiver).then(|| target.clone()),
            InlineCache::Polymorphic { entries } => entries
                .iter()
                .find(|(class, _)| *class == receiver)
                .map(|(_, target)| target.clone()),
        }
    }

    /// Record that `receiver` dispatches to `target`
    ///
    /// Transitions cache state as needed:
    /// - Uninitialized → Monomorphic
    /// - Monomorphic → Polymorphic (if different receiver)
    /// - Polymorphic → Megamorphic (if more than [`POLYMORPHIC_LIMIT`] receivers)
    pub fn update(&mut self, receiver: ClassId, target: Arc<MethodInfo>) {
        match self {
            InlineCache::Uninitialized => {
                *self = InlineCache::Monomorphic { receiver, target };
            }
            InlineCache::Monomorphic {
                receiver: cached,
                target: cached_target,
            } => {
                if *cached == receiver {
                    *cached_target = target;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push((*cached, cached_target.clone()));
                    entries.push((receiver, target));
                    *self = InlineCache::Polymorphic { entries };
                }
            }
            InlineCache::Polymorphic { entries } => {
                if let Some(entry) = entries.iter_mut().find(|(class, _)| *class == receiver) {
                    entry.1 = target;
                } else if entries.try_push((receiver, target)).is_err() {
                    *self = InlineCache::Megamorphic;
                }
            }
            InlineCache::Megamorphic => {}
        }
    }

    /// Returns true once the site gave up caching.
    pub fn is_megamorphic(&self) -> bool {
        matches!(self, InlineCache::Megamorphic)
    }
}

impl Default for InlineCache {
    fn default() -> Self {
        Self::new()
    }
}
