//! Root enumeration and layout queries used by the collector.

use std::sync::Arc;

use core_types::{ClassId, ObjectRef, Value};

/// Source of GC roots.
///
/// The collector hands every root to `visitor`, which may rewrite it to
/// the object's new location.
pub trait RootSet {
    /// Visit every root reference exactly once per collection.
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef));
}

impl RootSet for [ObjectRef] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.iter_mut().for_each(|r| visitor(r));
    }
}

impl RootSet for Vec<ObjectRef> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

impl RootSet for [Value] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        for value in self.iter_mut() {
            if let Value::Reference(Some(r)) = value {
                visitor(r);
            }
        }
    }
}

impl RootSet for Vec<Value> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.as_mut_slice().visit_roots(visitor);
    }
}

impl<T: RootSet + ?Sized> RootSet for &mut T {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        (**self).visit_roots(visitor);
    }
}

/// Answers which slots of an instance or static storage hold references.
///
/// Array element types are recorded in the object header, so only
/// slot-based objects need the oracle.
pub trait LayoutOracle {
    /// Reference slot indices of instances of `class`.
    fn instance_reference_slots(&self, class: ClassId) -> Arc<[u32]>;

    /// Reference slot indices of the static storage of `class`.
    fn static_reference_slots(&self, class: ClassId) -> Arc<[u32]>;
}

/// Oracle for objects that contain no references.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReferences;

impl LayoutOracle for NoReferences {
    fn instance_reference_slots(&self, _class: ClassId) -> Arc<[u32]> {
        Arc::from(Vec::new())
    }

    fn static_reference_slots(&self, _class: ClassId) -> Arc<[u32]> {
        Arc::from(Vec::new())
    }
}
