//! Class metadata owned by the loader arena.
//!
//! A [`ClassDescriptor`] is immutable once published except for its
//! initialization state and its static storage handle, which are guarded
//! separately so the interpreter can read metadata without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use classfile::{ClassAccess, CodeAttribute, ConstantPool, ConstantValue, FieldAccess, MethodAccess};
use core_types::{
    BasicType, ClassId, ClassState, FieldType, JavaThreadId, JvmError, MethodDescriptor, ObjectRef,
};
use parking_lot::{Condvar, Mutex};

use crate::names;

/// A method after loading.
#[derive(Debug)]
pub struct MethodInfo {
    /// Declaring class
    pub owner: ClassId,
    /// Internal name of the declaring class
    pub owner_name: Arc<str>,
    /// Method name
    pub name: String,
    /// Descriptor string
    pub descriptor: String,
    /// Parsed descriptor
    pub signature: MethodDescriptor,
    /// Access flags
    pub access: MethodAccess,
    /// Bytecode body; absent for native and abstract methods
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    /// Returns true for `static` methods.
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Returns true for `native` methods.
    pub fn is_native(&self) -> bool {
        self.access.contains(MethodAccess::NATIVE)
    }

    /// Returns true for `abstract` methods.
    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccess::ABSTRACT)
    }

    /// Returns true for `private` methods.
    pub fn is_private(&self) -> bool {
        self.access.contains(MethodAccess::PRIVATE)
    }

    /// Returns true for `final` methods.
    pub fn is_final(&self) -> bool {
        self.access.contains(MethodAccess::FINAL)
    }

    /// Returns true for `synchronized` methods.
    pub fn is_synchronized(&self) -> bool {
        self.access.contains(MethodAccess::SYNCHRONIZED)
    }

    /// Returns true for instance and static initializers.
    pub fn is_initializer(&self) -> bool {
        self.name == names::CONSTRUCTOR || self.name == names::CLASS_INITIALIZER
    }

    /// Local slots taken by the arguments, including the receiver.
    pub fn argument_slots(&self) -> usize {
        self.signature.argument_slots() + usize::from(!self.is_static())
    }

    /// Returns true if the method takes part in virtual dispatch.
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_initializer()
    }

    /// `Owner.name(descriptor)` for messages.
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}{}",
            names::to_binary(&self.owner_name),
            self.name,
            self.descriptor
        )
    }
}

/// A field after linking; `slot` indexes instance or static storage.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Declaring class
    pub owner: ClassId,
    /// Field name
    pub name: String,
    /// Descriptor string
    pub descriptor: String,
    /// Parsed descriptor
    pub field_type: FieldType,
    /// Access flags
    pub access: FieldAccess,
    /// Slot index in the instance (or static storage for static fields)
    pub slot: u32,
    /// Initial value of a static constant
    pub constant_value: Option<ConstantValue>,
}

impl FieldInfo {
    /// Returns true for `static` fields.
    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccess::STATIC)
    }

    /// Storage kind of the field.
    pub fn basic_type(&self) -> BasicType {
        self.field_type.basic_type()
    }
}

/// Element type of an array class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayComponent {
    /// `[I`, `[J`, ...
    Primitive(BasicType),
    /// `[Ljava/lang/String;`, `[[I`, ...
    Reference(ClassId),
}

/// Data specific to classes and interfaces loaded from class files.
#[derive(Debug)]
pub struct InstanceClass {
    /// Runtime constant pool
    pub constant_pool: ConstantPool,
    /// Declared methods
    pub methods: Vec<Arc<MethodInfo>>,
    /// Declared fields, instance and static
    pub fields: Vec<Arc<FieldInfo>>,
    /// `SourceFile` attribute
    pub source_file: Option<String>,
}

/// Data specific to array classes.
#[derive(Debug, Clone, Copy)]
pub struct ArrayClass {
    /// Component type
    pub component: ArrayComponent,
    /// Storage kind of the elements
    pub element: BasicType,
    /// Number of dimensions
    pub dimensions: u8,
}

/// Tagged class variant over the common record.
#[derive(Debug)]
pub enum ClassKind {
    /// Class or interface from a class file
    Instance(InstanceClass),
    /// Array class created on demand
    Array(ArrayClass),
}

/// Layout and dispatch tables computed while linking.
#[derive(Debug, Default)]
pub struct Linkage {
    /// Direct superclass; `None` only for `java/lang/Object`
    pub super_class: Option<ClassId>,
    /// Direct superinterfaces
    pub interfaces: Vec<ClassId>,
    /// Every interface implemented, directly or inherited
    pub all_interfaces: Vec<ClassId>,
    /// Superclass chain from the direct superclass up to the root
    pub ancestors: Vec<ClassId>,
    /// Instance slot count including inherited slots
    pub instance_slots: u32,
    /// Static slot count
    pub static_slots: u32,
    /// Instance slots holding references
    pub instance_reference_slots: Arc<[u32]>,
    /// Static slots holding references
    pub static_reference_slots: Arc<[u32]>,
    /// Virtual method table
    pub vtable: Vec<Arc<MethodInfo>>,
    /// (name, descriptor) → vtable index
    pub vtable_index: HashMap<(String, String), usize>,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) state: ClassState,
    pub(crate) history: Vec<ClassState>,
    pub(crate) initializer: Option<JavaThreadId>,
    pub(crate) error: Option<JvmError>,
}

/// Metadata of one loaded class, interface or array class.
pub struct ClassDescriptor {
    id: ClassId,
    name: Arc<str>,
    access: ClassAccess,
    kind: ClassKind,
    linkage: Linkage,
    pub(crate) lifecycle: Mutex<Lifecycle>,
    pub(crate) init_done: Condvar,
    initialized: AtomicBool,
    statics: AtomicU32,
}

impl ClassDescriptor {
    pub(crate) fn new(
        id: ClassId,
        name: Arc<str>,
        access: ClassAccess,
        kind: ClassKind,
        linkage: Linkage,
        history: Vec<ClassState>,
    ) -> Self {
        let state = history.last().copied().unwrap_or(ClassState::Allocated);
        ClassDescriptor {
            id,
            name,
            access,
            kind,
            linkage,
            lifecycle: Mutex::new(Lifecycle {
                state,
                history,
                initializer: None,
                error: None,
            }),
            init_done: Condvar::new(),
            initialized: AtomicBool::new(state == ClassState::FullyInitialized),
            statics: AtomicU32::new(0),
        }
    }

    /// Arena handle.
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Internal name (`java/lang/Object`, `[I`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared internal name.
    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Access flags.
    pub fn access(&self) -> ClassAccess {
        self.access
    }

    /// Class variant.
    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    /// Linked layout and dispatch tables.
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Direct superclass handle.
    pub fn super_class(&self) -> Option<ClassId> {
        self.linkage.super_class
    }

    /// Returns true for interfaces.
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccess::INTERFACE)
    }

    /// Returns true for abstract classes and interfaces.
    pub fn is_abstract(&self) -> bool {
        self.access.contains(ClassAccess::ABSTRACT)
    }

    /// Returns true for final classes.
    pub fn is_final(&self) -> bool {
        self.access.contains(ClassAccess::FINAL)
    }

    /// Returns true for array classes.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array(_))
    }

    /// Array data, if this is an array class.
    pub fn as_array(&self) -> Option<&ArrayClass> {
        match &self.kind {
            ClassKind::Array(array) => Some(array),
            ClassKind::Instance(_) => None,
        }
    }

    /// Class-file data, if this is not an array class.
    pub fn as_instance(&self) -> Option<&InstanceClass> {
        match &self.kind {
            ClassKind::Instance(class) => Some(class),
            ClassKind::Array(_) => None,
        }
    }

    /// Constant pool of a class loaded from a class file.
    pub fn constant_pool(&self) -> Option<&ConstantPool> {
        self.as_instance().map(|c| &c.constant_pool)
    }

    /// Declared methods (empty for arrays).
    pub fn methods(&self) -> &[Arc<MethodInfo>] {
        match &self.kind {
            ClassKind::Instance(class) => &class.methods,
            ClassKind::Array(_) => &[],
        }
    }

    /// Declared fields (empty for arrays).
    pub fn fields(&self) -> &[Arc<FieldInfo>] {
        match &self.kind {
            ClassKind::Instance(class) => &class.fields,
            ClassKind::Array(_) => &[],
        }
    }

    /// Finds a declared method by name and descriptor.
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<MethodInfo>> {
        self.methods()
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Finds a declared field by name and descriptor.
    pub fn declared_field(&self, name: &str, descriptor: &str) -> Option<&Arc<FieldInfo>> {
        self.fields()
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Finds a vtable entry by name and descriptor.
    pub fn virtual_method(&self, name: &str, descriptor: &str) -> Option<&Arc<MethodInfo>> {
        self.linkage
            .vtable_index
            .get(&(name.to_string(), descriptor.to_string()))
            .and_then(|&i| self.linkage.vtable.get(i))
    }

    /// Instance slot count.
    pub fn instance_slots(&self) -> u32 {
        self.linkage.instance_slots
    }

    /// Static slot count.
    pub fn static_slots(&self) -> u32 {
        self.linkage.static_slots
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClassState {
        self.lifecycle.lock().state
    }

    /// Every state this class has been in, oldest first.
    pub fn state_history(&self) -> Vec<ClassState> {
        self.lifecycle.lock().history.clone()
    }

    /// Fast check for `FullyInitialized`.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Static storage object, once allocated.
    pub fn static_storage(&self) -> Option<ObjectRef> {
        ObjectRef::from_offset(self.statics.load(Ordering::Acquire))
    }

    /// Records the static storage object.
    pub fn set_static_storage(&self, storage: ObjectRef) {
        self.statics.store(storage.offset(), Ordering::Release);
    }

    /// Lets the collector rewrite the static storage handle.
    pub(crate) fn visit_static_storage(&self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        if let Some(mut storage) = self.static_storage() {
            visitor(&mut storage);
            self.statics.store(storage.offset(), Ordering::Release);
        }
    }

    /// Element storage kind for arrays; `None` for other classes.
    pub fn element_type(&self) -> Option<BasicType> {
        self.as_array().map(|a| a.element)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassDescriptor {}
