//! The type graph: name → class resolution, caching and hierarchy queries.

use std::collections::HashMap;
use std::sync::Arc;

use classfile::{ClassAccess, ClassFile};
use core_types::{
    BasicType, ClassId, ClassState, ErrorKind, FieldType, JvmError, JvmResult, ObjectRef,
};
use memory_manager::LayoutOracle;
use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, trace};

use crate::class::{
    ArrayClass, ArrayComponent, ClassDescriptor, ClassKind, FieldInfo, InstanceClass, Linkage,
    MethodInfo,
};
use crate::linker;
use crate::names;
use crate::resolver::ClasspathResolver;

#[derive(Debug, Clone, Copy)]
enum Entry {
    /// Registered but not yet published; seeing this while holding the load
    /// lock means the current thread is already loading the class.
    Loading(ClassId),
    Ready(ClassId),
}

#[derive(Debug, Default)]
struct Registry {
    by_name: HashMap<Arc<str>, Entry>,
    classes: Vec<Option<Arc<ClassDescriptor>>>,
    /// Slots reserved by loads that failed, reused before the arena grows.
    free: Vec<ClassId>,
}

/// Loads, links and caches classes for one VM.
///
/// # Examples
///
/// ```
/// use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver};
///
/// let loader = ClassLoader::new(BootstrapResolver::new(InMemoryResolver::new()));
/// let object = loader.resolve("java/lang/Object").unwrap();
/// assert!(object.super_class().is_none());
/// assert!(std::sync::Arc::ptr_eq(&object, &loader.resolve("java/lang/Object").unwrap()));
/// ```
pub struct ClassLoader {
    resolver: Box<dyn ClasspathResolver>,
    registry: RwLock<Registry>,
    /// Serializes define operations; reentrant so loading a class can load
    /// its superclass on the same thread.
    load_lock: ReentrantMutex<()>,
}

impl ClassLoader {
    /// Creates a loader reading class bytes from `resolver`.
    pub fn new(resolver: impl ClasspathResolver + 'static) -> Self {
        ClassLoader {
            resolver: Box::new(resolver),
            registry: RwLock::new(Registry::default()),
            load_lock: ReentrantMutex::new(()),
        }
    }

    /// Resolves `name` (internal form) to a linked class.
    ///
    /// Successful results are cached; failures other than a sticky
    /// initialization error are not.
    ///
    /// # Returns
    ///
    /// `NotFound`, `ClassFormat`, `Linkage` or `ClassCircularity` errors for
    /// classes that cannot be defined, or the stored `Initialization` error
    /// of a class whose static initializer failed.
    pub fn resolve(&self, name: &str) -> JvmResult<Arc<ClassDescriptor>> {
        if let Some(class) = self.lookup(name) {
            return Self::check_usable(class);
        }

        let _guard = self.load_lock.lock();
        let reserved = {
            let mut registry = self.registry.write();
            let existing = registry.by_name.get(name).copied();
            match existing {
                Some(Entry::Ready(id)) => {
                    let class = registry.classes[id.index()].clone();
                    drop(registry);
                    return class
                        .ok_or_else(|| JvmError::internal(format!("{} missing from arena", name)))
                        .and_then(Self::check_usable);
                }
                Some(Entry::Loading(_)) => {
                    return Err(JvmError::new(
                        ErrorKind::ClassCircularity,
                        names::to_binary(name),
                    ));
                }
                None => {
                    let id = match registry.free.pop() {
                        Some(id) => id,
                        None => {
                            registry.classes.push(None);
                            ClassId(registry.classes.len() as u32 - 1)
                        }
                    };
                    registry.by_name.insert(Arc::from(name), Entry::Loading(id));
                    id
                }
            }
        };
        trace!(class = name, id = reserved.0, "class allocated");

        let result = if name.starts_with('[') {
            self.define_array(reserved, name)
        } else {
            self.define_class(reserved, name)
        };

        let mut registry = self.registry.write();
        match result {
            Ok(class) => {
                registry.classes[reserved.index()] = Some(class.clone());
                registry.by_name.insert(class.name_arc(), Entry::Ready(reserved));
                debug!(class = name, id = reserved.0, "class linked");
                Ok(class)
            }
            Err(err) => {
                registry.by_name.remove(name);
                registry.free.push(reserved);
                debug!(class = name, error = %err, "class discarded");
                Err(err)
            }
        }
    }

    fn check_usable(class: Arc<ClassDescriptor>) -> JvmResult<Arc<ClassDescriptor>> {
        let lifecycle = class.lifecycle.lock();
        if lifecycle.state == ClassState::InitializationError {
            let err = lifecycle.error.clone().unwrap_or_else(|| {
                JvmError::initialization(format!(
                    "Could not initialize class {}",
                    names::to_binary(class.name())
                ))
            });
            return Err(err);
        }
        drop(lifecycle);
        Ok(class)
    }

    fn define_class(&self, id: ClassId, name: &str) -> JvmResult<Arc<ClassDescriptor>> {
        let bytes = self
            .resolver
            .find_class(name)?
            .ok_or_else(|| JvmError::not_found(names::to_binary(name)))?;

        let class_file = ClassFile::parse(&bytes)?;
        if class_file.this_class != name {
            return Err(JvmError::class_format(format!(
                "{} (wrong name: {})",
                name, class_file.this_class
            )));
        }
        let owner: Arc<str> = Arc::from(name);
        let methods = linker::build_methods(id, &owner, &class_file)?;
        trace!(class = name, "class loaded");

        let super_class = match &class_file.super_class {
            Some(super_name) => Some(self.resolve_supertype(name, super_name, "superclass")?),
            None => None,
        };
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|iface| self.resolve_supertype(name, iface, "superinterface"))
            .collect::<JvmResult<Vec<_>>>()?;

        let (mut linkage, fields) = linker::link_class(
            id,
            name,
            &class_file,
            &methods,
            super_class.as_deref(),
            &interfaces,
        )?;
        if !class_file.is_interface() {
            let implemented = linkage
                .all_interfaces
                .iter()
                .map(|&iface| self.get(iface))
                .collect::<JvmResult<Vec<_>>>()?;
            linker::append_default_methods(&mut linkage, &implemented);
        }

        let access = class_file.access;
        let kind = ClassKind::Instance(InstanceClass {
            constant_pool: class_file.constant_pool,
            methods,
            fields,
            source_file: class_file.source_file,
        });
        Ok(Arc::new(ClassDescriptor::new(
            id,
            owner,
            access,
            kind,
            linkage,
            vec![ClassState::Allocated, ClassState::Loaded, ClassState::Linked],
        )))
    }

    /// Resolves a superclass or superinterface, reporting cycles as class
    /// circularity of the class being linked.
    fn resolve_for_link(&self, name: &str, dependency: &str) -> JvmResult<Arc<ClassDescriptor>> {
        match self.resolve(dependency) {
            Ok(class) => Ok(class),
            Err(err) if err.kind == ErrorKind::ClassCircularity => Err(JvmError::new(
                ErrorKind::ClassCircularity,
                names::to_binary(name),
            )),
            Err(err) if err.kind == ErrorKind::Initialization => {
                // Linking only needs the metadata, not an initialized class.
                self.lookup(dependency).ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Like `resolve_for_link`, but a supertype that does not exist fails
    /// linking of `name` rather than reporting the missing class itself.
    fn resolve_supertype(
        &self,
        name: &str,
        dependency: &str,
        role: &str,
    ) -> JvmResult<Arc<ClassDescriptor>> {
        self.resolve_for_link(name, dependency).map_err(|err| {
            if err.kind == ErrorKind::NotFound {
                JvmError::linkage(format!(
                    "{}: {} {} not found",
                    names::to_binary(name),
                    role,
                    names::to_binary(dependency)
                ))
            } else {
                err
            }
        })
    }

    fn define_array(&self, id: ClassId, name: &str) -> JvmResult<Arc<ClassDescriptor>> {
        let field_type = FieldType::parse(name).map_err(|_| JvmError::not_found(name))?;
        let FieldType::Array(component_type) = field_type else {
            return Err(JvmError::not_found(name));
        };
        let (component, dimensions, public) = match component_type.as_ref() {
            FieldType::Object(_) | FieldType::Array(_) => {
                let component_name = component_type
                    .class_name()
                    .ok_or_else(|| JvmError::not_found(name))?;
                let component = self.resolve_for_link(name, &component_name)?;
                let dimensions = component.as_array().map(|a| a.dimensions).unwrap_or(0);
                (
                    ArrayComponent::Reference(component.id()),
                    dimensions.saturating_add(1),
                    component.access().contains(ClassAccess::PUBLIC),
                )
            }
            primitive => (ArrayComponent::Primitive(primitive.basic_type()), 1, true),
        };

        let object = self.resolve_for_link(name, names::OBJECT)?;
        let cloneable = self.resolve_for_link(name, names::CLONEABLE)?;
        let serializable = self.resolve_for_link(name, names::SERIALIZABLE)?;

        let all_interfaces = vec![cloneable.id(), serializable.id()];
        let linkage = Linkage {
            super_class: Some(object.id()),
            interfaces: all_interfaces.clone(),
            all_interfaces,
            ancestors: vec![object.id()],
            vtable: object.linkage().vtable.clone(),
            vtable_index: object.linkage().vtable_index.clone(),
            ..Linkage::default()
        };
        let element = match component {
            ArrayComponent::Primitive(ty) => ty,
            ArrayComponent::Reference(_) => BasicType::Reference,
        };
        let mut access = ClassAccess::FINAL | ClassAccess::ABSTRACT;
        if public {
            access |= ClassAccess::PUBLIC;
        }
        // Arrays have no initializer, so they are initialized on creation.
        let class = ClassDescriptor::new(
            id,
            Arc::from(name),
            access,
            ClassKind::Array(ArrayClass {
                component,
                element,
                dimensions,
            }),
            linkage,
            ClassState::CANONICAL.to_vec(),
        );
        class.mark_initialized();
        Ok(Arc::new(class))
    }

    /// Returns the published class `name` without loading it.
    pub fn lookup(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        let registry = self.registry.read();
        match registry.by_name.get(name)? {
            Entry::Ready(id) => registry.classes.get(id.index())?.clone(),
            Entry::Loading(_) => None,
        }
    }

    /// Returns the class with handle `id`.
    pub fn get(&self, id: ClassId) -> JvmResult<Arc<ClassDescriptor>> {
        self.registry
            .read()
            .classes
            .get(id.index())
            .cloned()
            .flatten()
            .ok_or_else(|| JvmError::internal(format!("no class with id {}", id.0)))
    }

    /// Number of published classes.
    pub fn loaded_count(&self) -> usize {
        self.registry
            .read()
            .by_name
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count()
    }

    /// Snapshot of all published classes.
    pub fn classes(&self) -> Vec<Arc<ClassDescriptor>> {
        self.registry
            .read()
            .classes
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Array class whose components are instances of `component`.
    pub fn array_class_of(&self, component: &ClassDescriptor) -> JvmResult<Arc<ClassDescriptor>> {
        let name = if component.is_array() {
            format!("[{}", component.name())
        } else {
            format!("[L{};", component.name())
        };
        self.resolve(&name)
    }

    /// Array class of primitive elements (`[I` for `Int`).
    pub fn primitive_array_class(&self, element: BasicType) -> JvmResult<Arc<ClassDescriptor>> {
        let code = element
            .descriptor_char()
            .ok_or_else(|| JvmError::internal("reference is not a primitive element type"))?;
        self.resolve(&format!("[{}", code))
    }

    /// Returns true if `class` is `ancestor` or one of its subclasses.
    pub fn is_subclass_of(&self, class: &ClassDescriptor, ancestor: ClassId) -> bool {
        class.id() == ancestor || class.linkage().ancestors.contains(&ancestor)
    }

    /// Returns true if a value of class `from` may be stored in a variable of
    /// type `to` (class, interface and array covariance rules).
    pub fn is_assignable(&self, from: ClassId, to: ClassId) -> JvmResult<bool> {
        if from == to {
            return Ok(true);
        }
        let from = self.get(from)?;
        let to = self.get(to)?;
        self.is_assignable_class(&from, &to)
    }

    fn is_assignable_class(&self, from: &ClassDescriptor, to: &ClassDescriptor) -> JvmResult<bool> {
        if from.id() == to.id() {
            return Ok(true);
        }
        if to.is_interface() {
            return Ok(from.linkage().all_interfaces.contains(&to.id()));
        }
        match (from.as_array(), to.as_array()) {
            (Some(from_array), Some(to_array)) => match (from_array.component, to_array.component) {
                (ArrayComponent::Primitive(a), ArrayComponent::Primitive(b)) => Ok(a == b),
                (ArrayComponent::Reference(a), ArrayComponent::Reference(b)) => {
                    self.is_assignable(a, b)
                }
                _ => Ok(false),
            },
            (None, Some(_)) => Ok(false),
            _ => Ok(self.is_subclass_of(from, to.id())),
        }
    }

    /// Resolves a method reference against class `class` (class chain, then
    /// superinterfaces).
    pub fn resolve_method(
        &self,
        class: &ClassDescriptor,
        name: &str,
        descriptor: &str,
    ) -> JvmResult<Arc<MethodInfo>> {
        if class.is_interface() {
            return Err(JvmError::new(
                ErrorKind::IncompatibleClassChange,
                format!("found interface {}, but class was expected", names::to_binary(class.name())),
            ));
        }
        let mut current = Some(self.get(class.id())?);
        while let Some(c) = current {
            if let Some(method) = c.declared_method(name, descriptor) {
                return Ok(method.clone());
            }
            current = c.super_class().map(|id| self.get(id)).transpose()?;
        }
        self.find_in_interfaces(class, name, descriptor)?
            .ok_or_else(|| Self::no_such_method(class, name, descriptor))
    }

    /// Resolves an interface method reference against interface `iface`.
    pub fn resolve_interface_method(
        &self,
        iface: &ClassDescriptor,
        name: &str,
        descriptor: &str,
    ) -> JvmResult<Arc<MethodInfo>> {
        if !iface.is_interface() {
            return Err(JvmError::new(
                ErrorKind::IncompatibleClassChange,
                format!("found class {}, but interface was expected", names::to_binary(iface.name())),
            ));
        }
        if let Some(method) = iface.declared_method(name, descriptor) {
            return Ok(method.clone());
        }
        if let Some(object) = self.lookup(names::OBJECT) {
            if let Some(method) = object.declared_method(name, descriptor) {
                if method.access.contains(classfile::MethodAccess::PUBLIC) && !method.is_static() {
                    return Ok(method.clone());
                }
            }
        }
        self.find_in_interfaces(iface, name, descriptor)?
            .ok_or_else(|| Self::no_such_method(iface, name, descriptor))
    }

    /// Searches the superinterfaces of `class`, preferring non-abstract
    /// declarations.
    fn find_in_interfaces(
        &self,
        class: &ClassDescriptor,
        name: &str,
        descriptor: &str,
    ) -> JvmResult<Option<Arc<MethodInfo>>> {
        let mut fallback = None;
        for &id in &class.linkage().all_interfaces {
            let iface = self.get(id)?;
            if let Some(method) = iface.declared_method(name, descriptor) {
                if method.is_private() || method.is_static() {
                    continue;
                }
                if !method.is_abstract() {
                    return Ok(Some(method.clone()));
                }
                fallback.get_or_insert_with(|| method.clone());
            }
        }
        Ok(fallback)
    }

    fn no_such_method(class: &ClassDescriptor, name: &str, descriptor: &str) -> JvmError {
        JvmError::no_such_method(format!(
            "{}.{}{}",
            names::to_binary(class.name()),
            name,
            descriptor
        ))
    }

    /// Resolves a field reference: the class itself, its superinterfaces,
    /// then its superclasses.
    pub fn resolve_field(
        &self,
        class: &ClassDescriptor,
        name: &str,
        descriptor: &str,
    ) -> JvmResult<Arc<FieldInfo>> {
        let mut current = Some(self.get(class.id())?);
        while let Some(c) = current {
            if let Some(field) = c.declared_field(name, descriptor) {
                return Ok(field.clone());
            }
            for &id in &c.linkage().all_interfaces {
                if let Some(field) = self.get(id)?.declared_field(name, descriptor) {
                    return Ok(field.clone());
                }
            }
            current = c.super_class().map(|id| self.get(id)).transpose()?;
        }
        Err(JvmError::no_such_field(format!(
            "{}.{} {}",
            names::to_binary(class.name()),
            name,
            descriptor
        )))
    }

    /// Selects the implementation of `resolved` for a receiver of class
    /// `receiver` (`invokevirtual`).
    pub fn select_virtual(
        &self,
        receiver: &ClassDescriptor,
        resolved: &Arc<MethodInfo>,
    ) -> Arc<MethodInfo> {
        if !resolved.is_virtual() {
            return resolved.clone();
        }
        receiver
            .virtual_method(&resolved.name, &resolved.descriptor)
            .cloned()
            .unwrap_or_else(|| resolved.clone())
    }

    /// Selects the implementation of an interface method for a receiver of
    /// class `receiver` (`invokeinterface`): its virtual table, which also
    /// carries inherited default methods.
    pub fn select_interface(
        &self,
        receiver: &ClassDescriptor,
        name: &str,
        descriptor: &str,
    ) -> Option<Arc<MethodInfo>> {
        receiver.virtual_method(name, descriptor).cloned()
    }

    /// Visits the static storage of every class in state
    /// `BeingInitialized` or later.
    pub fn visit_static_roots(&self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        let registry = self.registry.read();
        for class in registry.classes.iter().flatten() {
            class.visit_static_storage(visitor);
        }
    }
}

impl LayoutOracle for ClassLoader {
    fn instance_reference_slots(&self, class: ClassId) -> Arc<[u32]> {
        self.get(class)
            .map(|c| c.linkage().instance_reference_slots.clone())
            .unwrap_or_else(|_| Arc::from(Vec::new()))
    }

    fn static_reference_slots(&self, class: ClassId) -> Arc<[u32]> {
        self.get(class)
            .map(|c| c.linkage().static_reference_slots.clone())
            .unwrap_or_else(|_| Arc::from(Vec::new()))
    }
}

impl std::fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassLoader")
            .field("resolver", &self.resolver)
            .field("loaded", &self.loaded_count())
            .finish()
    }
}
