//! Linking: hierarchy checks, field layout and virtual tables.

use std::collections::HashSet;
use std::sync::Arc;

use classfile::{ClassFile, ClassFormatError};
use core_types::{ClassId, FieldType, JvmError, JvmResult, MethodDescriptor};
use tracing::trace;

use crate::class::{ClassDescriptor, FieldInfo, Linkage, MethodInfo};
use crate::names;

/// Builds the method records of a parsed class.
pub(crate) fn build_methods(
    id: ClassId,
    owner_name: &Arc<str>,
    class_file: &ClassFile,
) -> JvmResult<Vec<Arc<MethodInfo>>> {
    let mut seen = HashSet::new();
    let mut methods = Vec::with_capacity(class_file.methods.len());
    for entry in &class_file.methods {
        if !seen.insert((entry.name.as_str(), entry.descriptor.as_str())) {
            return Err(ClassFormatError::Malformed(format!(
                "duplicate method {}{} in {}",
                entry.name, entry.descriptor, owner_name
            ))
            .into());
        }
        let signature = MethodDescriptor::parse(&entry.descriptor)?;
        methods.push(Arc::new(MethodInfo {
            owner: id,
            owner_name: owner_name.clone(),
            name: entry.name.clone(),
            descriptor: entry.descriptor.clone(),
            signature,
            access: entry.access,
            code: entry.code.clone(),
        }));
    }
    Ok(methods)
}

/// Rejects hierarchies the VM cannot link.
fn check_hierarchy(
    name: &str,
    class_file: &ClassFile,
    super_class: Option<&ClassDescriptor>,
    interfaces: &[Arc<ClassDescriptor>],
) -> JvmResult<()> {
    match (name == names::OBJECT, super_class) {
        (true, Some(_)) => {
            return Err(JvmError::linkage(format!("{} must not have a superclass", name)));
        }
        (false, None) => {
            return Err(JvmError::linkage(format!("{} has no superclass", name)));
        }
        _ => {}
    }

    if let Some(sup) = super_class {
        if sup.is_interface() {
            return Err(JvmError::linkage(format!(
                "class {} has interface {} as super class",
                name,
                sup.name()
            )));
        }
        if sup.is_final() {
            return Err(JvmError::linkage(format!(
                "class {} cannot inherit from final class {}",
                name,
                sup.name()
            )));
        }
        if class_file.is_interface() && sup.name() != names::OBJECT {
            return Err(JvmError::linkage(format!(
                "interface {} must extend java/lang/Object",
                name
            )));
        }
    }

    for iface in interfaces {
        if !iface.is_interface() {
            return Err(JvmError::linkage(format!(
                "class {} cannot implement class {} as an interface",
                name,
                iface.name()
            )));
        }
    }
    Ok(())
}

/// Computes layout and dispatch tables.
///
/// # Arguments
///
/// * `id` - Handle reserved for the class
/// * `name` - Internal name
/// * `class_file` - Parsed class file
/// * `methods` - Method records built by [`build_methods`]
/// * `super_class` - Linked superclass (`None` only for the root)
/// * `interfaces` - Linked direct superinterfaces
///
/// # Returns
///
/// The linkage and the declared fields with their slots assigned.
pub(crate) fn link_class(
    id: ClassId,
    name: &str,
    class_file: &ClassFile,
    methods: &[Arc<MethodInfo>],
    super_class: Option<&ClassDescriptor>,
    interfaces: &[Arc<ClassDescriptor>],
) -> JvmResult<(Linkage, Vec<Arc<FieldInfo>>)> {
    check_hierarchy(name, class_file, super_class, interfaces)?;

    let mut linkage = Linkage {
        super_class: super_class.map(|s| s.id()),
        interfaces: interfaces.iter().map(|i| i.id()).collect(),
        ..Linkage::default()
    };

    if let Some(sup) = super_class {
        linkage.ancestors.push(sup.id());
        linkage.ancestors.extend_from_slice(&sup.linkage().ancestors);
        linkage.all_interfaces.extend_from_slice(&sup.linkage().all_interfaces);
    }
    for iface in interfaces {
        for candidate in std::iter::once(iface.id()).chain(iface.linkage().all_interfaces.iter().copied()) {
            if !linkage.all_interfaces.contains(&candidate) {
                linkage.all_interfaces.push(candidate);
            }
        }
    }

    // Fields: inherited instance slots come first.
    let mut instance_slot = super_class.map(|s| s.instance_slots()).unwrap_or(0);
    let mut instance_refs: Vec<u32> = super_class
        .map(|s| s.linkage().instance_reference_slots.to_vec())
        .unwrap_or_default();
    let mut static_slot = 0u32;
    let mut static_refs = Vec::new();
    let mut fields = Vec::with_capacity(class_file.fields.len());
    let mut seen = HashSet::new();
    for entry in &class_file.fields {
        if !seen.insert((entry.name.as_str(), entry.descriptor.as_str())) {
            return Err(ClassFormatError::Malformed(format!(
                "duplicate field {} {} in {}",
                entry.name, entry.descriptor, name
            ))
            .into());
        }
        let field_type = FieldType::parse(&entry.descriptor)?;
        let is_static = entry.access.contains(classfile::FieldAccess::STATIC);
        let slot = if is_static {
            if field_type.is_reference() {
                static_refs.push(static_slot);
            }
            static_slot += 1;
            static_slot - 1
        } else {
            if field_type.is_reference() {
                instance_refs.push(instance_slot);
            }
            instance_slot += 1;
            instance_slot - 1
        };
        fields.push(Arc::new(FieldInfo {
            owner: id,
            name: entry.name.clone(),
            descriptor: entry.descriptor.clone(),
            field_type,
            access: entry.access,
            slot,
            constant_value: entry.constant_value.clone(),
        }));
    }
    linkage.instance_slots = instance_slot;
    linkage.static_slots = static_slot;
    linkage.instance_reference_slots = Arc::from(instance_refs);
    linkage.static_reference_slots = Arc::from(static_refs);

    // Virtual table: overlay the superclass table, override by (name, descriptor).
    if let Some(sup) = super_class {
        if !class_file.is_interface() {
            linkage.vtable = sup.linkage().vtable.clone();
            linkage.vtable_index = sup.linkage().vtable_index.clone();
        }
    }
    for method in methods.iter().filter(|m| m.is_virtual()) {
        let key = (method.name.clone(), method.descriptor.clone());
        match linkage.vtable_index.get(&key).copied() {
            Some(index) => {
                let overridden = &linkage.vtable[index];
                if overridden.is_final() {
                    return Err(JvmError::linkage(format!(
                        "{} overrides final method {}",
                        name,
                        overridden.qualified_name()
                    )));
                }
                linkage.vtable[index] = method.clone();
            }
            None => {
                linkage.vtable_index.insert(key, linkage.vtable.len());
                linkage.vtable.push(method.clone());
            }
        }
    }

    Ok((linkage, fields))
}

/// Appends default methods of `interfaces` not already in the table.
pub(crate) fn append_default_methods(linkage: &mut Linkage, interfaces: &[Arc<ClassDescriptor>]) {
    for iface in interfaces {
        for method in iface.methods() {
            if !method.is_virtual() || method.is_abstract() {
                continue;
            }
            let key = (method.name.clone(), method.descriptor.clone());
            if !linkage.vtable_index.contains_key(&key) {
                trace!(method = %method.qualified_name(), "inheriting default method");
                linkage.vtable_index.insert(key, linkage.vtable.len());
                linkage.vtable.push(method.clone());
            }
        }
    }
}
