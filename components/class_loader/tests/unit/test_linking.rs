//! Hierarchy checks, layout and dispatch tables

use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver};
use classfile::{ClassAccess, ClassWriter, FieldAccess, MethodAccess, Opcode};
use core_types::ErrorKind;

const OBJECT: &str = "java/lang/Object";

fn public_class(name: &str, super_name: &str) -> ClassWriter {
    ClassWriter::new(name, Some(super_name), ClassAccess::PUBLIC | ClassAccess::SUPER)
}

fn interface(name: &str) -> ClassWriter {
    ClassWriter::new(name, Some(OBJECT), ClassAccess::PUBLIC | ClassAccess::INTERFACE)
}

fn loader_with(classes: Vec<(&str, ClassWriter)>) -> ClassLoader {
    let resolver = InMemoryResolver::new();
    for (name, writer) in classes {
        resolver.insert(name, writer.to_bytes());
    }
    ClassLoader::new(BootstrapResolver::new(resolver))
}

fn returns_int(w: &mut ClassWriter, access: MethodAccess, name: &str, value: i32) {
    w.add_method(access, name, "()I", |c| {
        c.iconst(value).op(Opcode::Ireturn);
    })
    .unwrap();
}

#[test]
fn test_final_superclass_is_rejected() {
    let base = ClassWriter::new("demo/Base", Some(OBJECT), ClassAccess::PUBLIC | ClassAccess::FINAL);
    let loader = loader_with(vec![
        ("demo/Base", base),
        ("demo/Sub", public_class("demo/Sub", "demo/Base")),
    ]);
    let err = loader.resolve("demo/Sub").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Linkage);
    assert!(loader.resolve("demo/Base").is_ok());
}

#[test]
fn test_interface_as_superclass_is_rejected() {
    let loader = loader_with(vec![
        ("demo/I", interface("demo/I")),
        ("demo/C", public_class("demo/C", "demo/I")),
    ]);
    assert_eq!(loader.resolve("demo/C").unwrap_err().kind, ErrorKind::Linkage);
}

#[test]
fn test_class_as_interface_is_rejected() {
    let mut c = public_class("demo/C", OBJECT);
    c.add_interface("demo/Plain");
    let loader = loader_with(vec![
        ("demo/Plain", public_class("demo/Plain", OBJECT)),
        ("demo/C", c),
    ]);
    assert_eq!(loader.resolve("demo/C").unwrap_err().kind, ErrorKind::Linkage);
}

#[test]
fn test_overriding_final_method_is_rejected() {
    let mut base = public_class("demo/Base", OBJECT);
    returns_int(&mut base, MethodAccess::PUBLIC | MethodAccess::FINAL, "id", 1);
    let mut sub = public_class("demo/Sub", "demo/Base");
    returns_int(&mut sub, MethodAccess::PUBLIC, "id", 2);
    let loader = loader_with(vec![("demo/Base", base), ("demo/Sub", sub)]);
    assert_eq!(loader.resolve("demo/Sub").unwrap_err().kind, ErrorKind::Linkage);
}

#[test]
fn test_duplicate_method_is_class_format() {
    let mut c = public_class("demo/C", OBJECT);
    returns_int(&mut c, MethodAccess::PUBLIC, "id", 1);
    returns_int(&mut c, MethodAccess::PUBLIC, "id", 2);
    let loader = loader_with(vec![("demo/C", c)]);
    assert_eq!(loader.resolve("demo/C").unwrap_err().kind, ErrorKind::ClassFormat);
}

#[test]
fn test_instance_slots_extend_superclass() {
    let mut base = public_class("demo/Base", OBJECT);
    base.add_field(FieldAccess::PRIVATE, "count", "I")
        .add_field(FieldAccess::PRIVATE, "name", "Ljava/lang/String;");
    let mut sub = public_class("demo/Sub", "demo/Base");
    sub.add_field(FieldAccess::PRIVATE, "total", "J")
        .add_field(FieldAccess::PRIVATE, "next", "Ldemo/Sub;")
        .add_field(FieldAccess::STATIC, "instances", "I")
        .add_field(FieldAccess::STATIC, "last", "Ldemo/Sub;");
    let loader = loader_with(vec![("demo/Base", base), ("demo/Sub", sub)]);

    let sub = loader.resolve("demo/Sub").unwrap();
    assert_eq!(sub.instance_slots(), 4);
    assert_eq!(sub.static_slots(), 2);
    assert_eq!(&*sub.linkage().instance_reference_slots, &[1, 3]);
    assert_eq!(&*sub.linkage().static_reference_slots, &[1]);
    assert_eq!(sub.declared_field("total", "J").unwrap().slot, 2);
    assert_eq!(sub.declared_field("last", "Ldemo/Sub;").unwrap().slot, 1);
}

#[test]
fn test_vtable_overrides_in_place() {
    let mut base = public_class("demo/Base", OBJECT);
    returns_int(&mut base, MethodAccess::PUBLIC, "id", 1);
    returns_int(&mut base, MethodAccess::PUBLIC, "size", 10);
    let mut sub = public_class("demo/Sub", "demo/Base");
    returns_int(&mut sub, MethodAccess::PUBLIC, "id", 2);
    let loader = loader_with(vec![("demo/Base", base), ("demo/Sub", sub)]);

    let base = loader.resolve("demo/Base").unwrap();
    let sub = loader.resolve("demo/Sub").unwrap();
    assert_eq!(base.linkage().vtable.len(), sub.linkage().vtable.len());
    assert_eq!(
        base.linkage().vtable_index[&("id".to_string(), "()I".to_string())],
        sub.linkage().vtable_index[&("id".to_string(), "()I".to_string())]
    );
    assert_eq!(sub.virtual_method("id", "()I").unwrap().owner, sub.id());
    assert_eq!(sub.virtual_method("size", "()I").unwrap().owner, base.id());
    assert!(sub.virtual_method("hashCode", "()I").is_some());
}

#[test]
fn test_private_and_static_methods_skip_the_vtable() {
    let mut c = public_class("demo/C", OBJECT);
    returns_int(&mut c, MethodAccess::PRIVATE, "secret", 1);
    returns_int(&mut c, MethodAccess::PUBLIC | MethodAccess::STATIC, "util", 2);
    let loader = loader_with(vec![("demo/C", c)]);
    let c = loader.resolve("demo/C").unwrap();
    assert!(c.virtual_method("secret", "()I").is_none());
    assert!(c.virtual_method("util", "()I").is_none());
    assert!(c.declared_method("secret", "()I").is_some());
}

#[test]
fn test_default_methods_are_inherited() {
    let mut greeter = interface("demo/Greeter");
    returns_int(&mut greeter, MethodAccess::PUBLIC, "greet", 7);
    greeter.add_abstract_method(MethodAccess::PUBLIC, "name", "()I");
    let mut c = public_class("demo/C", OBJECT);
    c.add_interface("demo/Greeter");
    returns_int(&mut c, MethodAccess::PUBLIC, "name", 3);
    let loader = loader_with(vec![("demo/Greeter", greeter), ("demo/C", c)]);

    let c = loader.resolve("demo/C").unwrap();
    let iface = loader.lookup("demo/Greeter").unwrap();
    assert_eq!(c.virtual_method("greet", "()I").unwrap().owner, iface.id());
    assert_eq!(c.virtual_method("name", "()I").unwrap().owner, c.id());
    assert_eq!(
        loader.select_interface(&c, "greet", "()I").unwrap().owner,
        iface.id()
    );
}

#[test]
fn test_transitive_interfaces() {
    let mut child = interface("demo/Child");
    child.add_interface("demo/Parent");
    let mut c = public_class("demo/C", OBJECT);
    c.add_interface("demo/Child");
    let loader = loader_with(vec![
        ("demo/Parent", interface("demo/Parent")),
        ("demo/Child", child),
        ("demo/C", c),
        ("demo/D", public_class("demo/D", "demo/C")),
    ]);
    let d = loader.resolve("demo/D").unwrap();
    let parent = loader.lookup("demo/Parent").unwrap();
    let child = loader.lookup("demo/Child").unwrap();
    assert!(d.linkage().all_interfaces.contains(&parent.id()));
    assert!(d.linkage().all_interfaces.contains(&child.id()));
    assert!(loader.is_assignable(d.id(), parent.id()).unwrap());
}

#[test]
fn test_assignability_rules() {
    let loader = loader_with(vec![
        ("demo/A", public_class("demo/A", OBJECT)),
        ("demo/B", public_class("demo/B", "demo/A")),
    ]);
    let a = loader.resolve("demo/A").unwrap().id();
    let b = loader.resolve("demo/B").unwrap().id();
    let object = loader.lookup(OBJECT).unwrap().id();
    let cloneable = loader.resolve("java/lang/Cloneable").unwrap().id();
    let ints = loader.resolve("[I").unwrap().id();
    let longs = loader.resolve("[J").unwrap().id();
    let b_array = loader.resolve("[Ldemo/B;").unwrap().id();
    let a_array = loader.resolve("[Ldemo/A;").unwrap().id();
    let objects = loader.resolve("[Ljava/lang/Object;").unwrap().id();

    assert!(loader.is_assignable(b, a).unwrap());
    assert!(!loader.is_assignable(a, b).unwrap());
    assert!(loader.is_assignable(a, object).unwrap());
    assert!(loader.is_assignable(ints, object).unwrap());
    assert!(loader.is_assignable(ints, cloneable).unwrap());
    assert!(!loader.is_assignable(ints, longs).unwrap());
    assert!(loader.is_assignable(b_array, a_array).unwrap());
    assert!(!loader.is_assignable(a_array, b_array).unwrap());
    assert!(loader.is_assignable(b_array, objects).unwrap());
    assert!(!loader.is_assignable(ints, objects).unwrap());
    assert!(!loader.is_assignable(object, ints).unwrap());
}

#[test]
fn test_array_classes_share_object_dispatch() {
    let loader = loader_with(vec![]);
    let ints = loader.resolve("[I").unwrap();
    let object = loader.lookup(OBJECT).unwrap();
    assert_eq!(
        ints.virtual_method("hashCode", "()I").unwrap().owner,
        object.id()
    );
    assert!(ints.is_final());
}
