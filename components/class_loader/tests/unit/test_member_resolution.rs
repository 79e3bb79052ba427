//! Method and field resolution, virtual selection

use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver};
use classfile::{ClassAccess, ClassWriter, FieldAccess, MethodAccess, Opcode};
use core_types::ErrorKind;

const OBJECT: &str = "java/lang/Object";

fn loader() -> ClassLoader {
    let mut shape = ClassWriter::new(
        "demo/Shape",
        Some(OBJECT),
        ClassAccess::PUBLIC | ClassAccess::INTERFACE,
    );
    shape.add_abstract_method(MethodAccess::PUBLIC, "area", "()I");
    shape.add_constant_field(
        FieldAccess::PUBLIC | FieldAccess::FINAL,
        "SIDES",
        "I",
        classfile::ConstantValue::Int(4),
    );

    let mut base = ClassWriter::new("demo/Base", Some(OBJECT), ClassAccess::PUBLIC);
    base.add_interface("demo/Shape");
    base.add_field(FieldAccess::PROTECTED, "width", "I");
    base.add_method(MethodAccess::PUBLIC, "area", "()I", |c| {
        c.iconst(1).op(Opcode::Ireturn);
    })
    .unwrap();
    base.add_method(MethodAccess::PUBLIC, "describe", "()I", |c| {
        c.iconst(10).op(Opcode::Ireturn);
    })
    .unwrap();

    let mut square = ClassWriter::new("demo/Square", Some("demo/Base"), ClassAccess::PUBLIC);
    square.add_method(MethodAccess::PUBLIC, "area", "()I", |c| {
        c.iconst(4).op(Opcode::Ireturn);
    })
    .unwrap();

    let resolver = InMemoryResolver::new()
        .with_class("demo/Shape", shape.to_bytes())
        .with_class("demo/Base", base.to_bytes())
        .with_class("demo/Square", square.to_bytes());
    ClassLoader::new(BootstrapResolver::new(resolver))
}

#[test]
fn test_method_found_in_superclass() {
    let loader = loader();
    let square = loader.resolve("demo/Square").unwrap();
    let base = loader.lookup("demo/Base").unwrap();
    let method = loader.resolve_method(&square, "describe", "()I").unwrap();
    assert_eq!(method.owner, base.id());
    let object_method = loader.resolve_method(&square, "hashCode", "()I").unwrap();
    assert_eq!(object_method.owner_name.as_ref(), OBJECT);
}

#[test]
fn test_missing_method_names_class_and_descriptor() {
    let loader = loader();
    let square = loader.resolve("demo/Square").unwrap();
    let err = loader.resolve_method(&square, "perimeter", "()I").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchMethod);
    assert_eq!(err.message, "demo.Square.perimeter()I");
}

#[test]
fn test_class_method_on_interface_is_incompatible() {
    let loader = loader();
    let shape = loader.resolve("demo/Shape").unwrap();
    let err = loader.resolve_method(&shape, "area", "()I").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncompatibleClassChange);
    let square = loader.resolve("demo/Square").unwrap();
    let err = loader
        .resolve_interface_method(&square, "area", "()I")
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncompatibleClassChange);
}

#[test]
fn test_interface_method_resolution() {
    let loader = loader();
    let shape = loader.resolve("demo/Shape").unwrap();
    let area = loader.resolve_interface_method(&shape, "area", "()I").unwrap();
    assert!(area.is_abstract());
    let to_string = loader
        .resolve_interface_method(&shape, "toString", "()Ljava/lang/String;")
        .unwrap();
    assert_eq!(to_string.owner_name.as_ref(), OBJECT);
}

#[test]
fn test_virtual_selection_uses_receiver() {
    let loader = loader();
    let base = loader.resolve("demo/Base").unwrap();
    let square = loader.resolve("demo/Square").unwrap();
    let resolved = loader.resolve_method(&base, "area", "()I").unwrap();
    assert_eq!(loader.select_virtual(&square, &resolved).owner, square.id());
    assert_eq!(loader.select_virtual(&base, &resolved).owner, base.id());
    let selected = loader.select_interface(&square, "area", "()I").unwrap();
    assert_eq!(selected.owner, square.id());
}

#[test]
fn test_field_resolution_order() {
    let loader = loader();
    let square = loader.resolve("demo/Square").unwrap();
    let width = loader.resolve_field(&square, "width", "I").unwrap();
    assert_eq!(width.owner, loader.lookup("demo/Base").unwrap().id());
    assert!(!width.is_static());

    let sides = loader.resolve_field(&square, "SIDES", "I").unwrap();
    assert!(sides.is_static());
    assert_eq!(sides.constant_value, Some(classfile::ConstantValue::Int(4)));

    let err = loader.resolve_field(&square, "height", "I").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoSuchField);
}
