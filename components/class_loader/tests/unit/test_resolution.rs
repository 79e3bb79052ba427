//! Name resolution, caching and failure behaviour

use std::sync::Arc;

use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver};
use classfile::{ClassAccess, ClassWriter};
use core_types::{ClassState, ErrorKind};

fn class(name: &str, super_name: &str) -> Vec<u8> {
    ClassWriter::new(name, Some(super_name), ClassAccess::PUBLIC | ClassAccess::SUPER).to_bytes()
}

fn loader_with(classes: &[(&str, Vec<u8>)]) -> ClassLoader {
    let resolver = InMemoryResolver::new();
    for (name, bytes) in classes {
        resolver.insert(*name, bytes.clone());
    }
    ClassLoader::new(BootstrapResolver::new(resolver))
}

#[test]
fn test_resolve_is_idempotent() {
    let loader = loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]);
    let first = loader.resolve("demo/C").unwrap();
    let second = loader.resolve("demo/C").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.id(), second.id());
}

#[test]
fn test_object_has_no_superclass() {
    let loader = loader_with(&[]);
    let object = loader.resolve("java/lang/Object").unwrap();
    assert!(object.super_class().is_none());
    assert!(object.linkage().ancestors.is_empty());
}

#[test]
fn test_class_extending_object() {
    let loader = loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]);
    let c = loader.resolve("demo/C").unwrap();
    let object = loader.lookup("java/lang/Object").unwrap();
    assert_eq!(c.super_class(), Some(object.id()));
    assert_eq!(
        c.state_history(),
        vec![ClassState::Allocated, ClassState::Loaded, ClassState::Linked]
    );
    assert!(ClassState::is_valid_sequence(&c.state_history()));
}

#[test]
fn test_missing_class_fails_every_time() {
    let loader = loader_with(&[]);
    for _ in 0..3 {
        let err = loader.resolve("demo/Missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "demo.Missing");
    }
    assert!(loader.lookup("demo/Missing").is_none());
}

#[test]
fn test_failed_loads_do_not_grow_the_arena() {
    let failing = loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]);
    for _ in 0..5 {
        assert!(failing.resolve("demo/Missing").is_err());
    }
    let fresh = loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]);
    assert_eq!(
        failing.resolve("demo/C").unwrap().id(),
        fresh.resolve("demo/C").unwrap().id()
    );
    assert_eq!(failing.classes().len(), fresh.classes().len());
}

#[test]
fn test_missing_superclass_is_linkage() {
    let loader = loader_with(&[("demo/Child", class("demo/Child", "demo/Gone"))]);
    let err = loader.resolve("demo/Child").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Linkage);
    assert_eq!(err.message, "demo.Child: superclass demo.Gone not found");
    assert!(loader.lookup("demo/Child").is_none());
}

#[test]
fn test_missing_superinterface_is_linkage() {
    let mut child = ClassWriter::new(
        "demo/Child",
        Some("java/lang/Object"),
        ClassAccess::PUBLIC | ClassAccess::SUPER,
    );
    child.add_interface("demo/Absent");
    let loader = loader_with(&[("demo/Child", child.to_bytes())]);
    let err = loader.resolve("demo/Child").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Linkage);
    assert_eq!(err.message, "demo.Child: superinterface demo.Absent not found");
}

#[test]
fn test_missing_grandparent_fails_linking_of_both() {
    let loader = loader_with(&[
        ("demo/Child", class("demo/Child", "demo/Parent")),
        ("demo/Parent", class("demo/Parent", "demo/Gone")),
    ]);
    let err = loader.resolve("demo/Child").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Linkage);
    assert!(err.message.starts_with("demo.Parent:"));
    assert!(loader.lookup("demo/Parent").is_none());
}

#[test]
fn test_interface_cycle_is_a_linkage_failure() {
    let interface = |name: &str, extends: &str| {
        let mut w = ClassWriter::new(
            name,
            Some("java/lang/Object"),
            ClassAccess::PUBLIC | ClassAccess::INTERFACE,
        );
        w.add_interface(extends);
        w.to_bytes()
    };
    let loader = loader_with(&[
        ("demo/I", interface("demo/I", "demo/J")),
        ("demo/J", interface("demo/J", "demo/I")),
    ]);
    let err = loader.resolve("demo/I").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClassCircularity);
    assert!(err.kind.is_linkage());
    assert!(loader.lookup("demo/I").is_none());
    assert!(loader.lookup("demo/J").is_none());
}

#[test]
fn test_malformed_bytes_are_class_format() {
    let loader = loader_with(&[("demo/Bad", vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0])]);
    let err = loader.resolve("demo/Bad").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClassFormat);
}

#[test]
fn test_failed_load_is_not_cached() {
    let resolver = Arc::new(InMemoryResolver::new());
    resolver.insert("demo/Late", vec![1, 2, 3]);
    let loader = ClassLoader::new(BootstrapResolver::new(resolver.clone()));
    assert_eq!(loader.resolve("demo/Late").unwrap_err().kind, ErrorKind::ClassFormat);

    resolver.insert("demo/Late", class("demo/Late", "java/lang/Object"));
    assert!(loader.resolve("demo/Late").is_ok());
}

#[test]
fn test_wrong_name_is_class_format() {
    let loader = loader_with(&[("demo/A", class("demo/B", "java/lang/Object"))]);
    let err = loader.resolve("demo/A").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClassFormat);
    assert!(err.message.contains("wrong name"));
}

#[test]
fn test_self_superclass_is_circular() {
    let loader = loader_with(&[("demo/Loop", class("demo/Loop", "demo/Loop"))]);
    let err = loader.resolve("demo/Loop").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClassCircularity);
}

#[test]
fn test_mutual_superclasses_are_circular() {
    let loader = loader_with(&[
        ("demo/A", class("demo/A", "demo/B")),
        ("demo/B", class("demo/B", "demo/A")),
    ]);
    let err = loader.resolve("demo/A").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClassCircularity);
    assert_eq!(err.message, "demo.A");
    assert!(loader.lookup("demo/A").is_none());
    assert!(loader.lookup("demo/B").is_none());
}

#[test]
fn test_get_by_id_and_classes_snapshot() {
    let loader = loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]);
    let c = loader.resolve("demo/C").unwrap();
    assert!(Arc::ptr_eq(&loader.get(c.id()).unwrap(), &c));
    assert_eq!(loader.classes().len(), loader.loaded_count());
    assert!(loader.classes().iter().any(|k| k.name() == "demo/C"));
}

#[test]
fn test_primitive_array_class() {
    let loader = loader_with(&[]);
    let ints = loader.resolve("[I").unwrap();
    assert!(ints.is_array());
    assert!(ints.is_initialized());
    assert_eq!(ints.state_history(), ClassState::CANONICAL.to_vec());
    assert_eq!(ints.element_type(), Some(core_types::BasicType::Int));
    let object = loader.lookup("java/lang/Object").unwrap();
    assert_eq!(ints.super_class(), Some(object.id()));
}

#[test]
fn test_reference_array_dimensions() {
    let loader = loader_with(&[]);
    let nested = loader.resolve("[[Ljava/lang/String;").unwrap();
    let array = nested.as_array().unwrap();
    assert_eq!(array.dimensions, 2);
    let inner = loader.lookup("[Ljava/lang/String;").unwrap();
    assert_eq!(array.component, class_loader::ArrayComponent::Reference(inner.id()));
}

#[test]
fn test_array_of_missing_class_fails() {
    let loader = loader_with(&[]);
    assert_eq!(
        loader.resolve("[Ldemo/Nope;").unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(loader.resolve("[Q").unwrap_err().kind, ErrorKind::NotFound);
}

#[test]
fn test_array_class_helpers() {
    let loader = loader_with(&[]);
    let string = loader.resolve("java/lang/String").unwrap();
    let strings = loader.array_class_of(&string).unwrap();
    assert_eq!(strings.name(), "[Ljava/lang/String;");
    let nested = loader.array_class_of(&strings).unwrap();
    assert_eq!(nested.name(), "[[Ljava/lang/String;");
    let chars = loader
        .primitive_array_class(core_types::BasicType::Char)
        .unwrap();
    assert_eq!(chars.name(), "[C");
}

#[test]
fn test_concurrent_resolution_publishes_one_descriptor() {
    let loader = Arc::new(loader_with(&[("demo/C", class("demo/C", "java/lang/Object"))]));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let loader = loader.clone();
            std::thread::spawn(move || loader.resolve("demo/C").unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for class in &results[1..] {
        assert!(Arc::ptr_eq(class, &results[0]));
    }
}
