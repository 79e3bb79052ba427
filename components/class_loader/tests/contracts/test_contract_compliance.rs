//! Contract compliance tests for class_loader
//!
//! These tests pin the loader surface the interpreter depends on.

use std::sync::Arc;

use class_loader::{
    BootstrapResolver, ClassDescriptor, ClassLoader, Classpath, ClasspathResolver,
    DirectoryResolver, InMemoryResolver, InitAction, JarResolver,
};
use core_types::{ClassState, JvmResult};
use memory_manager::LayoutOracle;

fn bootstrap_loader() -> ClassLoader {
    ClassLoader::new(BootstrapResolver::new(InMemoryResolver::new()))
}

#[cfg(test)]
mod loader_contract_tests {
    use super::*;

    /// Contract: resolve(name) -> JvmResult<Arc<ClassDescriptor>>
    #[test]
    fn test_resolve_signature() {
        let loader = bootstrap_loader();
        let result: JvmResult<Arc<ClassDescriptor>> = loader.resolve("java/lang/String");
        assert!(result.is_ok());
    }

    /// Contract: every runtime class the interpreter names is available
    #[test]
    fn test_runtime_classes_available() {
        let loader = bootstrap_loader();
        for name in [
            class_loader::names::OBJECT,
            class_loader::names::STRING,
            class_loader::names::STRING_BUILDER,
            class_loader::names::SYSTEM,
            class_loader::names::PRINT_STREAM,
            class_loader::names::THROWABLE,
            class_loader::names::NULL_POINTER_EXCEPTION,
            class_loader::names::ARITHMETIC_EXCEPTION,
            class_loader::names::ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
            class_loader::names::NEGATIVE_ARRAY_SIZE_EXCEPTION,
            class_loader::names::CLASS_CAST_EXCEPTION,
            class_loader::names::ARRAY_STORE_EXCEPTION,
            class_loader::names::ILLEGAL_MONITOR_STATE_EXCEPTION,
            class_loader::names::CLONE_NOT_SUPPORTED_EXCEPTION,
            class_loader::names::EXCEPTION_IN_INITIALIZER_ERROR,
            class_loader::names::NO_CLASS_DEF_FOUND_ERROR,
            class_loader::names::STACK_OVERFLOW_ERROR,
            class_loader::names::OUT_OF_MEMORY_ERROR,
            "java/lang/NoSuchMethodError",
            "java/lang/AbstractMethodError",
        ] {
            let class = loader.resolve(name).unwrap();
            assert!(class.state() >= ClassState::Linked, "{}", name);
        }
    }

    /// Contract: the loader is shareable across threads
    #[test]
    fn test_loader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClassLoader>();
        assert_send_sync::<ClassDescriptor>();
    }

    /// Contract: the loader answers layout queries for the collector
    #[test]
    fn test_layout_oracle() {
        let loader = bootstrap_loader();
        let string = loader.resolve("java/lang/String").unwrap();
        let oracle: &dyn LayoutOracle = &loader;
        assert_eq!(&*oracle.instance_reference_slots(string.id()), &[0]);
        assert!(oracle.static_reference_slots(string.id()).is_empty());
    }

    /// Contract: initialization is driven through InitAction
    #[test]
    fn test_init_action_variants() {
        let loader = bootstrap_loader();
        let object = loader.resolve("java/lang/Object").unwrap();
        let thread = core_types::JavaThreadId(1);
        assert_eq!(object.begin_initialization(thread).unwrap(), InitAction::Proceed);
        object.complete_initialization().unwrap();
        assert_eq!(object.begin_initialization(thread).unwrap(), InitAction::Ready);
    }

    /// Contract: static storage handles are visited as roots
    #[test]
    fn test_static_roots_visited() {
        let loader = bootstrap_loader();
        let system = loader.resolve("java/lang/System").unwrap();
        let storage = core_types::ObjectRef::from_offset(64).unwrap();
        system.set_static_storage(storage);
        let moved = core_types::ObjectRef::from_offset(128).unwrap();
        let mut seen = 0;
        loader.visit_static_roots(&mut |r| {
            seen += 1;
            assert_eq!(*r, storage);
            *r = moved;
        });
        assert_eq!(seen, 1);
        assert_eq!(system.static_storage(), Some(moved));
    }
}

#[cfg(test)]
mod resolver_contract_tests {
    use super::*;

    fn assert_resolver<R: ClasspathResolver + 'static>(_: &R) {}

    /// Contract: every resolver kind implements ClasspathResolver
    #[test]
    fn test_resolver_kinds() {
        assert_resolver(&DirectoryResolver::new("."));
        assert_resolver(&JarResolver::new("missing.jar"));
        assert_resolver(&InMemoryResolver::new());
        assert_resolver(&Classpath::new());
        assert_resolver(&BootstrapResolver::new(Classpath::new()));
    }

    /// Contract: find_class returns Ok(None) when a class is absent
    #[test]
    fn test_absent_class_is_none() {
        let cp = Classpath::parse(".");
        assert_eq!(cp.find_class("no/such/Thing").unwrap(), None);
    }
}
