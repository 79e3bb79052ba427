//! Initialization state machine

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use class_loader::{BootstrapResolver, ClassLoader, InMemoryResolver, InitAction};
use classfile::{ClassAccess, ClassWriter};
use core_types::{ClassState, ErrorKind, JavaThreadId};

const MAIN: JavaThreadId = JavaThreadId(1);
const OTHER: JavaThreadId = JavaThreadId(2);

fn loader() -> ClassLoader {
    let c = ClassWriter::new("demo/C", Some("java/lang/Object"), ClassAccess::PUBLIC);
    let d = ClassWriter::new("demo/D", Some("demo/C"), ClassAccess::PUBLIC);
    let resolver = InMemoryResolver::new()
        .with_class("demo/C", c.to_bytes())
        .with_class("demo/D", d.to_bytes());
    ClassLoader::new(BootstrapResolver::new(resolver))
}

#[test]
fn test_successful_initialization_history() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    assert!(!c.is_initialized());
    assert_eq!(c.begin_initialization(MAIN).unwrap(), InitAction::Proceed);
    assert_eq!(c.state(), ClassState::BeingInitialized);
    assert_eq!(c.initializing_thread(), Some(MAIN));
    c.complete_initialization().unwrap();

    assert!(c.is_initialized());
    assert_eq!(c.state_history(), ClassState::CANONICAL.to_vec());
    assert_eq!(c.begin_initialization(OTHER).unwrap(), InitAction::Ready);
    assert_eq!(c.initializing_thread(), None);
}

#[test]
fn test_reentrant_request_from_initializer() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    assert_eq!(c.begin_initialization(MAIN).unwrap(), InitAction::Proceed);
    assert_eq!(c.begin_initialization(MAIN).unwrap(), InitAction::Ready);
    assert_eq!(c.begin_initialization(OTHER).unwrap(), InitAction::Wait);
}

#[test]
fn test_failure_is_sticky() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    assert_eq!(c.begin_initialization(MAIN).unwrap(), InitAction::Proceed);
    c.fail_initialization("boom").unwrap();

    let history = c.state_history();
    assert_eq!(history.last(), Some(&ClassState::InitializationError));
    assert!(ClassState::is_valid_sequence(&history));

    for thread in [MAIN, OTHER] {
        let err = c.begin_initialization(thread).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Initialization);
        assert_eq!(err.message, "Could not initialize class demo.C");
    }
    assert_eq!(loader.resolve("demo/C").unwrap_err().kind, ErrorKind::Initialization);
}

#[test]
fn test_subclass_of_failed_class_still_links() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    c.begin_initialization(MAIN).unwrap();
    c.fail_initialization("boom").unwrap();
    let d = loader.resolve("demo/D").unwrap();
    assert_eq!(d.super_class(), Some(c.id()));
}

#[test]
fn test_terminal_states_reject_transitions() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    c.begin_initialization(MAIN).unwrap();
    c.complete_initialization().unwrap();
    assert_eq!(c.complete_initialization().unwrap_err().kind, ErrorKind::Internal);
    assert_eq!(c.fail_initialization("late").unwrap_err().kind, ErrorKind::Internal);
    assert_eq!(c.state(), ClassState::FullyInitialized);
}

#[test]
fn test_waiter_observes_completion() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    assert_eq!(c.begin_initialization(MAIN).unwrap(), InitAction::Proceed);

    let waiting = Arc::clone(&c);
    let waiter = thread::spawn(move || {
        match waiting.begin_initialization(OTHER)? {
            InitAction::Wait => waiting.wait_for_initialization(OTHER),
            action => Ok(action),
        }
    });
    thread::sleep(Duration::from_millis(20));
    c.complete_initialization().unwrap();
    assert_eq!(waiter.join().unwrap().unwrap(), InitAction::Ready);
}

#[test]
fn test_waiter_observes_failure() {
    let loader = loader();
    let c = loader.resolve("demo/C").unwrap();
    c.begin_initialization(MAIN).unwrap();

    let waiting = Arc::clone(&c);
    let waiter = thread::spawn(move || waiting.wait_for_initialization(OTHER));
    thread::sleep(Duration::from_millis(20));
    c.fail_initialization("boom").unwrap();
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Initialization);
}

#[test]
fn test_array_classes_need_no_initializer() {
    let loader = loader();
    let array = loader.resolve("[Ldemo/C;").unwrap();
    assert!(array.is_initialized());
    assert_eq!(array.begin_initialization(MAIN).unwrap(), InitAction::Ready);
}
