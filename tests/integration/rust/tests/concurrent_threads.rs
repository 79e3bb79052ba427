//! Several Java threads sharing one VM

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use classfile::{FieldAccess, MethodAccess, Opcode};
use core_types::Value;
use integration_tests::{
    chain_class, node_class, public_class, vm_with_classes, MAIN_DESCRIPTOR, OBJECT, PUBLIC_STATIC,
};

const STATIC: FieldAccess = FieldAccess::PUBLIC.union(FieldAccess::STATIC);

fn join_all(handles: Vec<std::thread::JoinHandle<interpreter::ThreadOutcome>>) {
    for handle in handles {
        let outcome = handle.join().unwrap();
        assert!(outcome.is_completed(), "thread ended with {}", outcome);
    }
}

#[test]
fn test_slow_initializer_runs_once_for_racing_threads() {
    let mut config = public_class("demo/Config", OBJECT);
    config.add_field(STATIC, "limit", "I");
    config.add_native_method(PUBLIC_STATIC, "compute", "()I");
    config
        .add_method(PUBLIC_STATIC, "<clinit>", "()V", |c| {
            c.invokestatic("demo/Config", "compute", "()I")
                .putstatic("demo/Config", "limit", "I")
                .op(Opcode::Return);
        })
        .unwrap();

    let mut reader = public_class("demo/Reader", OBJECT);
    reader
        .add_method(PUBLIC_STATIC, "main", MAIN_DESCRIPTOR, |c| {
            c.getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
                .getstatic("demo/Config", "limit", "I")
                .invokevirtual("java/io/PrintStream", "println", "(I)V")
                .op(Opcode::Return);
        })
        .unwrap();

    let (vm, console) = vm_with_classes(&[&config, &reader], |c| c).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    vm.register_native("demo/Config", "compute", "()I", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        Ok(Some(Value::Int(64)))
    });

    let handles = (0..4)
        .map(|i| vm.spawn_thread(&format!("reader-{}", i), "demo.Reader", &[]).unwrap())
        .collect();
    join_all(handles);
    vm.destroy();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(console.stdout_text(), "64\n".repeat(4));
}

#[test]
fn test_synchronized_counter_is_exact() {
    let mut counter = public_class("demo/Counter", OBJECT);
    counter.add_field(STATIC, "count", "I");
    counter
        .add_method(
            PUBLIC_STATIC.union(MethodAccess::SYNCHRONIZED),
            "bump",
            "()V",
            |c| {
                c.getstatic("demo/Counter", "count", "I")
                    .iconst(1)
                    .op(Opcode::Iadd)
                    .putstatic("demo/Counter", "count", "I")
                    .op(Opcode::Return);
            },
        )
        .unwrap();
    counter
        .add_method(PUBLIC_STATIC, "main", MAIN_DESCRIPTOR, |c| {
            let (top, done) = (c.new_label(), c.new_label());
            c.iconst(0).istore(1);
            c.bind(top).iload(1).iconst(500).branch(Opcode::IfIcmpge, done);
            c.invokestatic("demo/Counter", "bump", "()V").iinc(1, 1).goto(top);
            c.bind(done).op(Opcode::Return);
        })
        .unwrap();
    counter
        .add_method(PUBLIC_STATIC, "read", "()I", |c| {
            c.getstatic("demo/Counter", "count", "I").op(Opcode::Ireturn);
        })
        .unwrap();

    let (vm, _) = vm_with_classes(&[&counter], |c| c.with_time_slice(7)).unwrap();
    let handles = (0..4)
        .map(|i| vm.spawn_thread(&format!("bumper-{}", i), "demo.Counter", &[]).unwrap())
        .collect();
    join_all(handles);

    let total = vm.invoke_static("demo.Counter", "read", "()I", vec![]);
    assert_eq!(total.result(), Some(Value::Int(2000)));
    assert_eq!(vm.context().thread_count(), 0);
}

#[test]
fn test_collections_while_threads_allocate() {
    let (vm, console) = vm_with_classes(&[&node_class().unwrap(), &chain_class().unwrap()], |c| {
        c.with_heap_size(128 * 1024).with_time_slice(50)
    })
    .unwrap();

    let handles = (0..3)
        .map(|i| vm.spawn_thread(&format!("builder-{}", i), "demo.Chain", &[]).unwrap())
        .collect();
    join_all(handles);

    assert!(vm.heap_stats().collections > 0);
    vm.destroy();
    assert_eq!(console.stdout_text(), "1275\n".repeat(3));
}
