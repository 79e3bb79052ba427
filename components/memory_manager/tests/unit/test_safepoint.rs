//! Safepoint coordination with a shared heap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use core_types::{BasicType, ClassId, ObjectRef, Value};
use memory_manager::{CollectionTicket, Heap, NoReferences, ObjectShape, SafepointCoordinator};
use parking_lot::Mutex;

struct Shared {
    heap: Mutex<Heap>,
    roots: Mutex<Vec<ObjectRef>>,
    safepoints: SafepointCoordinator,
}

#[test]
fn test_collection_while_other_thread_polls() {
    let shared = Arc::new(Shared {
        heap: Mutex::new(Heap::new(16 * 1024)),
        roots: Mutex::new(Vec::new()),
        safepoints: SafepointCoordinator::new(),
    });
    {
        let mut heap = shared.heap.lock();
        let obj = heap
            .try_allocate(ObjectShape::Instance {
                class: ClassId(1),
                slots: 1,
            })
            .unwrap();
        heap.write_slot(obj, 0, Value::Int(77)).unwrap();
        shared.roots.lock().push(obj);
    }

    shared.safepoints.register();
    shared.safepoints.register();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let shared = shared.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut reads = 0;
            while !done.load(Ordering::Acquire) {
                shared.safepoints.poll();
                let obj = shared.roots.lock()[0];
                let value = shared.heap.lock().read_slot(obj, 0, BasicType::Int).unwrap();
                assert_eq!(value, Value::Int(77));
                reads += 1;
            }
            shared.safepoints.unregister();
            reads
        })
    };

    for _ in 0..5 {
        if shared.safepoints.begin_collection(true) == CollectionTicket::Acquired {
            let mut roots = shared.roots.lock();
            shared
                .heap
                .lock()
                .collect(&mut *roots, &NoReferences)
                .unwrap();
            drop(roots);
            shared.safepoints.end_collection();
        }
    }
    done.store(true, Ordering::Release);
    let reads = reader.join().unwrap();
    shared.safepoints.unregister();

    assert!(reads > 0);
    assert_eq!(shared.heap.lock().collection_count(), 5);
}
