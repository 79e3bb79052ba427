//! Allocation tests: shapes, headers and automatic collection.

use core_types::{BasicType, ClassId, ObjectRef, Value};
use memory_manager::{Heap, HeapError, NoReferences, ObjectKind, ObjectShape, HEADER_SIZE};

#[test]
fn test_header_describes_instance() {
    let mut heap = Heap::new(8 * 1024);
    let obj = heap
        .try_allocate(ObjectShape::Instance {
            class: ClassId(12),
            slots: 4,
        })
        .unwrap();
    let header = heap.header(obj).unwrap();
    assert_eq!(header.class, ClassId(12));
    assert_eq!(header.kind, ObjectKind::Instance);
    assert_eq!(header.length, 4);
    assert_eq!(header.element, None);
    assert_eq!(header.size as usize, HEADER_SIZE + 32);
}

#[test]
fn test_header_describes_array() {
    let mut heap = Heap::new(8 * 1024);
    let arr = heap
        .try_allocate(ObjectShape::Array {
            class: ClassId(3),
            element: BasicType::Long,
            length: 5,
        })
        .unwrap();
    assert_eq!(heap.array_length(arr).unwrap(), 5);
    assert_eq!(heap.array_element_type(arr).unwrap(), BasicType::Long);
    assert_eq!(heap.array_load(arr, 4).unwrap(), Value::Long(0));
}

#[test]
fn test_slot_operations_reject_arrays() {
    let mut heap = Heap::new(8 * 1024);
    let arr = heap
        .try_allocate(ObjectShape::Array {
            class: ClassId(3),
            element: BasicType::Int,
            length: 1,
        })
        .unwrap();
    assert!(matches!(
        heap.read_slot(arr, 0, BasicType::Int),
        Err(HeapError::WrongKind { .. })
    ));
}

#[test]
fn test_wide_values_round_trip_through_slots() {
    let mut heap = Heap::new(8 * 1024);
    let obj = heap
        .try_allocate(ObjectShape::Instance {
            class: ClassId(1),
            slots: 3,
        })
        .unwrap();
    heap.write_slot(obj, 0, Value::Long(i64::MIN)).unwrap();
    heap.write_slot(obj, 1, Value::Double(-0.5)).unwrap();
    heap.write_slot(obj, 2, Value::Float(f32::MAX)).unwrap();
    assert_eq!(heap.read_slot(obj, 0, BasicType::Long).unwrap(), Value::Long(i64::MIN));
    assert_eq!(heap.read_slot(obj, 1, BasicType::Double).unwrap(), Value::Double(-0.5));
    assert_eq!(heap.read_slot(obj, 2, BasicType::Float).unwrap(), Value::Float(f32::MAX));
}

#[test]
fn test_allocate_collects_when_exhausted() {
    let mut heap = Heap::new(8 * 1024);
    let shape = ObjectShape::Instance {
        class: ClassId(1),
        slots: 6,
    };
    let mut roots: Vec<ObjectRef> = Vec::new();
    for i in 0..1_000 {
        let obj = heap.allocate(shape, &mut roots, &NoReferences).unwrap();
        heap.write_slot(obj, 0, Value::Int(i)).unwrap();
        if i % 100 == 0 {
            roots.push(obj);
        }
    }
    assert!(heap.collection_count() > 0);
    for (n, obj) in roots.iter().enumerate() {
        assert_eq!(
            heap.read_slot(*obj, 0, BasicType::Int).unwrap(),
            Value::Int(n as i32 * 100)
        );
    }
}

#[test]
fn test_out_of_memory_when_everything_is_live() {
    let mut heap = Heap::new(8 * 1024);
    let shape = ObjectShape::Array {
        class: ClassId(2),
        element: BasicType::Byte,
        length: 1000,
    };
    let mut roots: Vec<ObjectRef> = Vec::new();
    let err = loop {
        match heap.allocate(shape, &mut roots, &NoReferences) {
            Ok(obj) => roots.push(obj),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, HeapError::OutOfMemory { .. }));
    assert!(err.is_exhaustion());
    assert_eq!(roots.len(), 7);
}
