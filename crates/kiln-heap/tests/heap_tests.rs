//! Allocator and object model tests

use std::cell::RefCell;

use kiln_heap::{Heap, HeapConfig, MapFlags, MapKind, ScopeGuard, Space, Value};

const MB: usize = 1024 * 1024;

#[test]
fn small_then_huge_allocation_maps_fitting_page() {
    let mut space = Space::new("young", MB, 1024);
    space.allocate(123).expect("small allocation should succeed");
    let huge = space
        .allocate(10 * MB)
        .expect("huge allocation should succeed");
    assert!(space.contains(huge.as_ptr() as usize));
    assert!(space.contains(huge.as_ptr() as usize + 10 * MB - 1));
    assert_eq!(space.page_count(), 2);
}

#[test]
fn huge_allocations_do_not_overlap() {
    let mut space = Space::new("young", MB, 1024);
    space.allocate(123).expect("small allocation should succeed");
    let a = space.allocate(10 * MB).expect("allocation should succeed");
    let b = space
        .allocate(10 * MB + 500 * 1024)
        .expect("allocation should succeed");
    let (a, b) = (a.as_ptr() as usize, b.as_ptr() as usize);
    assert!(a + 10 * MB <= b || b + 10 * MB + 500 * 1024 <= a);
    assert_eq!(space.page_count(), 3);
}

#[test]
fn exhausted_page_is_left_for_one_with_room() {
    let mut space = Space::new("young", 64 * 1024, 1024);
    // Fill most of the first page, then force a second one.
    space.allocate(60 * 1024).expect("allocation should succeed");
    space.allocate(8 * 1024).expect("allocation should succeed");
    assert_eq!(space.page_count(), 2);
    let small = space.allocate(1024).expect("allocation should succeed");
    assert!(space.contains(small.as_ptr() as usize));
    assert_eq!(space.page_count(), 2);
}

#[test]
fn heap_config_controls_page_size() {
    let config = HeapConfig {
        page_size: 64 * 1024,
        ..HeapConfig::default()
    };
    let mut heap = Heap::with_config(config).expect("heap creation should succeed");
    for _ in 0..10_000 {
        heap.new_object().expect("object allocation should succeed");
    }
    assert!(heap.young().page_count() > 1);
}

#[test]
fn transition_tree_is_shared_across_objects() {
    let mut heap = Heap::new().expect("heap creation should succeed");
    let keys: Vec<Value> = ["a", "b", "c"]
        .iter()
        .map(|k| heap.string(k).expect("string should intern"))
        .collect();

    let objects: Vec<Value> = (0..3)
        .map(|_| heap.new_object().expect("object allocation should succeed"))
        .collect();
    for obj in &objects {
        for (i, key) in keys.iter().enumerate() {
            heap.set_property(*obj, *key, Value::smi(i as i64))
                .expect("store should succeed");
        }
    }
    let map = heap.map_of(objects[0]).expect("objects have maps");
    assert!(objects.iter().all(|o| heap.map_of(*o) == Some(map)));
    assert!(heap.map_flags(map).contains(MapFlags::TRANSITION));
    assert_ne!(map, heap.root_map(MapKind::Object));
}

#[test]
fn many_properties_switch_to_dictionary_mode() {
    let mut heap = Heap::new().expect("heap creation should succeed");
    let obj = heap.new_object().expect("object allocation should succeed");
    for i in 0..80 {
        let key = heap.string(&format!("p{i}")).expect("string should intern");
        heap.set_property(obj, key, Value::smi(i))
            .expect("store should succeed");
    }
    let map = heap.map_of(obj).expect("objects have maps");
    assert!(!heap.map_flags(map).contains(MapFlags::TRANSITION));
    let key = heap.string("p79").expect("string should intern");
    assert_eq!(
        heap.get_property(obj, key).expect("load should succeed"),
        Value::smi(79)
    );
}

#[test]
fn prototype_store_refreshes_instance_map() {
    let mut heap = Heap::new().expect("heap creation should succeed");
    let code = heap
        .alloc_code(0, 0, Default::default())
        .expect("code allocation should succeed");
    let ctor = heap.alloc_function(code).expect("function allocation should succeed");
    let before = heap.function_instance_map(ctor).expect("is a function");

    let proto = heap.new_object().expect("object allocation should succeed");
    let key = heap.string("prototype").expect("string should intern");
    heap.set_property(ctor, key, proto)
        .expect("store should succeed");

    let after = heap.function_instance_map(ctor).expect("is a function");
    assert_ne!(before, after);
    assert_eq!(heap.map_proto(after), proto);
}

#[test]
fn scope_guards_nest_and_release() {
    let heap = RefCell::new(Heap::new().expect("heap creation should succeed"));
    let baseline = heap.borrow().root_count();
    {
        let _outer = ScopeGuard::temporary(&heap);
        let obj = heap
            .borrow_mut()
            .new_object()
            .expect("object allocation should succeed");
        heap.borrow_mut().root(obj);
        {
            let _inner = ScopeGuard::persistent(&heap);
            heap.borrow_mut().string("kept").expect("string should intern");
            assert_eq!(heap.borrow().scope_depth(), 2);
        }
        assert_eq!(heap.borrow().scope_depth(), 1);
    }
    assert_eq!(heap.borrow().scope_depth(), 0);
    // Only the persistent string survives.
    assert_eq!(heap.borrow().root_count(), baseline + 1);
}
