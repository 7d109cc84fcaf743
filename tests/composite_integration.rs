//! Integration tests for owners built from other owners.

use std::sync::Arc;

use relinquish::testing::MockSystem;
use relinquish::{
    assert_object_released, CompositeOwner, HeapAllocator, Releasable, ReleaseOrder,
    ResourceHandle, ResourceHolder, UnmanagedBuffer,
};

#[test]
fn mixed_children_release_in_insertion_order() {
    let system = Arc::new(MockSystem::new());
    let heap = Arc::new(HeapAllocator::new());

    let owner = CompositeOwner::new("session");
    owner
        .push(ResourceHolder::new(ResourceHandle::acquire(system.clone(), &"holder").unwrap()))
        .unwrap();
    owner
        .push(UnmanagedBuffer::builder(heap.clone(), 32).build().unwrap())
        .unwrap();
    owner
        .push(ResourceHandle::acquire(system.clone(), &"handle").unwrap())
        .unwrap();
    assert_eq!(owner.len(), 3);

    owner.release().unwrap();

    assert_eq!(system.release_log(), vec!["holder", "handle"]);
    assert_eq!(heap.live_blocks(), 0);
}

#[test]
fn reverse_order_releases_dependents_first() {
    let system = Arc::new(MockSystem::new());
    let owner = CompositeOwner::with_order("pool", ReleaseOrder::Reverse);
    for label in ["pool", "conn 1", "conn 2"] {
        owner
            .push(ResourceHandle::acquire(system.clone(), &label).unwrap())
            .unwrap();
    }

    owner.release().unwrap();

    assert_eq!(system.release_log(), vec!["conn 2", "conn 1", "pool"]);
}

#[test]
fn buffer_owning_holder_releases_both_on_explicit_path() {
    let system = Arc::new(MockSystem::new());
    let heap = Arc::new(HeapAllocator::new());
    let holder = ResourceHolder::new(ResourceHandle::acquire(system.clone(), &"index").unwrap());

    let buffer = UnmanagedBuffer::builder(heap.clone(), 256)
        .with_child(holder)
        .build()
        .unwrap();

    let report = buffer.release().unwrap();

    assert!(report.is_clean());
    assert_eq!(system.live(), 0);
    assert_eq!(heap.live_blocks(), 0);
    assert_object_released!(buffer.size());
}

#[test]
fn dropped_composite_leaves_children_to_their_own_paths() {
    let system = Arc::new(MockSystem::new());
    {
        let owner = CompositeOwner::new("dropped");
        owner
            .push(ResourceHandle::acquire(system.clone(), &"raw").unwrap())
            .unwrap();
    }

    assert_eq!(system.release_log(), vec!["raw"]);
}

#[test]
fn corruption_in_one_child_surfaces_after_all_children() {
    let system = Arc::new(MockSystem::new().corrupting_release("bad"));
    let owner = CompositeOwner::new("set");
    for label in ["a", "bad", "c"] {
        owner
            .push(ResourceHandle::acquire(system.clone(), &label).unwrap())
            .unwrap();
    }

    let corruption = owner.release().unwrap_err();

    assert!(corruption.reason.contains("bad"));
    assert_eq!(system.release_log(), vec!["a", "bad", "c"]);
    assert!(owner.is_released());
}

#[test]
fn owners_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CompositeOwner>();
    assert_send_sync::<ResourceHolder<MockSystem>>();
    assert_send_sync::<UnmanagedBuffer>();
    assert_send_sync::<ResourceHandle<HeapAllocator>>();
}
