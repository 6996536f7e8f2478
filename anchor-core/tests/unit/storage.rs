use crate::fixtures::{resource, seed_available};
use anchor_core::domain::ResourceStatus;
use anchor_core::foundation::{Outpoint, Txid};
use anchor_core::infrastructure::storage::{MemoryStorage, RocksStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn outpoints_are_globally_unique() {
    let storage = MemoryStorage::new();
    assert!(storage.insert_resource(resource(1, 100, ResourceStatus::Available)).expect("insert"));
    assert!(!storage.insert_resource(resource(1, 999, ResourceStatus::Unconfirmed)).expect("dup insert"));
    assert_eq!(storage.list_resources(None).expect("list").len(), 1);
}

#[test]
fn concurrent_select_never_locks_the_same_row_twice() {
    let storage = Arc::new(MemoryStorage::new());
    seed_available(storage.as_ref(), &[100, 200, 300, 400, 500, 600, 700, 800]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage = storage.clone();
        handles.push(std::thread::spawn(move || storage.lock_best_available(0).expect("lock")));
    }

    let locked: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    let mut outpoints: Vec<Outpoint> = locked.iter().flatten().map(|record| record.outpoint).collect();
    let successes = outpoints.len();
    outpoints.sort();
    outpoints.dedup();
    assert_eq!(outpoints.len(), successes, "a row was locked twice");
    assert_eq!(successes, 8);
    assert_eq!(storage.count_resources(ResourceStatus::Locked).expect("count"), 8);
    assert_eq!(storage.count_resources(ResourceStatus::Available).expect("count"), 0);
}

#[test]
fn reap_recovers_stale_locks_exactly_once() {
    let storage = MemoryStorage::new();
    let mut stale = resource(1, 100, ResourceStatus::Locked);
    stale.updated_at_millis = 0; // locked in the distant past
    storage.insert_resource(stale).expect("insert");
    let fresh = resource(2, 100, ResourceStatus::Locked);
    storage.insert_resource(fresh).expect("insert");

    let reaped = storage.reap_locked_older_than(1_000, 10).expect("reap");
    assert_eq!(reaped, 1);
    let again = storage.reap_locked_older_than(1_000, 10).expect("reap again");
    assert_eq!(again, 0);

    assert_eq!(storage.count_resources(ResourceStatus::Available).expect("count"), 1);
    assert_eq!(storage.count_resources(ResourceStatus::Locked).expect("count"), 1);
}

#[test]
fn rocksdb_resource_roundtrip() {
    let temp_dir = TempDir::new().expect("temp dir");
    let storage = RocksStorage::open_in_dir(temp_dir.path()).expect("open rocksdb");

    let record = resource(9, 12_345, ResourceStatus::Available);
    assert!(storage.insert_resource(record.clone()).expect("insert"));
    let loaded = storage.get_resource(&record.outpoint).expect("get").expect("some");
    assert_eq!(loaded, record);

    let locked = storage.lock_best_available(10_000).expect("lock").expect("some");
    assert_eq!(locked.outpoint, record.outpoint);
    assert_eq!(locked.status, ResourceStatus::Locked);

    assert!(storage.transition_resource(&record.outpoint, ResourceStatus::Locked, ResourceStatus::Spent).expect("spend"));
    assert_eq!(storage.count_resources(ResourceStatus::Spent).expect("count"), 1);
}

#[test]
fn rocksdb_pointer_advance_is_conditional() {
    use anchor_core::domain::OwnershipPointer;
    use anchor_core::foundation::UidTag;

    let temp_dir = TempDir::new().expect("temp dir");
    let storage = RocksStorage::open_in_dir(temp_dir.path()).expect("open rocksdb");

    let uid = UidTag::from("item-1");
    let genesis = Txid::new([1; 32]);
    storage
        .upsert_pointer(OwnershipPointer { uid_tag: uid.clone(), current_txid: genesis, current_owner: "alice".into(), version: 1 })
        .expect("upsert");

    let next = Txid::new([2; 32]);
    let advanced = storage
        .advance_pointer_if_current(
            &genesis,
            OwnershipPointer { uid_tag: uid.clone(), current_txid: next, current_owner: "bob".into(), version: 2 },
        )
        .expect("advance");
    assert!(advanced);

    // The expectation is stale now; a second advance from genesis loses.
    let replay = storage
        .advance_pointer_if_current(
            &genesis,
            OwnershipPointer { uid_tag: uid.clone(), current_txid: Txid::new([3; 32]), current_owner: "carol".into(), version: 2 },
        )
        .expect("advance replay");
    assert!(!replay);

    let pointer = storage.get_pointer(&uid).expect("get").expect("some");
    assert_eq!(pointer.current_txid, next);
    assert_eq!(pointer.current_owner, "bob");
}

#[test]
fn rocksdb_reports_transactional_memory_does_not() {
    let temp_dir = TempDir::new().expect("temp dir");
    let rocks = RocksStorage::open_in_dir(temp_dir.path()).expect("open rocksdb");
    assert!(rocks.capabilities().transactional);
    assert!(!MemoryStorage::new().capabilities().transactional);
}
