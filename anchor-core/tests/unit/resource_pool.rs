use crate::fixtures::seed_available;
use anchor_core::application::ResourcePool;
use anchor_core::domain::ResourceStatus;
use anchor_core::foundation::AnchorError;
use anchor_core::infrastructure::storage::{MemoryStorage, Storage};
use std::sync::Arc;

fn pool_with(amounts: &[u64]) -> (ResourcePool, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    seed_available(storage.as_ref(), amounts);
    (ResourcePool::new(storage.clone()), storage)
}

#[test]
fn select_and_lock_returns_none_on_empty_pool() {
    let (pool, _) = pool_with(&[]);
    assert!(pool.select_and_lock(100).expect("select").is_none());
}

#[test]
fn select_and_lock_best_fit_minimizes_fragmentation() {
    let (pool, _) = pool_with(&[50_000, 1_200, 3_000]);
    let locked = pool.select_and_lock(1_000).expect("select").expect("some");
    // Smallest row that still covers the ask, not the 50k one.
    assert_eq!(locked.amount, 1_200);
}

#[test]
fn select_many_accumulates_largest_first() {
    let (pool, storage) = pool_with(&[500, 900, 2_000]);
    let taken = pool.select_and_lock_many(2_500, 300).expect("select many");
    // 2000 + 900 = 2900 >= 2800; the 500 row stays untouched.
    assert_eq!(taken.len(), 2);
    assert_eq!(taken[0].amount, 2_000);
    assert_eq!(taken[1].amount, 900);
    assert_eq!(storage.count_resources(ResourceStatus::Available).expect("count"), 1);
}

#[test]
fn starvation_unlocks_every_partial_hold() {
    let (pool, storage) = pool_with(&[500, 900]);
    let err = pool.select_and_lock_many(5_000, 0).expect_err("must starve");
    assert!(matches!(err, AnchorError::InsufficientFunds { required: 5_000, available: 1_400 }));
    // No partial hold outlives the failed call.
    assert_eq!(storage.count_resources(ResourceStatus::Locked).expect("count"), 0);
    assert_eq!(storage.count_resources(ResourceStatus::Available).expect("count"), 2);
}

#[test]
fn single_large_resource_scenario() {
    // Pool has one resource of 10,000 units.
    let (pool, _) = pool_with(&[10_000]);

    // minTotal=1000 + feeBuffer=1000 <= 10,000: locks exactly that one.
    let taken = pool.select_and_lock_many(1_000, 1_000).expect("select many");
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].amount, 10_000);

    // A concurrent ask for 500 starves while the row is held...
    let err = pool.select_and_lock_many(500, 0).expect_err("starved");
    assert!(matches!(err, AnchorError::InsufficientFunds { .. }));

    // ...and succeeds once the first hold is released.
    pool.unlock_many(&taken).expect("unlock");
    let retry = pool.select_and_lock_many(500, 0).expect("retry");
    assert_eq!(retry.len(), 1);
}

#[test]
fn spend_and_unlock_are_terminal_transitions() {
    let (pool, storage) = pool_with(&[1_000, 2_000]);
    let taken = pool.select_and_lock_many(2_500, 0).expect("select many");
    assert_eq!(taken.len(), 2);

    pool.spend_many(&taken).expect("spend");
    assert_eq!(storage.count_resources(ResourceStatus::Spent).expect("count"), 2);
    // Spending again is a no-op warning path, not an error.
    pool.spend_many(&taken).expect("re-spend");

    // Rows are destroyed logically, never physically.
    assert_eq!(storage.list_resources(None).expect("list").len(), 2);
}
