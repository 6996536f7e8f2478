use crate::fixtures::{harness, harness_with_config, resource, seed_available, test_config, unspent};
use anchor_core::application::{SplitOutcome, SweepOutcome};
use anchor_core::domain::ResourceStatus;
use anchor_core::foundation::{Outpoint, Txid};
use anchor_core::infrastructure::storage::Storage;
use std::time::Duration;

#[tokio::test]
async fn sync_discovers_promotes_and_marks_spent() {
    let harness = harness(false);
    harness.ledger.set_height(120);

    // Locally known: one available row the ledger no longer lists, one
    // unconfirmed row that has since met the threshold.
    seed_available(harness.storage.as_ref(), &[5_000]);
    harness.storage.insert_resource(resource(40, 7_000, ResourceStatus::Unconfirmed)).expect("seed unconfirmed");

    // Ledger view: the unconfirmed row (now 3 confs), plus a brand new
    // output and a brand new zero-conf output.
    harness.ledger.push_unspent(unspent(40, 7_000, 3));
    harness.ledger.push_unspent(unspent(41, 9_000, 2));
    harness.ledger.push_unspent(unspent(42, 1_000, 0));

    let report = harness.context.orchestrator.sync().await.expect("sync");
    assert_eq!(report.discovered, 2);
    assert_eq!(report.promoted, 1);
    assert_eq!(report.marked_spent, 1);

    // The ledger is the source of truth for spentness.
    let stale = harness.storage.get_resource(&Outpoint::new(Txid::new([1; 32]), 0)).expect("get").expect("some");
    assert_eq!(stale.status, ResourceStatus::Spent);

    let promoted = harness.storage.get_resource(&Outpoint::new(Txid::new([40; 32]), 0)).expect("get").expect("some");
    assert_eq!(promoted.status, ResourceStatus::Available);

    let zero_conf = harness.storage.get_resource(&Outpoint::new(Txid::new([42; 32]), 0)).expect("get").expect("some");
    assert_eq!(zero_conf.status, ResourceStatus::Unconfirmed);

    // Re-running the sync is idempotent.
    let again = harness.context.orchestrator.sync().await.expect("sync again");
    assert_eq!(again.discovered, 0);
    assert_eq!(again.promoted, 0);
    assert_eq!(again.marked_spent, 0);
}

#[tokio::test]
async fn sweep_waits_for_the_dust_floor() {
    let mut config = test_config(false);
    config.pool.dust_sweep_floor = 3;
    let harness = harness_with_config(config);

    // Two dust rows: below the floor, sweeping would waste fees.
    seed_available(harness.storage.as_ref(), &[100, 200, 5_000]);

    let outcome = harness.context.orchestrator.sweep_dust().await.expect("sweep");
    assert_eq!(outcome, SweepOutcome::Skipped { reason: "below_floor" });
    assert_eq!(harness.ledger.broadcast_count(), 0);
}

#[tokio::test]
async fn sweep_consolidates_only_the_dust_subset() {
    let mut config = test_config(false);
    config.pool.dust_sweep_floor = 3;
    harness_sweep(config).await;
}

async fn harness_sweep(config: anchor_core::infrastructure::config::AppConfig) {
    let harness = harness_with_config(config);
    seed_available(harness.storage.as_ref(), &[500, 520, 540, 50_000]);

    let outcome = harness.context.orchestrator.sweep_dust().await.expect("sweep");
    assert_eq!(outcome, SweepOutcome::Swept { inputs: 3, consolidated_amount: 1_560 });

    // The healthy 50k row is untouched; the dust rows are spent.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Available).expect("count"), 1);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Spent).expect("count"), 3);
    assert_eq!(harness.ledger.broadcast_count(), 1);
}

#[tokio::test]
async fn split_skips_when_pool_is_full() {
    let mut config = test_config(false);
    config.pool.min_pool_size = 2;
    let harness = harness_with_config(config);
    seed_available(harness.storage.as_ref(), &[10_000, 20_000]);

    let outcome = harness.context.orchestrator.split_if_needed().await.expect("split");
    assert_eq!(outcome, SplitOutcome::Skipped { reason: "pool_full" });
}

#[tokio::test]
async fn split_skips_without_a_single_large_resource() {
    // minPoolSize=10, currentAvailable=2, maxOutputs=40 -> deficit=8.
    // No single row covers 8 x outputSize + feeBuffer, so the outcome is
    // a skip with a reason, not an error.
    let mut config = test_config(false);
    config.pool.min_pool_size = 10;
    config.pool.max_split_outputs = 40;
    config.pool.split_output_amount = 10_000;
    config.fees.fee_buffer = 2_000;
    let harness = harness_with_config(config);
    seed_available(harness.storage.as_ref(), &[30_000, 40_000]);

    let outcome = harness.context.orchestrator.split_if_needed().await.expect("split");
    assert_eq!(outcome, SplitOutcome::Skipped { reason: "no_large_resource_available" });

    // Nothing stayed locked behind the skip.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Locked).expect("count"), 0);
}

#[tokio::test]
async fn split_builds_the_deficit_and_registers_outputs() {
    let mut config = test_config(false);
    config.pool.min_pool_size = 5;
    config.pool.split_output_amount = 10_000;
    let harness = harness_with_config(config);
    // One available row -> deficit 4; 200k covers 4 x 10k + buffer.
    seed_available(harness.storage.as_ref(), &[200_000]);

    let outcome = harness.context.orchestrator.split_if_needed().await.expect("split");
    let SplitOutcome::Split { outputs, source } = outcome else {
        panic!("expected a split, got {:?}", outcome);
    };
    assert_eq!(outputs, 4);
    assert_eq!(source, Outpoint::new(Txid::new([1; 32]), 0));

    // Source spent, fresh outputs (4 splits + change) registered as
    // unconfirmed for the next sync to promote.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Spent).expect("count"), 1);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Unconfirmed).expect("count"), 5);
    assert_eq!(harness.ledger.broadcast_count(), 1);
}

#[tokio::test]
async fn split_skips_while_the_lease_is_held_elsewhere() {
    let mut config = test_config(false);
    config.pool.min_pool_size = 5;
    let harness = harness_with_config(config);
    seed_available(harness.storage.as_ref(), &[200_000]);

    // Another instance holds the maintenance lease.
    let _token = harness
        .context
        .locks
        .acquire(anchor_core::foundation::POOL_MAINTENANCE_LOCK, Duration::from_secs(30))
        .expect("acquire")
        .expect("token");

    let outcome = harness.context.orchestrator.split_if_needed().await.expect("split");
    assert_eq!(outcome, SplitOutcome::Skipped { reason: "lock_held" });
    assert_eq!(harness.ledger.broadcast_count(), 0);
}
