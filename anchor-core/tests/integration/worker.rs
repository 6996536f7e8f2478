use crate::fixtures::{harness, sample_payload, seed_available};
use anchor_core::domain::{PendingStatus, RecordKind, ResourceStatus};
use anchor_core::foundation::{PendingId, UidTag};
use anchor_core::infrastructure::storage::Storage;
use std::time::Duration;

async fn wait_for_status(
    harness: &crate::fixtures::TestHarness,
    pending_id: &PendingId,
    wanted: PendingStatus,
) -> anchor_core::domain::PendingRecord {
    for _ in 0..200 {
        let record = harness.context.records.get(pending_id).expect("get").expect("some");
        if record.status == wanted {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("pending record never reached {:?}", wanted);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_job_confirms_asynchronously() {
    let harness = harness(true);
    seed_available(harness.storage.as_ref(), &[50_000]);
    let worker = harness.context.spawn_worker();

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    // Asynchronous path: the caller gets a pending id and polls.
    let inline = harness.context.submit(&pending.id).await.expect("submit");
    assert!(inline.is_none());

    let confirmed = wait_for_status(&harness, &pending.id, PendingStatus::Confirmed).await;
    assert!(confirmed.result_txid.is_some());
    assert!(confirmed.job_id.is_some());

    harness.context.close();
    worker.await.expect("worker join");
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_outage_is_retried_until_success() {
    let harness = harness(true);
    seed_available(harness.storage.as_ref(), &[50_000]);
    // Two whole-job failures (the per-call retry budget is exhausted by
    // three attempts each), then the ledger recovers.
    harness.ledger.fail_next_broadcasts(6);
    let worker = harness.context.spawn_worker();

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-2"), sample_payload(), None)
        .expect("create");
    harness.context.submit(&pending.id).await.expect("submit");

    let confirmed = wait_for_status(&harness, &pending.id, PendingStatus::Confirmed).await;
    assert!(confirmed.result_txid.is_some());
    assert_eq!(harness.ledger.broadcast_count(), 1);

    harness.context.close();
    worker.await.expect("worker join");
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_mark_the_record_failed() {
    let harness = harness(true);
    seed_available(harness.storage.as_ref(), &[50_000]);
    // Never recovers within the job's attempt budget.
    harness.signer.fail_next(1_000);
    let worker = harness.context.spawn_worker();

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-3"), sample_payload(), None)
        .expect("create");
    harness.context.submit(&pending.id).await.expect("submit");

    let failed = wait_for_status(&harness, &pending.id, PendingStatus::Failed).await;
    assert!(failed.failure_reason.is_some());

    // Resources were compensated back on every attempt.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Locked).expect("count"), 0);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Available).expect("count"), 1);

    harness.context.close();
    worker.await.expect("worker join");
}

#[tokio::test(flavor = "multi_thread")]
async fn recovery_reenqueues_a_failed_intent() {
    let harness = harness(true);
    seed_available(harness.storage.as_ref(), &[50_000]);
    harness.signer.fail_next(1_000);
    let worker = harness.context.spawn_worker();

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-4"), sample_payload(), None)
        .expect("create");
    harness.context.submit(&pending.id).await.expect("submit");
    wait_for_status(&harness, &pending.id, PendingStatus::Failed).await;

    // Operator-triggered: the signer is back, recover and re-enqueue.
    harness.signer.fail_next(0);
    let recovered = harness.context.recover_failed().await.expect("recover");
    assert_eq!(recovered, 1);

    let confirmed = wait_for_status(&harness, &pending.id, PendingStatus::Confirmed).await;
    assert!(confirmed.result_txid.is_some());

    harness.context.close();
    worker.await.expect("worker join");
}
