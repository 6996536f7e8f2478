use crate::fixtures::{harness, sample_payload, seed_available};
use anchor_core::domain::{PendingStatus, RecordKind, ResourceStatus};
use anchor_core::foundation::{AnchorError, UidTag};
use anchor_core::infrastructure::storage::Storage;

#[tokio::test]
async fn inline_registration_confirms_and_recycles_change() {
    let harness = harness(false);
    seed_available(harness.storage.as_ref(), &[50_000]);

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    let txid = harness.context.submit(&pending.id).await.expect("submit").expect("inline txid");

    let stored = harness.context.records.get(&pending.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Confirmed);
    assert_eq!(stored.result_txid, Some(txid));

    let pointer = harness.context.records.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, txid);

    // The funding input was spent and the change output re-entered the
    // pool as unconfirmed.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Spent).expect("count"), 1);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Unconfirmed).expect("count"), 1);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Locked).expect("count"), 0);
    assert_eq!(harness.ledger.broadcast_count(), 1);
}

#[tokio::test]
async fn signer_outage_unlocks_everything_and_fails_the_record() {
    let harness = harness(false);
    seed_available(harness.storage.as_ref(), &[50_000]);
    // More outages than the retry budget.
    harness.signer.fail_next(100);

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    let err = harness.context.submit(&pending.id).await.expect_err("must fail");
    assert!(matches!(err, AnchorError::ServiceUnavailable { .. }));

    // Compensating unlock: every originally-locked resource is available.
    assert_eq!(harness.storage.count_resources(ResourceStatus::Available).expect("count"), 1);
    assert_eq!(harness.storage.count_resources(ResourceStatus::Locked).expect("count"), 0);

    let stored = harness.context.records.get(&pending.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Failed);
    assert_eq!(harness.ledger.broadcast_count(), 0);
}

#[tokio::test]
async fn broadcast_rejection_is_not_retried() {
    let harness = harness(false);
    seed_available(harness.storage.as_ref(), &[50_000]);
    harness.ledger.reject_broadcasts(true);

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    let err = harness.context.submit(&pending.id).await.expect_err("must fail");
    assert!(matches!(err, AnchorError::TransactionRejected { .. }));

    assert_eq!(harness.storage.count_resources(ResourceStatus::Available).expect("count"), 1);
    let stored = harness.context.records.get(&pending.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Failed);
}

#[tokio::test]
async fn empty_pool_is_insufficient_funds() {
    let harness = harness(false);
    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    let err = harness.context.submit(&pending.id).await.expect_err("must fail");
    assert!(matches!(err, AnchorError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn verify_confirmed_flags_records_the_ledger_does_not_know() {
    let harness = harness(false);
    seed_available(harness.storage.as_ref(), &[50_000]);

    let pending = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-5"), sample_payload(), None)
        .expect("create");
    harness.context.submit(&pending.id).await.expect("submit").expect("txid");

    // Genuinely broadcast: the ledger knows the txid.
    let ledger = harness.context.pipeline.ledger().clone();
    harness.context.records.verify_confirmed(&pending.id, &ledger).await.expect("consistent");

    // Forge a confirmation pointing at a txid the ledger never saw.
    let mut forged = harness.context.records.get(&pending.id).expect("get").expect("some");
    forged.result_txid = Some(anchor_core::foundation::Txid::new([0xEE; 32]));
    harness.storage.update_pending(&forged).expect("update");

    let err = harness.context.records.verify_confirmed(&pending.id, &ledger).await.expect_err("inconsistent");
    assert!(matches!(err, AnchorError::DataInconsistency { .. }));
}

#[tokio::test]
async fn transfer_flow_advances_ownership_end_to_end() {
    let harness = harness(false);
    seed_available(harness.storage.as_ref(), &[50_000, 60_000]);

    let registration = harness
        .context
        .records
        .create_pending(RecordKind::Registration, UidTag::from("item-9"), sample_payload(), None)
        .expect("create");
    let genesis = harness.context.submit(&registration.id).await.expect("submit").expect("txid");

    let transfer = harness
        .context
        .records
        .create_pending(RecordKind::Transfer, UidTag::from("item-9"), serde_json::json!({"owner": "bob"}), Some(genesis))
        .expect("create transfer");
    let next = harness.context.submit(&transfer.id).await.expect("submit").expect("txid");

    let pointer = harness.context.records.pointer(&UidTag::from("item-9")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, next);
    assert_eq!(pointer.current_owner, "bob");
    assert_eq!(pointer.version, 2);
}
