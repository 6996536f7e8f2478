use crate::fixtures::sample_payload;
use anchor_core::application::{ConfirmOutcome, RecordService};
use anchor_core::domain::{PendingStatus, RecordKind};
use anchor_core::foundation::{AnchorError, Txid, UidTag};
use anchor_core::infrastructure::storage::MemoryStorage;
use std::sync::Arc;

fn service() -> RecordService {
    RecordService::new(Arc::new(MemoryStorage::new()))
}

#[test]
fn registration_confirm_creates_the_pointer() {
    let service = service();
    let pending = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");
    assert_eq!(pending.status, PendingStatus::Pending);

    let txid = Txid::new([7; 32]);
    let outcome = service.mark_confirmed(&pending.id, txid).expect("confirm");
    assert_eq!(outcome, ConfirmOutcome::Confirmed);

    let stored = service.get(&pending.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Confirmed);
    assert_eq!(stored.result_txid, Some(txid));

    let pointer = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, txid);
    assert_eq!(pointer.current_owner, "alice");
    assert_eq!(pointer.version, 1);
}

#[test]
fn confirm_is_idempotent_for_the_same_txid() {
    let service = service();
    let pending = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");
    let txid = Txid::new([7; 32]);

    assert_eq!(service.mark_confirmed(&pending.id, txid).expect("confirm"), ConfirmOutcome::Confirmed);
    let pointer_before = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");

    // Queue redelivery: same arguments, same outcome, no double-apply.
    assert_eq!(service.mark_confirmed(&pending.id, txid).expect("replay"), ConfirmOutcome::AlreadyConfirmed);
    let pointer_after = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer_before, pointer_after);

    // A different txid for an already-confirmed record is inconsistency.
    assert!(service.mark_confirmed(&pending.id, Txid::new([8; 32])).is_err());
}

#[test]
fn transfer_requires_previous_txid() {
    let service = service();
    let err = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), sample_payload(), None)
        .expect_err("must fail");
    assert!(matches!(err, AnchorError::InvalidRecord { .. }));
}

#[test]
fn transfer_advances_the_chain() {
    let service = service();
    let registration = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");
    let genesis = Txid::new([1; 32]);
    service.mark_confirmed(&registration.id, genesis).expect("confirm registration");

    let transfer = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), serde_json::json!({"owner": "bob"}), Some(genesis))
        .expect("create transfer");
    let next = Txid::new([2; 32]);
    service.mark_confirmed(&transfer.id, next).expect("confirm transfer");

    let pointer = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, next);
    assert_eq!(pointer.current_owner, "bob");
    assert_eq!(pointer.version, 2);
}

#[test]
fn losing_transfer_conflicts_and_leaves_pointer_unmodified() {
    let service = service();
    let registration = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");
    let genesis = Txid::new([1; 32]);
    service.mark_confirmed(&registration.id, genesis).expect("confirm registration");

    // Two transfers both anchored against the genesis txid.
    let winner = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), serde_json::json!({"owner": "bob"}), Some(genesis))
        .expect("create winner");
    let loser = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), serde_json::json!({"owner": "carol"}), Some(genesis))
        .expect("create loser");

    let winning_txid = Txid::new([2; 32]);
    service.mark_confirmed(&winner.id, winning_txid).expect("winner confirms");

    let err = service.mark_confirmed(&loser.id, Txid::new([3; 32])).expect_err("loser conflicts");
    assert!(matches!(err, AnchorError::Conflict { .. }));

    let pointer = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, winning_txid, "pointer must be untouched by the losing transfer");
    assert_eq!(pointer.current_owner, "bob");

    // The losing intent is still pending; operators decide what happens.
    let stored = service.get(&loser.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Pending);
}

#[test]
fn transactional_store_confirms_and_conflicts_identically() {
    use anchor_core::infrastructure::storage::RocksStorage;
    use tempfile::TempDir;

    let temp_dir = TempDir::new().expect("temp dir");
    let service = RecordService::new(Arc::new(RocksStorage::open_in_dir(temp_dir.path()).expect("open rocksdb")));

    let registration = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");
    let genesis = Txid::new([1; 32]);
    service.mark_confirmed(&registration.id, genesis).expect("confirm registration");

    let winner = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), serde_json::json!({"owner": "bob"}), Some(genesis))
        .expect("create winner");
    let loser = service
        .create_pending(RecordKind::Transfer, UidTag::from("item-1"), serde_json::json!({"owner": "carol"}), Some(genesis))
        .expect("create loser");

    let winning_txid = Txid::new([2; 32]);
    assert_eq!(service.mark_confirmed(&winner.id, winning_txid).expect("winner"), ConfirmOutcome::Confirmed);
    assert_eq!(service.mark_confirmed(&winner.id, winning_txid).expect("replay"), ConfirmOutcome::AlreadyConfirmed);

    let err = service.mark_confirmed(&loser.id, Txid::new([3; 32])).expect_err("loser conflicts");
    assert!(matches!(err, AnchorError::Conflict { .. }));

    let pointer = service.pointer(&UidTag::from("item-1")).expect("pointer").expect("some");
    assert_eq!(pointer.current_txid, winning_txid);

    // Best-effort and transactional paths agree on the end state.
    let stored = service.get(&winner.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Confirmed);
    assert_eq!(stored.result_txid, Some(winning_txid));
}

#[test]
fn failed_records_recover_to_pending() {
    let service = service();
    let pending = service
        .create_pending(RecordKind::Registration, UidTag::from("item-1"), sample_payload(), None)
        .expect("create");

    service.mark_failed(&pending.id, "broadcast timeout").expect("fail");
    let stored = service.get(&pending.id).expect("get").expect("some");
    assert_eq!(stored.status, PendingStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("broadcast timeout"));

    let recovered = service.recover(&pending.id).expect("recover");
    assert_eq!(recovered.status, PendingStatus::Pending);
    assert!(recovered.failure_reason.is_none());

    // Confirmed records never come back.
    service.mark_confirmed(&pending.id, Txid::new([5; 32])).expect("confirm");
    assert!(service.recover(&pending.id).is_err());
    assert!(service.mark_failed(&pending.id, "nope").is_err());
}
