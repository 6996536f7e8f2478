use crate::domain::pending::state_machine::ensure_valid_transition;
use crate::domain::{OwnershipPointer, PendingRecord, PendingStatus, RecordKind};
use crate::foundation::{now_millis, AnchorError, PendingId, ResultExt, Txid, UidTag};
use crate::infrastructure::rpc::{LedgerRpc, SpendStatus};
use crate::infrastructure::storage::Storage;
use log::{debug, info, warn};
use std::sync::Arc;

/// Outcome of a confirmation; re-invoking with the same `(id, txid)` pair
/// yields the same outcome (queue-retry safety).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

/// Pending-record state machine over the storage trait.
///
/// `pending -> confirmed` is terminal and idempotent; `pending -> failed
/// -> pending` exists for operator-triggered recovery only.
pub struct RecordService {
    storage: Arc<dyn Storage>,
    transactional: bool,
}

impl RecordService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let capabilities = storage.capabilities();
        if capabilities.transactional {
            info!("record store is transactional; confirmations commit atomically");
        } else {
            // The fallback loses atomicity between the pointer update and
            // the record flip; every deployment should see this once.
            warn!("record store is NOT transactional; confirmations fall back to sequential best-effort writes");
        }
        Self { storage, transactional: capabilities.transactional }
    }

    /// Persist the full intent before any external call, so a crash
    /// between "decided" and "broadcast" leaves a recoverable artifact
    /// instead of silent loss.
    pub fn create_pending(
        &self,
        kind: RecordKind,
        uid_tag: UidTag,
        payload: serde_json::Value,
        previous_txid: Option<Txid>,
    ) -> Result<PendingRecord, AnchorError> {
        if kind == RecordKind::Transfer && previous_txid.is_none() {
            return Err(AnchorError::invalid_record("transfer intent requires previous_txid"));
        }
        if kind == RecordKind::Registration && previous_txid.is_some() {
            return Err(AnchorError::invalid_record("registration intent must not carry previous_txid"));
        }
        let now = now_millis();
        let record = PendingRecord {
            id: PendingId::generate(),
            uid_tag,
            kind,
            previous_txid,
            payload,
            status: PendingStatus::Pending,
            result_txid: None,
            job_id: None,
            failure_reason: None,
            created_at_millis: now,
            updated_at_millis: now,
        };
        self.storage.insert_pending(record.clone())?;
        info!(
            "pending record created id={} kind={} uid_tag={} payload_digest={}",
            record.id,
            record.kind,
            record.uid_tag,
            hex::encode(crate::domain::canonical_digest(&record.payload))
        );
        Ok(record)
    }

    /// Flip a pending record to `confirmed` and advance the ownership
    /// pointer, atomically where the store supports it.
    ///
    /// For TRANSFER the pointer write is conditioned on
    /// `current_txid == previous_txid` at the moment of the write; losing
    /// that race is a `Conflict` and must not be blindly retried.
    pub fn mark_confirmed(&self, pending_id: &PendingId, txid: Txid) -> Result<ConfirmOutcome, AnchorError> {
        let mut pending = self
            .storage
            .get_pending(pending_id)
            .required(|| AnchorError::PendingRecordMissing(pending_id.to_string()))?;

        if pending.status == PendingStatus::Confirmed {
            return match pending.result_txid {
                Some(existing) if existing == txid => {
                    debug!("confirmation replay ignored id={} txid={}", pending_id, txid);
                    Ok(ConfirmOutcome::AlreadyConfirmed)
                }
                _ => Err(AnchorError::inconsistency(format!(
                    "pending record {} already confirmed with txid {:?}, got {}",
                    pending_id, pending.result_txid, txid
                ))),
            };
        }
        ensure_valid_transition(pending.status, PendingStatus::Confirmed)?;

        let owner = pending
            .payload
            .get("owner")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();

        let existing_pointer = self.storage.get_pointer(&pending.uid_tag)?;
        let pointer_write = self.plan_pointer_write(&pending, txid, owner, existing_pointer.as_ref())?;

        pending.status = PendingStatus::Confirmed;
        pending.result_txid = Some(txid);
        pending.failure_reason = None;
        pending.updated_at_millis = now_millis();

        match pointer_write {
            PointerWrite::Skip => {
                // Pointer already reflects this confirmation (partial
                // replay); only the record flip remains.
                self.storage.update_pending(&pending)?;
            }
            PointerWrite::Upsert(pointer) => {
                if self.transactional {
                    self.storage.confirm_transactional(&pending, &pointer)?;
                } else {
                    warn!("best-effort confirmation (non-atomic) id={} uid_tag={}", pending.id, pending.uid_tag);
                    self.storage.upsert_pointer(pointer)?;
                    self.storage.update_pending(&pending)?;
                }
            }
            PointerWrite::AdvanceFrom(expected, pointer) => {
                if self.transactional {
                    // The optimistic check runs inside the store's
                    // critical section together with both writes.
                    if !self.storage.confirm_transfer_transactional(&pending, &expected, &pointer)? {
                        let current = self.storage.get_pointer(&pending.uid_tag)?;
                        let actual = current.map(|p| p.current_txid).unwrap_or_default();
                        return Err(self.conflict(&pending.uid_tag, &expected, &actual));
                    }
                } else {
                    warn!("best-effort confirmation (non-atomic) id={} uid_tag={}", pending.id, pending.uid_tag);
                    if !self.storage.advance_pointer_if_current(&expected, pointer)? {
                        let current = self.storage.get_pointer(&pending.uid_tag)?;
                        let actual = current.map(|p| p.current_txid).unwrap_or_default();
                        return Err(self.conflict(&pending.uid_tag, &expected, &actual));
                    }
                    self.storage.update_pending(&pending)?;
                }
            }
        }

        info!("pending record confirmed id={} uid_tag={} txid={}", pending.id, pending.uid_tag, txid);
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Record failure without discarding the original intent.
    pub fn mark_failed(&self, pending_id: &PendingId, reason: impl Into<String>) -> Result<(), AnchorError> {
        let mut pending = self
            .storage
            .get_pending(pending_id)
            .required(|| AnchorError::PendingRecordMissing(pending_id.to_string()))?;
        ensure_valid_transition(pending.status, PendingStatus::Failed)?;
        let reason = reason.into();
        pending.status = PendingStatus::Failed;
        pending.failure_reason = Some(reason.clone());
        pending.updated_at_millis = now_millis();
        self.storage.update_pending(&pending)?;
        warn!("pending record failed id={} uid_tag={} reason={}", pending.id, pending.uid_tag, reason);
        Ok(())
    }

    /// Operator-triggered recovery: revert a failed (or stuck) record to
    /// `pending` so it can be re-enqueued. Transient broadcast failures
    /// are the intended audience; logical conflicts need human review of
    /// the intent first.
    pub fn recover(&self, pending_id: &PendingId) -> Result<PendingRecord, AnchorError> {
        let mut pending = self
            .storage
            .get_pending(pending_id)
            .required(|| AnchorError::PendingRecordMissing(pending_id.to_string()))?;
        ensure_valid_transition(pending.status, PendingStatus::Pending)?;
        pending.status = PendingStatus::Pending;
        pending.failure_reason = None;
        pending.updated_at_millis = now_millis();
        self.storage.update_pending(&pending)?;
        info!("pending record recovered id={} uid_tag={}", pending.id, pending.uid_tag);
        Ok(pending)
    }

    /// A confirmed record whose txid the ledger does not know is operator
    /// material, not something to retry.
    pub async fn verify_confirmed(&self, pending_id: &PendingId, ledger: &Arc<dyn LedgerRpc>) -> Result<(), AnchorError> {
        let pending = self
            .storage
            .get_pending(pending_id)
            .required(|| AnchorError::PendingRecordMissing(pending_id.to_string()))?;
        if pending.status != PendingStatus::Confirmed {
            return Ok(());
        }
        let txid = pending
            .result_txid
            .ok_or_else(|| AnchorError::inconsistency(format!("confirmed record {} has no result_txid", pending_id)))?;
        let status = ledger.get_spend_status(&crate::foundation::Outpoint::new(txid, 0)).await?;
        if status == SpendStatus::Unknown {
            return Err(AnchorError::inconsistency(format!(
                "confirmed record {} references txid {} with no corresponding ledger record",
                pending_id, txid
            )));
        }
        Ok(())
    }

    pub fn get(&self, pending_id: &PendingId) -> Result<Option<PendingRecord>, AnchorError> {
        self.storage.get_pending(pending_id)
    }

    pub fn pointer(&self, uid_tag: &UidTag) -> Result<Option<OwnershipPointer>, AnchorError> {
        self.storage.get_pointer(uid_tag)
    }

    fn plan_pointer_write(
        &self,
        pending: &PendingRecord,
        txid: Txid,
        owner: String,
        existing: Option<&OwnershipPointer>,
    ) -> Result<PointerWrite, AnchorError> {
        match pending.kind {
            RecordKind::Registration => {
                if let Some(pointer) = existing {
                    if pointer.current_txid == txid {
                        // Replay of a half-applied confirmation.
                        return Ok(PointerWrite::Skip);
                    }
                }
                let version = existing.map(|p| p.version + 1).unwrap_or(1);
                Ok(PointerWrite::Upsert(OwnershipPointer {
                    uid_tag: pending.uid_tag.clone(),
                    current_txid: txid,
                    current_owner: owner,
                    version,
                }))
            }
            RecordKind::Transfer => {
                let previous = pending
                    .previous_txid
                    .ok_or_else(|| AnchorError::invalid_record("transfer record lost its previous_txid"))?;
                let Some(pointer) = existing else {
                    return Err(AnchorError::inconsistency(format!(
                        "transfer for {} but no ownership pointer exists",
                        pending.uid_tag
                    )));
                };
                if pointer.current_txid == txid {
                    // Pointer already advanced by a previous partial run.
                    return Ok(PointerWrite::Skip);
                }
                if pointer.current_txid != previous {
                    return Err(self.conflict(&pending.uid_tag, &previous, &pointer.current_txid));
                }
                Ok(PointerWrite::AdvanceFrom(
                    previous,
                    OwnershipPointer {
                        uid_tag: pending.uid_tag.clone(),
                        current_txid: txid,
                        current_owner: owner,
                        version: pointer.version + 1,
                    },
                ))
            }
        }
    }

    fn conflict(&self, uid_tag: &UidTag, expected: &Txid, actual: &Txid) -> AnchorError {
        AnchorError::Conflict { uid_tag: uid_tag.to_string(), expected: expected.to_string(), actual: actual.to_string() }
    }
}

enum PointerWrite {
    /// Pointer already reflects this confirmation.
    Skip,
    /// Registration: create or refresh the head.
    Upsert(OwnershipPointer),
    /// Transfer: conditional advance from the expected head.
    AdvanceFrom(Txid, OwnershipPointer),
}
