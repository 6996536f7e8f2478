use crate::foundation::{JobId, KeyIdentifier, Outpoint, PendingId, Txid, UidTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a spendable ledger input held in the funding pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Observed on the ledger but below the confirmation threshold.
    Unconfirmed,
    /// Spendable and free for any caller to lock.
    Available,
    /// Held by one in-flight operation.
    Locked,
    /// Consumed on the ledger. Terminal; rows are never deleted.
    Spent,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Available => "available",
            Self::Locked => "locked",
            Self::Spent => "spent",
        };
        f.write_str(s)
    }
}

const VALID_RESOURCE_TRANSITIONS: &[(ResourceStatus, ResourceStatus)] = &[
    (ResourceStatus::Unconfirmed, ResourceStatus::Available),
    (ResourceStatus::Unconfirmed, ResourceStatus::Spent),
    (ResourceStatus::Available, ResourceStatus::Locked),
    (ResourceStatus::Available, ResourceStatus::Spent),
    (ResourceStatus::Locked, ResourceStatus::Spent),
    (ResourceStatus::Locked, ResourceStatus::Available),
];

impl ResourceStatus {
    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        VALID_RESOURCE_TRANSITIONS.contains(&(self, next))
    }
}

/// A spendable ledger input owned by the funding identity.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ResourceRecord {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub locking_script: Vec<u8>,
    pub key_identifier: KeyIdentifier,
    pub status: ResourceStatus,
    pub created_at_millis: u64,
    pub updated_at_millis: u64,
}

/// Kind of ownership intent to anchor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Registration,
    Transfer,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("REGISTRATION"),
            Self::Transfer => f.write_str("TRANSFER"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A registration or transfer intent, persisted before any external call so
/// a crash between "decided" and "broadcast" leaves a recoverable artifact.
/// Rows are never deleted; they are the audit trail.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PendingRecord {
    pub id: PendingId,
    pub uid_tag: UidTag,
    pub kind: RecordKind,
    /// Required iff `kind == Transfer`: the txid the transfer spends from.
    pub previous_txid: Option<Txid>,
    /// Immutable application data embedded into the ledger.
    #[serde(with = "json_blob")]
    pub payload: serde_json::Value,
    pub status: PendingStatus,
    pub result_txid: Option<Txid>,
    pub job_id: Option<JobId>,
    pub failure_reason: Option<String>,
    pub created_at_millis: u64,
    pub updated_at_millis: u64,
}

/// Current head of an item's ownership chain. One row per uid_tag; advanced
/// exactly once per confirmed transfer via an optimistic-concurrency write.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OwnershipPointer {
    pub uid_tag: UidTag,
    pub current_txid: Txid,
    pub current_owner: String,
    pub version: u64,
}

/// JSON payloads pass through human-readable formats untouched but travel
/// as a JSON string through compact binary encodings, which cannot
/// deserialize a free-form `Value`.
mod json_blob {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            value.serialize(serializer)
        } else {
            serializer.serialize_str(&value.to_string())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        if deserializer.is_human_readable() {
            Value::deserialize(deserializer)
        } else {
            let encoded = String::deserialize(deserializer)?;
            serde_json::from_str(&encoded).map_err(serde::de::Error::custom)
        }
    }
}
