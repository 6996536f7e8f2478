//! Shared builders for unit and integration tests.

use anchor_core::application::AnchorContext;
use anchor_core::domain::{ResourceRecord, ResourceStatus};
use anchor_core::foundation::{now_millis, KeyIdentifier, Outpoint, Txid};
use anchor_core::infrastructure::config::{AppConfig, StorageBackend};
use anchor_core::infrastructure::locks::MemoryLockStore;
use anchor_core::infrastructure::rpc::{MockLedgerRpc, MockSigner, UnspentOutput};
use anchor_core::infrastructure::storage::{MemoryStorage, Storage};
use std::sync::Arc;

/// A plausible pay-to-pubkey-hash locking script for the funding identity.
pub const FUNDING_SCRIPT_HEX: &str = "76a914aabbccddeeff00112233445566778899aabbccdd88ac";

pub fn funding_script() -> Vec<u8> {
    hex::decode(FUNDING_SCRIPT_HEX).expect("funding script hex")
}

pub fn test_config(queue_enabled: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.funding.identity = "funding-identity".to_string();
    config.funding.locking_script_hex = FUNDING_SCRIPT_HEX.to_string();
    config.funding.key_identifier = KeyIdentifier::from("funding-key");
    config.queue.enabled = queue_enabled;
    config.queue.max_attempts = 3;
    config.queue.backoff_base_ms = 1;
    config.queue.backoff_max_ms = 5;
    config.fees.fee_buffer = 2_000;
    config
}

pub struct TestHarness {
    pub context: AnchorContext,
    pub storage: Arc<MemoryStorage>,
    pub ledger: Arc<MockLedgerRpc>,
    pub signer: Arc<MockSigner>,
}

pub fn harness(queue_enabled: bool) -> TestHarness {
    harness_with_config(test_config(queue_enabled))
}

pub fn harness_with_config(config: AppConfig) -> TestHarness {
    let storage = Arc::new(MemoryStorage::new());
    let ledger = Arc::new(MockLedgerRpc::new());
    let signer = Arc::new(MockSigner::new());
    let context = AnchorContext::with_services(
        config,
        storage.clone(),
        Arc::new(MemoryLockStore::new()),
        ledger.clone(),
        signer.clone(),
    )
    .expect("context");
    TestHarness { context, storage, ledger, signer }
}

pub fn resource(tag: u8, amount: u64, status: ResourceStatus) -> ResourceRecord {
    let now = now_millis();
    ResourceRecord {
        outpoint: Outpoint::new(Txid::new([tag; 32]), 0),
        amount,
        locking_script: funding_script(),
        key_identifier: KeyIdentifier::from("funding-key"),
        status,
        created_at_millis: now,
        updated_at_millis: now,
    }
}

/// Seed the pool with available rows, one per amount, tags starting at 1.
pub fn seed_available(storage: &dyn Storage, amounts: &[u64]) {
    for (index, amount) in amounts.iter().enumerate() {
        let inserted = storage.insert_resource(resource(index as u8 + 1, *amount, ResourceStatus::Available)).expect("seed");
        assert!(inserted, "duplicate seed outpoint");
    }
}

pub fn unspent(tag: u8, amount: u64, confirmations: u32) -> UnspentOutput {
    UnspentOutput {
        outpoint: Outpoint::new(Txid::new([tag; 32]), 0),
        amount,
        locking_script: funding_script(),
        confirmations,
    }
}

pub fn sample_payload() -> serde_json::Value {
    serde_json::json!({
        "owner": "alice",
        "serial": "SN-0042",
        "attributes": { "color": "green", "batch": 7 },
    })
}
