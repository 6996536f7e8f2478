use crate::application::lock_service::{LockOutcome, LockService};
use crate::application::pipeline::TxPipeline;
use crate::application::resource_pool::ResourcePool;
use crate::domain::tx::encode::TxOutput;
use crate::domain::{ResourceRecord, ResourceStatus};
use crate::foundation::{now_millis, AnchorError, Outpoint, POOL_MAINTENANCE_LOCK};
use crate::infrastructure::config::{FundingConfig, LedgerConfig, PoolConfig};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: usize,
    pub promoted: usize,
    pub marked_spent: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Skipped { reason: &'static str },
    Swept { inputs: usize, consolidated_amount: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitOutcome {
    Skipped { reason: &'static str },
    Split { outputs: usize, source: Outpoint },
}

/// Periodic pool maintenance: reconciliation against the external ledger,
/// dust consolidation and replenishment. Whole-pool operations run under
/// the maintenance lease so any number of instances can host this safely.
pub struct PoolOrchestrator {
    pool: Arc<ResourcePool>,
    pipeline: Arc<TxPipeline>,
    locks: Arc<LockService>,
    funding: FundingConfig,
    ledger_cfg: LedgerConfig,
    pool_cfg: PoolConfig,
    fee_buffer: u64,
    dust_threshold: u64,
}

impl PoolOrchestrator {
    pub fn new(
        pool: Arc<ResourcePool>,
        pipeline: Arc<TxPipeline>,
        locks: Arc<LockService>,
        funding: FundingConfig,
        ledger_cfg: LedgerConfig,
        pool_cfg: PoolConfig,
    ) -> Result<Self, AnchorError> {
        let fee_buffer = pipeline.fees().fee_buffer;
        let dust_threshold = pipeline.fees().dust_threshold;
        Ok(Self { pool, pipeline, locks, funding, ledger_cfg, pool_cfg, fee_buffer, dust_threshold })
    }

    fn funding_script(&self) -> Result<Vec<u8>, AnchorError> {
        crate::foundation::util::encoding::parse_hex_bytes(&self.funding.locking_script_hex)
    }

    /// Reconcile local resource records against the ledger's current
    /// unspent set for the funding identity. The ledger, not the local
    /// store, is the source of truth for "is this spent".
    pub async fn sync(&self) -> Result<SyncReport, AnchorError> {
        let storage = self.pool.storage();
        let height = self.pipeline.ledger().get_height().await?;
        let unspent = self.pipeline.ledger().list_unspent(&self.funding.identity).await?;
        let external: HashMap<Outpoint, _> = unspent.iter().map(|entry| (entry.outpoint, entry)).collect();

        let mut report = SyncReport::default();
        let now = now_millis();

        for entry in &unspent {
            if storage.get_resource(&entry.outpoint)?.is_some() {
                continue;
            }
            let confirmed = entry.confirmations >= self.ledger_cfg.min_confirmations;
            let status = if confirmed { ResourceStatus::Available } else { ResourceStatus::Unconfirmed };
            let inserted = storage.insert_resource(ResourceRecord {
                outpoint: entry.outpoint,
                amount: entry.amount,
                locking_script: entry.locking_script.clone(),
                key_identifier: self.funding.key_identifier.clone(),
                status,
                created_at_millis: now,
                updated_at_millis: now,
            })?;
            if inserted {
                debug!("sync discovered outpoint={} amount={} status={}", entry.outpoint, entry.amount, status);
                report.discovered += 1;
            }
        }

        for record in storage.list_resources(Some(ResourceStatus::Unconfirmed))? {
            match external.get(&record.outpoint) {
                Some(entry) if entry.confirmations >= self.ledger_cfg.min_confirmations => {
                    if storage.transition_resource(&record.outpoint, ResourceStatus::Unconfirmed, ResourceStatus::Available)? {
                        report.promoted += 1;
                    }
                }
                // Absent unconfirmed rows may simply not have propagated;
                // leave them for a later pass.
                _ => {}
            }
        }

        for record in storage.list_resources(Some(ResourceStatus::Available))? {
            if !external.contains_key(&record.outpoint) {
                if storage.transition_resource(&record.outpoint, ResourceStatus::Available, ResourceStatus::Spent)? {
                    warn!("sync marked spent (absent from ledger unspent set) outpoint={}", record.outpoint);
                    report.marked_spent += 1;
                }
            }
        }

        info!(
            "pool sync complete height={} discovered={} promoted={} marked_spent={}",
            height, report.discovered, report.promoted, report.marked_spent
        );
        Ok(report)
    }

    /// Consolidate accumulated dust into one output at the funding
    /// address. Triggers only once the dust count reaches the configured
    /// floor; sweeping too eagerly wastes more in fees than it reclaims.
    /// Only the qualifying sub-threshold rows are swept.
    pub async fn sweep_dust(&self) -> Result<SweepOutcome, AnchorError> {
        let storage = self.pool.storage();
        let dust: Vec<ResourceRecord> = storage
            .list_resources(Some(ResourceStatus::Available))?
            .into_iter()
            .filter(|record| record.amount < self.dust_threshold)
            .collect();

        if dust.len() < self.pool_cfg.dust_sweep_floor {
            debug!("dust sweep below floor count={} floor={}", dust.len(), self.pool_cfg.dust_sweep_floor);
            return Ok(SweepOutcome::Skipped { reason: "below_floor" });
        }

        // Each row is taken with its own conditional update; rows lost to
        // concurrent callers are simply left out.
        let mut locked: Vec<ResourceRecord> = Vec::with_capacity(dust.len());
        for mut record in dust {
            if storage.transition_resource(&record.outpoint, ResourceStatus::Available, ResourceStatus::Locked)? {
                record.status = ResourceStatus::Locked;
                locked.push(record);
            }
        }
        if locked.is_empty() {
            return Ok(SweepOutcome::Skipped { reason: "no_dust_lockable" });
        }

        let total: u64 = locked.iter().map(|record| record.amount).sum();
        let result = self.sweep_locked(&locked).await;
        match result {
            Ok(()) => {
                self.pool.spend_many(&locked)?;
                info!("dust swept inputs={} consolidated_amount={}", locked.len(), total);
                // The consolidated output is imported by the next sync().
                Ok(SweepOutcome::Swept { inputs: locked.len(), consolidated_amount: total })
            }
            Err(err) => {
                self.pool.unlock_many(&locked)?;
                Err(err)
            }
        }
    }

    async fn sweep_locked(&self, locked: &[ResourceRecord]) -> Result<(), AnchorError> {
        let change_script = self.funding_script()?;
        // No data outputs: everything net of fees becomes the change
        // output at the funding address.
        let mut built = self.pipeline.build(locked, vec![], vec![], change_script)?;
        self.pipeline.sign(&mut built, locked).await?;
        self.pipeline.broadcast(&built).await?;
        Ok(())
    }

    /// Replenish the pool by splitting one large resource into
    /// `deficit` equal outputs. Runs under the maintenance lease with a
    /// heartbeat, since wall-clock duration can exceed a naive fixed TTL.
    /// Skips (not fails) when the lease is held elsewhere or no single
    /// resource is large enough.
    pub async fn split_if_needed(&self) -> Result<SplitOutcome, AnchorError> {
        let ttl = Duration::from_secs(self.pool_cfg.maintenance_ttl_secs);
        let outcome = self
            .locks
            .with_heartbeat(POOL_MAINTENANCE_LOCK, ttl, || self.split_under_lease())
            .await?;
        match outcome {
            LockOutcome::Skipped => {
                debug!("split skipped, maintenance lease held elsewhere");
                Ok(SplitOutcome::Skipped { reason: "lock_held" })
            }
            LockOutcome::Completed(result) => Ok(result),
        }
    }

    async fn split_under_lease(&self) -> Result<SplitOutcome, AnchorError> {
        let available = self.pool.available_count()?;
        let deficit = self.pool_cfg.min_pool_size.saturating_sub(available).min(self.pool_cfg.max_split_outputs);
        if deficit == 0 {
            return Ok(SplitOutcome::Skipped { reason: "pool_full" });
        }

        let required = (deficit as u64)
            .checked_mul(self.pool_cfg.split_output_amount)
            .and_then(|value| value.checked_add(self.fee_buffer))
            .ok_or_else(|| AnchorError::EncodingError("split size overflow".to_string()))?;

        // A single input keeps the transaction's complexity bounded.
        let Some(source) = self.pool.select_and_lock(required)? else {
            info!("split skipped, no single resource covers required={} deficit={}", required, deficit);
            return Ok(SplitOutcome::Skipped { reason: "no_large_resource_available" });
        };

        let result = self.split_locked(&source, deficit).await;
        match result {
            Ok(()) => {
                self.pool.spend_many(std::slice::from_ref(&source))?;
                info!("pool split complete outputs={} source={}", deficit, source.outpoint);
                Ok(SplitOutcome::Split { outputs: deficit, source: source.outpoint })
            }
            Err(err) => {
                self.pool.unlock_many(std::slice::from_ref(&source))?;
                Err(err)
            }
        }
    }

    async fn split_locked(&self, source: &ResourceRecord, deficit: usize) -> Result<(), AnchorError> {
        let funding_script = self.funding_script()?;
        let outputs: Vec<TxOutput> = (0..deficit)
            .map(|_| TxOutput { value: self.pool_cfg.split_output_amount, script_pubkey: funding_script.clone() })
            .collect();

        let sources = std::slice::from_ref(source);
        let mut built = self.pipeline.build(sources, vec![], outputs, funding_script.clone())?;
        self.pipeline.sign(&mut built, sources).await?;
        let txid = self.pipeline.broadcast(&built).await?;

        // Register the fresh outputs immediately as unconfirmed; sync()
        // promotes them once the confirmation threshold is met.
        let storage = self.pool.storage();
        let now = now_millis();
        for (vout, output) in built.transaction.outputs.iter().enumerate() {
            if output.script_pubkey != funding_script || output.value == 0 {
                continue;
            }
            storage.insert_resource(ResourceRecord {
                outpoint: Outpoint::new(txid, vout as u32),
                amount: output.value,
                locking_script: output.script_pubkey.clone(),
                key_identifier: self.funding.key_identifier.clone(),
                status: ResourceStatus::Unconfirmed,
                created_at_millis: now,
                updated_at_millis: now,
            })?;
        }
        Ok(())
    }

    /// Orphan recovery plus reconciliation, intended for an interval
    /// driver. Never takes the lease for longer than one pass.
    pub async fn run_maintenance_pass(&self) -> Result<(), AnchorError> {
        self.pool.reap_orphans(self.pool_cfg.reap_after_minutes, self.pool_cfg.reap_limit)?;
        self.sync().await?;
        match self.sweep_dust().await {
            Ok(outcome) => debug!("sweep outcome={:?}", outcome),
            Err(err) => warn!("dust sweep failed error={}", err),
        }
        match self.split_if_needed().await {
            Ok(outcome) => debug!("split outcome={:?}", outcome),
            Err(err) => warn!("pool split failed error={}", err),
        }
        Ok(())
    }
}
