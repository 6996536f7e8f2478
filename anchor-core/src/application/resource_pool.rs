use crate::domain::{ResourceRecord, ResourceStatus};
use crate::foundation::{now_millis, AnchorError, MILLIS_PER_MINUTE};
use crate::infrastructure::storage::Storage;
use log::{debug, info, warn};
use std::sync::Arc;

/// Funding-pool operations over the storage trait's atomic primitives.
///
/// Every mutation here is one conditional update in the store; this layer
/// only adds accumulation, compensation and logging.
pub struct ResourcePool {
    storage: Arc<dyn Storage>,
}

impl ResourcePool {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Lock the best-fit available resource with `amount >= min_amount`.
    /// `None` means starvation, not failure.
    pub fn select_and_lock(&self, min_amount: u64) -> Result<Option<ResourceRecord>, AnchorError> {
        let locked = self.storage.lock_best_available(min_amount)?;
        if let Some(record) = &locked {
            debug!("resource locked outpoint={} amount={} min_amount={}", record.outpoint, record.amount, min_amount);
        }
        Ok(locked)
    }

    /// Lock largest-first until the accumulated amount covers
    /// `min_total + fee_buffer`. On starvation every row taken by this
    /// call is unlocked before the error surfaces; no partial hold may
    /// outlive a failed call.
    pub fn select_and_lock_many(&self, min_total: u64, fee_buffer: u64) -> Result<Vec<ResourceRecord>, AnchorError> {
        let required = min_total.saturating_add(fee_buffer);
        let mut taken: Vec<ResourceRecord> = Vec::new();
        let mut accumulated: u64 = 0;

        while accumulated < required {
            match self.storage.lock_largest_available()? {
                Some(record) => {
                    accumulated = accumulated.saturating_add(record.amount);
                    taken.push(record);
                }
                None => {
                    warn!(
                        "funding starvation required={} accumulated={} taken_count={}",
                        required,
                        accumulated,
                        taken.len()
                    );
                    self.unlock_many(&taken)?;
                    return Err(AnchorError::InsufficientFunds { required, available: accumulated });
                }
            }
        }

        debug!("resources locked count={} accumulated={} required={}", taken.len(), accumulated, required);
        Ok(taken)
    }

    /// Terminal transition after a successful broadcast.
    pub fn spend_many(&self, records: &[ResourceRecord]) -> Result<(), AnchorError> {
        for record in records {
            if !self.storage.transition_resource(&record.outpoint, ResourceStatus::Locked, ResourceStatus::Spent)? {
                // Row moved under us; the reaper or a concurrent spend won.
                warn!("spend skipped, row no longer locked outpoint={}", record.outpoint);
            }
        }
        Ok(())
    }

    /// Compensating transition after a failed pipeline run.
    pub fn unlock_many(&self, records: &[ResourceRecord]) -> Result<(), AnchorError> {
        for record in records {
            if !self.storage.transition_resource(&record.outpoint, ResourceStatus::Locked, ResourceStatus::Available)? {
                warn!("unlock skipped, row no longer locked outpoint={}", record.outpoint);
            }
        }
        Ok(())
    }

    /// Recover rows locked by a crashed process. The only path besides
    /// `unlock_many` that releases a lock, and it is time-gated.
    pub fn reap_orphans(&self, older_than_minutes: u64, limit: usize) -> Result<usize, AnchorError> {
        let cutoff = now_millis().saturating_sub(older_than_minutes.saturating_mul(MILLIS_PER_MINUTE));
        let reaped = self.storage.reap_locked_older_than(cutoff, limit)?;
        if reaped > 0 {
            info!("orphaned resources reaped count={} older_than_minutes={}", reaped, older_than_minutes);
        }
        Ok(reaped)
    }

    pub fn available_count(&self) -> Result<usize, AnchorError> {
        self.storage.count_resources(ResourceStatus::Available)
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}
