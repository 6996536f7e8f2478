use crate::domain::{OwnershipPointer, PendingRecord, PendingStatus, ResourceRecord, ResourceStatus};
use crate::foundation::{now_millis, AnchorError, Outpoint, PendingId, Txid, UidTag};
use crate::infrastructure::storage::{Storage, StorageCapabilities};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

struct MemoryInner {
    resources: HashMap<Outpoint, ResourceRecord>,
    pending: HashMap<PendingId, PendingRecord>,
    pointers: HashMap<UidTag, OwnershipPointer>,
}

impl MemoryInner {
    fn new() -> Self {
        Self { resources: HashMap::new(), pending: HashMap::new(), pointers: HashMap::new() }
    }
}

/// In-memory storage twin: the whole store behind one mutex, so every
/// conditional update is trivially atomic. Reports `transactional=false`
/// to exercise the best-effort confirmation path.
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryInner::new())) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>, AnchorError> {
        self.inner.lock().map_err(|_| AnchorError::StorageError {
            operation: "memory storage lock".to_string(),
            details: "poisoned".to_string(),
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities { transactional: false }
    }

    fn insert_resource(&self, record: ResourceRecord) -> Result<bool, AnchorError> {
        let mut inner = self.lock_inner()?;
        if inner.resources.contains_key(&record.outpoint) {
            return Ok(false);
        }
        inner.resources.insert(record.outpoint, record);
        Ok(true)
    }

    fn get_resource(&self, outpoint: &Outpoint) -> Result<Option<ResourceRecord>, AnchorError> {
        Ok(self.lock_inner()?.resources.get(outpoint).cloned())
    }

    fn list_resources(&self, status: Option<ResourceStatus>) -> Result<Vec<ResourceRecord>, AnchorError> {
        let inner = self.lock_inner()?;
        Ok(inner
            .resources
            .values()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }

    fn count_resources(&self, status: ResourceStatus) -> Result<usize, AnchorError> {
        Ok(self.lock_inner()?.resources.values().filter(|record| record.status == status).count())
    }

    fn lock_best_available(&self, min_amount: u64) -> Result<Option<ResourceRecord>, AnchorError> {
        let mut inner = self.lock_inner()?;
        let candidate = inner
            .resources
            .values()
            .filter(|record| record.status == ResourceStatus::Available && record.amount >= min_amount)
            .min_by_key(|record| (record.amount, record.outpoint))
            .map(|record| record.outpoint);
        let Some(outpoint) = candidate else {
            return Ok(None);
        };
        let record = inner.resources.get_mut(&outpoint).ok_or(AnchorError::ResourceMissing { outpoint: outpoint.to_string() })?;
        record.status = ResourceStatus::Locked;
        record.updated_at_millis = now_millis();
        Ok(Some(record.clone()))
    }

    fn lock_largest_available(&self) -> Result<Option<ResourceRecord>, AnchorError> {
        let mut inner = self.lock_inner()?;
        let candidate = inner
            .resources
            .values()
            .filter(|record| record.status == ResourceStatus::Available)
            .max_by_key(|record| (record.amount, record.outpoint))
            .map(|record| record.outpoint);
        let Some(outpoint) = candidate else {
            return Ok(None);
        };
        let record = inner.resources.get_mut(&outpoint).ok_or(AnchorError::ResourceMissing { outpoint: outpoint.to_string() })?;
        record.status = ResourceStatus::Locked;
        record.updated_at_millis = now_millis();
        Ok(Some(record.clone()))
    }

    fn transition_resource(&self, outpoint: &Outpoint, from: ResourceStatus, to: ResourceStatus) -> Result<bool, AnchorError> {
        if !from.can_transition_to(to) {
            return Err(AnchorError::InvalidStateTransition { from: from.to_string(), to: to.to_string() });
        }
        let mut inner = self.lock_inner()?;
        let record = inner
            .resources
            .get_mut(outpoint)
            .ok_or(AnchorError::ResourceMissing { outpoint: outpoint.to_string() })?;
        if record.status != from {
            return Ok(false);
        }
        record.status = to;
        record.updated_at_millis = now_millis();
        Ok(true)
    }

    fn reap_locked_older_than(&self, cutoff_millis: u64, limit: usize) -> Result<usize, AnchorError> {
        let mut inner = self.lock_inner()?;
        let mut reaped = 0usize;
        let stale: Vec<Outpoint> = inner
            .resources
            .values()
            .filter(|record| record.status == ResourceStatus::Locked && record.updated_at_millis < cutoff_millis)
            .map(|record| record.outpoint)
            .collect();
        for outpoint in stale.into_iter().take(limit) {
            if let Some(record) = inner.resources.get_mut(&outpoint) {
                record.status = ResourceStatus::Available;
                record.updated_at_millis = now_millis();
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    fn insert_pending(&self, record: PendingRecord) -> Result<(), AnchorError> {
        let mut inner = self.lock_inner()?;
        inner.pending.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_pending(&self, id: &PendingId) -> Result<Option<PendingRecord>, AnchorError> {
        Ok(self.lock_inner()?.pending.get(id).cloned())
    }

    fn update_pending(&self, record: &PendingRecord) -> Result<(), AnchorError> {
        let mut inner = self.lock_inner()?;
        if !inner.pending.contains_key(&record.id) {
            return Err(AnchorError::PendingRecordMissing(record.id.to_string()));
        }
        inner.pending.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn list_pending(&self, status: Option<PendingStatus>) -> Result<Vec<PendingRecord>, AnchorError> {
        let inner = self.lock_inner()?;
        Ok(inner
            .pending
            .values()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }

    fn get_pointer(&self, uid_tag: &UidTag) -> Result<Option<OwnershipPointer>, AnchorError> {
        Ok(self.lock_inner()?.pointers.get(uid_tag).cloned())
    }

    fn upsert_pointer(&self, pointer: OwnershipPointer) -> Result<(), AnchorError> {
        let mut inner = self.lock_inner()?;
        inner.pointers.insert(pointer.uid_tag.clone(), pointer);
        Ok(())
    }

    fn advance_pointer_if_current(&self, expected_current: &Txid, pointer: OwnershipPointer) -> Result<bool, AnchorError> {
        let mut inner = self.lock_inner()?;
        match inner.pointers.get(&pointer.uid_tag) {
            Some(existing) if existing.current_txid == *expected_current => {
                inner.pointers.insert(pointer.uid_tag.clone(), pointer);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn confirm_transactional(&self, _pending: &PendingRecord, _pointer: &OwnershipPointer) -> Result<(), AnchorError> {
        Err(AnchorError::Unimplemented("atomic multi-record writes are not supported by MemoryStorage".to_string()))
    }

    fn confirm_transfer_transactional(
        &self,
        _pending: &PendingRecord,
        _expected_current: &Txid,
        _pointer: &OwnershipPointer,
    ) -> Result<bool, AnchorError> {
        Err(AnchorError::Unimplemented("atomic multi-record writes are not supported by MemoryStorage".to_string()))
    }
}
