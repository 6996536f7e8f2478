use crate::domain::{OwnershipPointer, PendingRecord, PendingStatus, ResourceRecord, ResourceStatus};
use crate::foundation::{AnchorError, Outpoint, PendingId, UidTag};

pub type Result<T> = std::result::Result<T, AnchorError>;

/// Capabilities probed once at startup and logged; never inferred from
/// error text at a call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageCapabilities {
    /// Whether `confirm_transactional` commits the ownership-pointer write
    /// and the pending-record flip as one atomic unit.
    pub transactional: bool,
}

/// Persistent store for the three collections: funding resources, pending
/// records and ownership pointers.
///
/// Every resource mutation is a single conditional update; callers never
/// read-then-write a status outside one of these primitives.
pub trait Storage: Send + Sync {
    fn capabilities(&self) -> StorageCapabilities;

    // =====================================================================
    // Funding resources
    // =====================================================================

    /// Insert a newly observed resource. Returns `Ok(false)` if the
    /// outpoint already exists (the pool is keyed by outpoint, globally
    /// unique).
    fn insert_resource(&self, record: ResourceRecord) -> Result<bool>;

    fn get_resource(&self, outpoint: &Outpoint) -> Result<Option<ResourceRecord>>;

    fn list_resources(&self, status: Option<ResourceStatus>) -> Result<Vec<ResourceRecord>>;

    fn count_resources(&self, status: ResourceStatus) -> Result<usize>;

    /// Atomically lock the smallest `available` resource with
    /// `amount >= min_amount` (best fit). `Ok(None)` when nothing
    /// qualifies; that is starvation, not an error.
    fn lock_best_available(&self, min_amount: u64) -> Result<Option<ResourceRecord>>;

    /// Atomically lock the largest `available` resource.
    fn lock_largest_available(&self) -> Result<Option<ResourceRecord>>;

    /// One conditional status update: succeeds only if the row currently
    /// holds `from`. Returns `Ok(false)` when the precondition no longer
    /// holds (lost race), `Err` when the row is missing.
    fn transition_resource(&self, outpoint: &Outpoint, from: ResourceStatus, to: ResourceStatus) -> Result<bool>;

    /// Convert `locked` rows older than `cutoff_millis` back to
    /// `available`, at most `limit` rows. Idempotent; safe under
    /// concurrent traffic.
    fn reap_locked_older_than(&self, cutoff_millis: u64, limit: usize) -> Result<usize>;

    // =====================================================================
    // Pending records
    // =====================================================================

    fn insert_pending(&self, record: PendingRecord) -> Result<()>;

    fn get_pending(&self, id: &PendingId) -> Result<Option<PendingRecord>>;

    fn update_pending(&self, record: &PendingRecord) -> Result<()>;

    fn list_pending(&self, status: Option<PendingStatus>) -> Result<Vec<PendingRecord>>;

    // =====================================================================
    // Ownership pointers
    // =====================================================================

    fn get_pointer(&self, uid_tag: &UidTag) -> Result<Option<OwnershipPointer>>;

    fn upsert_pointer(&self, pointer: OwnershipPointer) -> Result<()>;

    /// Optimistic-concurrency advancement: writes `pointer` only if the
    /// stored row's `current_txid` still equals `expected_current`.
    /// Returns `Ok(false)` when the expectation no longer holds.
    fn advance_pointer_if_current(&self, expected_current: &crate::foundation::Txid, pointer: OwnershipPointer) -> Result<bool>;

    // =====================================================================
    // Atomic confirmation
    // =====================================================================

    /// Write the ownership pointer and the flipped pending record as one
    /// atomic unit. Only meaningful when `capabilities().transactional`;
    /// best-effort stores return `Unimplemented` and the caller falls back
    /// to sequential writes (loudly).
    fn confirm_transactional(&self, pending: &PendingRecord, pointer: &OwnershipPointer) -> Result<()>;

    /// Transfer variant: the same atomic unit, with the pointer write
    /// conditioned on `current_txid == expected_current` evaluated inside
    /// the store's critical section. `Ok(false)` reports the lost race
    /// with nothing written.
    fn confirm_transfer_transactional(
        &self,
        pending: &PendingRecord,
        expected_current: &crate::foundation::Txid,
        pointer: &OwnershipPointer,
    ) -> Result<bool>;

    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
