//! RocksDB-backed storage engine.
//!
//! # Lock Semantics
//!
//! RocksDB itself is thread-safe, but the conditional resource updates and
//! the multi-record confirmation are read-modify-write sequences, so they
//! run under coarse mutexes:
//!
//! - `resource_lock`: guards every conditional resource mutation
//!   (`lock_best_available`, `transition_resource`, the reaper).
//! - `record_lock`: guards pointer advancement and the confirmation batch.
//!
//! When in doubt, acquire at most one lock at a time.
//!
//! # Column Families
//!
//! See `schema.rs` for column family names and key prefixes.

pub mod schema;

use crate::domain::{OwnershipPointer, PendingRecord, PendingStatus, ResourceRecord, ResourceStatus};
use crate::foundation::{now_millis, AnchorError, Outpoint, PendingId, Txid, UidTag};
use crate::infrastructure::storage::{Storage, StorageCapabilities};
use crate::storage_err;
use bincode::Options;
use log::{debug, info, trace};
use rocksdb::{ColumnFamily, IteratorMode, Options as DbOptions, WriteBatch, DB};
use schema::*;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::{env, fs};

const SCHEMA_VERSION: u32 = 1;

pub struct RocksStorage {
    db: Arc<DB>,
    resource_lock: Mutex<()>,
    record_lock: Mutex<()>,
}

impl RocksStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnchorError> {
        let path = path.as_ref();
        debug!("opening RocksStorage path={}", path.display());
        let mut opts = DbOptions::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let db = DB::open_cf(&opts, path, ALL_COLUMN_FAMILIES)?;
        let storage = Self { db: Arc::new(db), resource_lock: Mutex::new(()), record_lock: Mutex::new(()) };
        storage.maybe_run_migrations()?;
        info!("RocksStorage opened path={}", path.display());
        Ok(storage)
    }

    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self, AnchorError> {
        let dir = data_dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Self::open_default();
        }
        fs::create_dir_all(dir).map_err(|err| storage_err!("fs::create_dir_all open_in_dir", err))?;
        Self::open(dir.join("anchor-store"))
    }

    pub fn open_default() -> Result<Self, AnchorError> {
        let base = env::current_dir().map_err(|err| storage_err!("env::current_dir", err))?;
        let dir = base.join(".anchor");
        fs::create_dir_all(&dir).map_err(|err| storage_err!("fs::create_dir_all default_dir", err))?;
        Self::open(dir.join("anchor-store"))
    }

    fn maybe_run_migrations(&self) -> Result<(), AnchorError> {
        match self.schema_version()? {
            None => {
                info!("initializing fresh db schema schema_version={}", SCHEMA_VERSION);
                self.set_schema_version(SCHEMA_VERSION)
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(AnchorError::StorageError {
                operation: "schema check".to_string(),
                details: format!("schema mismatch: stored={} current={}", v, SCHEMA_VERSION),
            }),
        }
    }

    fn schema_version(&self) -> Result<Option<u32>, AnchorError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, b"schema_version") {
            Ok(Some(bytes)) if bytes.len() == 4 => {
                let array: [u8; 4] = bytes.as_slice().try_into().map_err(|_| AnchorError::StorageError {
                    operation: "schema_version decode".to_string(),
                    details: "corrupt schema version".to_string(),
                })?;
                Ok(Some(u32::from_be_bytes(array)))
            }
            Ok(Some(_)) => Err(AnchorError::StorageError {
                operation: "schema_version decode".to_string(),
                details: "corrupt schema version".to_string(),
            }),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err!("rocksdb get_cf schema_version", e)),
        }
    }

    fn set_schema_version(&self, version: u32) -> Result<(), AnchorError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.put_cf(cf, b"schema_version", version.to_be_bytes()).map_err(AnchorError::from)
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily, AnchorError> {
        self.db.cf_handle(name).ok_or_else(|| AnchorError::StorageError {
            operation: "rocksdb cf_handle".to_string(),
            details: format!("missing column family: {}", name),
        })
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, AnchorError> {
        bincode::DefaultOptions::new().with_fixint_encoding().serialize(value).map_err(|err| err.into())
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, AnchorError> {
        bincode::DefaultOptions::new().with_fixint_encoding().deserialize(bytes).map_err(|err| err.into())
    }

    fn key_resource(outpoint: &Outpoint) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + 32 + 4).prefix(b"res:").hash32(outpoint.txid.as_bytes()).u32_be(outpoint.vout).build()
    }

    fn key_pending(id: &PendingId) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + id.len()).prefix(b"pnd:").str(id.as_str()).build()
    }

    fn key_pointer(uid_tag: &UidTag) -> Vec<u8> {
        KeyBuilder::with_capacity(4 + uid_tag.len()).prefix(b"ptr:").str(uid_tag.as_str()).build()
    }

    /// Secondary index enforcing `current_txid` uniqueness across pointers.
    fn key_pointer_txid(txid: &Txid) -> Vec<u8> {
        KeyBuilder::with_capacity(7 + 32).prefix(b"ptr_tx:").hash32(txid.as_bytes()).build()
    }

    fn lock_guard<'a>(&self, lock: &'a Mutex<()>, what: &str) -> Result<MutexGuard<'a, ()>, AnchorError> {
        lock.lock().map_err(|_| AnchorError::StorageError { operation: what.to_string(), details: "poisoned".to_string() })
    }

    fn scan_resources(&self) -> Result<Vec<ResourceRecord>, AnchorError> {
        let cf = self.cf_handle(CF_RESOURCE)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|err| storage_err!("rocksdb iterator", err))?;
            records.push(Self::decode::<ResourceRecord>(&value)?);
        }
        Ok(records)
    }

    fn put_resource(&self, record: &ResourceRecord) -> Result<(), AnchorError> {
        let cf = self.cf_handle(CF_RESOURCE)?;
        self.db.put_cf(cf, Self::key_resource(&record.outpoint), Self::encode(record)?).map_err(|err| storage_err!("rocksdb", err))
    }

    /// Write the pointer row and its unique-txid index entry into `batch`,
    /// clearing the old index entry when the head moves.
    fn stage_pointer_write(&self, batch: &mut WriteBatch, previous: Option<&OwnershipPointer>, pointer: &OwnershipPointer) -> Result<(), AnchorError> {
        let cf = self.cf_handle(CF_POINTER)?;
        if let Some(old) = previous {
            if old.current_txid != pointer.current_txid {
                batch.delete_cf(cf, Self::key_pointer_txid(&old.current_txid));
            }
        }
        batch.put_cf(cf, Self::key_pointer(&pointer.uid_tag), Self::encode(pointer)?);
        batch.put_cf(cf, Self::key_pointer_txid(&pointer.current_txid), pointer.uid_tag.as_str().as_bytes());
        Ok(())
    }
}

impl Storage for RocksStorage {
    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities { transactional: true }
    }

    fn insert_resource(&self, record: ResourceRecord) -> Result<bool, AnchorError> {
        let _guard = self.lock_guard(&self.resource_lock, "rocks resource lock")?;
        let cf = self.cf_handle(CF_RESOURCE)?;
        let key = Self::key_resource(&record.outpoint);
        if self.db.get_cf(cf, &key).map_err(|e| storage_err!("rocksdb get_cf resource_exists", e))?.is_some() {
            return Ok(false);
        }
        trace!("insert_resource outpoint={} amount={} status={}", record.outpoint, record.amount, record.status);
        self.db.put_cf(cf, key, Self::encode(&record)?).map_err(|err| storage_err!("rocksdb", err))?;
        Ok(true)
    }

    fn get_resource(&self, outpoint: &Outpoint) -> Result<Option<ResourceRecord>, AnchorError> {
        let cf = self.cf_handle(CF_RESOURCE)?;
        let value = self.db.get_cf(cf, Self::key_resource(outpoint)).map_err(|err| storage_err!("rocksdb", err))?;
        match value {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list_resources(&self, status: Option<ResourceStatus>) -> Result<Vec<ResourceRecord>, AnchorError> {
        Ok(self
            .scan_resources()?
            .into_iter()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .collect())
    }

    fn count_resources(&self, status: ResourceStatus) -> Result<usize, AnchorError> {
        Ok(self.scan_resources()?.into_iter().filter(|record| record.status == status).count())
    }

    fn lock_best_available(&self, min_amount: u64) -> Result<Option<ResourceRecord>, AnchorError> {
        let _guard = self.lock_guard(&self.resource_lock, "rocks resource lock")?;
        let candidate = self
            .scan_resources()?
            .into_iter()
            .filter(|record| record.status == ResourceStatus::Available && record.amount >= min_amount)
            .min_by_key(|record| (record.amount, record.outpoint));
        let Some(mut record) = candidate else {
            return Ok(None);
        };
        record.status = ResourceStatus::Locked;
        record.updated_at_millis = now_millis();
        self.put_resource(&record)?;
        debug!("resource locked outpoint={} amount={}", record.outpoint, record.amount);
        Ok(Some(record))
    }

    fn lock_largest_available(&self) -> Result<Option<ResourceRecord>, AnchorError> {
        let _guard = self.lock_guard(&self.resource_lock, "rocks resource lock")?;
        let candidate = self
            .scan_resources()?
            .into_iter()
            .filter(|record| record.status == ResourceStatus::Available)
            .max_by_key(|record| (record.amount, record.outpoint));
        let Some(mut record) = candidate else {
            return Ok(None);
        };
        record.status = ResourceStatus::Locked;
        record.updated_at_millis = now_millis();
        self.put_resource(&record)?;
        debug!("resource locked outpoint={} amount={}", record.outpoint, record.amount);
        Ok(Some(record))
    }

    fn transition_resource(&self, outpoint: &Outpoint, from: ResourceStatus, to: ResourceStatus) -> Result<bool, AnchorError> {
        if !from.can_transition_to(to) {
            return Err(AnchorError::InvalidStateTransition { from: from.to_string(), to: to.to_string() });
        }
        let _guard = self.lock_guard(&self.resource_lock, "rocks resource lock")?;
        let mut record = self
            .get_resource(outpoint)?
            .ok_or(AnchorError::ResourceMissing { outpoint: outpoint.to_string() })?;
        if record.status != from {
            return Ok(false);
        }
        record.status = to;
        record.updated_at_millis = now_millis();
        self.put_resource(&record)?;
        trace!("resource transition outpoint={} from={} to={}", outpoint, from, to);
        Ok(true)
    }

    fn reap_locked_older_than(&self, cutoff_millis: u64, limit: usize) -> Result<usize, AnchorError> {
        let _guard = self.lock_guard(&self.resource_lock, "rocks resource lock")?;
        let stale: Vec<ResourceRecord> = self
            .scan_resources()?
            .into_iter()
            .filter(|record| record.status == ResourceStatus::Locked && record.updated_at_millis < cutoff_millis)
            .take(limit)
            .collect();
        let mut reaped = 0usize;
        for mut record in stale {
            record.status = ResourceStatus::Available;
            record.updated_at_millis = now_millis();
            self.put_resource(&record)?;
            reaped += 1;
        }
        Ok(reaped)
    }

    fn insert_pending(&self, record: PendingRecord) -> Result<(), AnchorError> {
        let cf = self.cf_handle(CF_PENDING)?;
        debug!("insert_pending id={} kind={} uid_tag={}", record.id, record.kind, record.uid_tag);
        self.db.put_cf(cf, Self::key_pending(&record.id), Self::encode(&record)?).map_err(|err| storage_err!("rocksdb", err))
    }

    fn get_pending(&self, id: &PendingId) -> Result<Option<PendingRecord>, AnchorError> {
        let cf = self.cf_handle(CF_PENDING)?;
        let value = self.db.get_cf(cf, Self::key_pending(id)).map_err(|err| storage_err!("rocksdb", err))?;
        match value {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update_pending(&self, record: &PendingRecord) -> Result<(), AnchorError> {
        let cf = self.cf_handle(CF_PENDING)?;
        let key = Self::key_pending(&record.id);
        if self.db.get_cf(cf, &key).map_err(|e| storage_err!("rocksdb get_cf pending_exists", e))?.is_none() {
            return Err(AnchorError::PendingRecordMissing(record.id.to_string()));
        }
        self.db.put_cf(cf, key, Self::encode(record)?).map_err(|err| storage_err!("rocksdb", err))
    }

    fn list_pending(&self, status: Option<PendingStatus>) -> Result<Vec<PendingRecord>, AnchorError> {
        let cf = self.cf_handle(CF_PENDING)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|err| storage_err!("rocksdb iterator", err))?;
            let record: PendingRecord = Self::decode(&value)?;
            if status.map_or(true, |wanted| record.status == wanted) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn get_pointer(&self, uid_tag: &UidTag) -> Result<Option<OwnershipPointer>, AnchorError> {
        let cf = self.cf_handle(CF_POINTER)?;
        let value = self.db.get_cf(cf, Self::key_pointer(uid_tag)).map_err(|err| storage_err!("rocksdb", err))?;
        match value {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn upsert_pointer(&self, pointer: OwnershipPointer) -> Result<(), AnchorError> {
        let _guard = self.lock_guard(&self.record_lock, "rocks record lock")?;
        let previous = self.get_pointer(&pointer.uid_tag)?;
        let mut batch = WriteBatch::default();
        self.stage_pointer_write(&mut batch, previous.as_ref(), &pointer)?;
        self.db.write(batch).map_err(|err| storage_err!("rocksdb", err))
    }

    fn advance_pointer_if_current(&self, expected_current: &Txid, pointer: OwnershipPointer) -> Result<bool, AnchorError> {
        let _guard = self.lock_guard(&self.record_lock, "rocks record lock")?;
        let existing = self.get_pointer(&pointer.uid_tag)?;
        match existing {
            Some(current) if current.current_txid == *expected_current => {
                let mut batch = WriteBatch::default();
                self.stage_pointer_write(&mut batch, Some(&current), &pointer)?;
                self.db.write(batch).map_err(|err| storage_err!("rocksdb", err))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn confirm_transactional(&self, pending: &PendingRecord, pointer: &OwnershipPointer) -> Result<(), AnchorError> {
        let _guard = self.lock_guard(&self.record_lock, "rocks record lock")?;
        let previous = self.get_pointer(&pointer.uid_tag)?;
        let mut batch = WriteBatch::default();
        self.stage_pointer_write(&mut batch, previous.as_ref(), pointer)?;
        let pending_cf = self.cf_handle(CF_PENDING)?;
        batch.put_cf(pending_cf, Self::key_pending(&pending.id), Self::encode(pending)?);
        self.db.write(batch).map_err(|err| storage_err!("rocksdb", err))?;
        debug!(
            "confirmed atomically pending_id={} uid_tag={} txid={}",
            pending.id,
            pointer.uid_tag,
            pointer.current_txid
        );
        Ok(())
    }

    fn confirm_transfer_transactional(
        &self,
        pending: &PendingRecord,
        expected_current: &Txid,
        pointer: &OwnershipPointer,
    ) -> Result<bool, AnchorError> {
        let _guard = self.lock_guard(&self.record_lock, "rocks record lock")?;
        let previous = self.get_pointer(&pointer.uid_tag)?;
        match previous {
            Some(current) if current.current_txid == *expected_current => {
                let mut batch = WriteBatch::default();
                self.stage_pointer_write(&mut batch, Some(&current), pointer)?;
                let pending_cf = self.cf_handle(CF_PENDING)?;
                batch.put_cf(pending_cf, Self::key_pending(&pending.id), Self::encode(pending)?);
                self.db.write(batch).map_err(|err| storage_err!("rocksdb", err))?;
                debug!(
                    "transfer confirmed atomically pending_id={} uid_tag={} txid={}",
                    pending.id,
                    pointer.uid_tag,
                    pointer.current_txid
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
