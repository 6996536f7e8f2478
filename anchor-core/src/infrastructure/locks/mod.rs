//! Token-authenticated, TTL-bounded mutual exclusion usable by any number
//! of independent processes.
//!
//! The trait is the seam for an external distributed store; the in-crate
//! memory implementation covers single-instance deployments and tests.

use crate::foundation::{AnchorError, LockToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, AnchorError>;

pub trait LockStore: Send + Sync {
    /// Set-if-absent with a TTL. Returns `Ok(false)` when another live
    /// holder owns the key.
    fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool>;

    /// Compare-then-delete guarded by token equality. Returns `Ok(false)`
    /// when the key is absent, expired, or held with a different token.
    fn release(&self, key: &str, token: &LockToken) -> Result<bool>;

    /// Compare-then-reset-TTL guarded by token equality. Same return
    /// contract as `release`.
    fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool>;
}

struct LeaseEntry {
    token: LockToken,
    expires_at: Instant,
}

/// Expiry-aware map under one mutex; each operation is a single
/// compare-then-act, which is exactly the atomicity the trait demands.
pub struct MemoryLockStore {
    leases: Mutex<HashMap<String, LeaseEntry>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self { leases: Mutex::new(HashMap::new()) }
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStore for MemoryLockStore {
    fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get(key) {
            Some(entry) if entry.expires_at > now => Ok(false),
            _ => {
                leases.insert(key.to_string(), LeaseEntry { token: token.clone(), expires_at: now + ttl });
                Ok(true)
            }
        }
    }

    fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get(key) {
            Some(entry) if entry.expires_at > now && entry.token == *token => {
                leases.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> Result<bool> {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get_mut(key) {
            Some(entry) if entry.expires_at > now && entry.token == *token => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
