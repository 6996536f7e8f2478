use crate::foundation::{AnchorError, LockToken, HEARTBEAT_MAX_INTERVAL_SECS, HEARTBEAT_MIN_INTERVAL_SECS};
use crate::infrastructure::locks::LockStore;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Result of a lease-guarded operation. A skip is benign: some other
/// instance is doing the work.
#[derive(Debug)]
pub enum LockOutcome<T> {
    Skipped,
    Completed(T),
}

impl<T> LockOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, LockOutcome::Skipped)
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Distributed mutual exclusion over a `LockStore`.
///
/// `UNLOCKED -> HELD(token) -> UNLOCKED`, where the release edge fires on
/// a token-matched release or passively on TTL expiry. The heartbeat and
/// the lease both die with the process, so a crash yields natural
/// recovery once the TTL lapses.
pub struct LockService {
    store: Arc<dyn LockStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    pub fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, AnchorError> {
        let token = LockToken::generate();
        if self.store.try_acquire(name, &token, ttl)? {
            debug!("lease acquired name={} ttl_ms={}", name, ttl.as_millis());
            Ok(Some(token))
        } else {
            debug!("lease held elsewhere name={}", name);
            Ok(None)
        }
    }

    /// Acquire or fail with `LockNotAcquired`, for callers that cannot
    /// proceed without the lease (operator tooling mostly; maintenance
    /// paths treat the held case as a benign skip instead).
    pub fn acquire_required(&self, name: &str, ttl: Duration) -> Result<LockToken, AnchorError> {
        self.acquire(name, ttl)?.ok_or_else(|| AnchorError::LockNotAcquired(name.to_string()))
    }

    pub fn release(&self, name: &str, token: &LockToken) -> Result<bool, AnchorError> {
        let released = self.store.release(name, token)?;
        if !released {
            warn!("lease release rejected name={} (expired or foreign token)", name);
        }
        Ok(released)
    }

    pub fn extend(&self, name: &str, token: &LockToken, ttl: Duration) -> Result<bool, AnchorError> {
        self.store.extend(name, token, ttl)
    }

    /// Run `op` under the lease, re-extending it from a background
    /// heartbeat so legitimately long operations never lose the lease
    /// purely from wall-clock expiry.
    ///
    /// Returns `Ok(Skipped)` when the lease is held elsewhere. An error
    /// from `op` is propagated after the lease is released.
    pub async fn with_heartbeat<T, F, Fut>(&self, name: &str, ttl: Duration, op: F) -> Result<LockOutcome<T>, AnchorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AnchorError>>,
    {
        let Some(token) = self.acquire(name, ttl)? else {
            return Ok(LockOutcome::Skipped);
        };

        let interval = heartbeat_interval(ttl);
        let heartbeat = {
            let store = self.store.clone();
            let name = name.to_string();
            let token = token.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // first tick completes immediately
                loop {
                    ticker.tick().await;
                    match store.extend(&name, &token, ttl) {
                        Ok(true) => debug!("lease extended name={} ttl_ms={}", name, ttl.as_millis()),
                        Ok(false) => {
                            warn!("lease extension rejected name={}; heartbeat stopping", name);
                            break;
                        }
                        Err(err) => warn!("lease extension failed name={} error={}", name, err),
                    }
                }
            })
        };
        let _heartbeat_guard = AbortOnDrop(heartbeat);

        let result = op().await;

        if let Err(err) = self.release(name, &token) {
            warn!("lease release failed name={} error={}", name, err);
        }

        match result {
            Ok(value) => {
                info!("lease-guarded operation completed name={}", name);
                Ok(LockOutcome::Completed(value))
            }
            Err(err) => Err(err),
        }
    }
}

/// Heartbeat at a third of the TTL, clamped to a sane band so very short
/// leases do not spin and very long ones still renew well before expiry.
fn heartbeat_interval(ttl: Duration) -> Duration {
    let third = ttl / 3;
    let min = Duration::from_secs(HEARTBEAT_MIN_INTERVAL_SECS);
    let max = Duration::from_secs(HEARTBEAT_MAX_INTERVAL_SECS);
    third.clamp(min, max)
}
