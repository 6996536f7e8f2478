//! Job queue feeding the worker loop.
//!
//! Durability lives in the pending records, not here: a job is fully
//! re-derivable from its pending record, and recovery re-enqueues stuck
//! intents. The queue itself may therefore be ephemeral.

use crate::foundation::{AnchorError, JobId, PendingId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A unit of work: anchor the referenced pending record onto the ledger.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnchorJob {
    pub job_id: JobId,
    pub pending_id: PendingId,
    pub attempts: u32,
}

impl AnchorJob {
    pub fn new(pending_id: PendingId) -> Self {
        Self { job_id: JobId::generate(), pending_id, attempts: 0 }
    }
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: AnchorJob) -> Result<(), AnchorError>;

    /// Await the next job. Returns `None` once the queue is closed and
    /// drained.
    async fn dequeue(&self) -> Option<AnchorJob>;

    fn close(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<AnchorJob>>,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self { jobs: Mutex::new(VecDeque::new()), notify: Notify::new(), closed: std::sync::atomic::AtomicBool::new(false) }
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: AnchorJob) -> Result<(), AnchorError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AnchorError::Message("queue closed".to_string()));
        }
        self.jobs
            .lock()
            .map_err(|_| AnchorError::StorageError { operation: "queue lock".into(), details: "poisoned".into() })?
            .push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<AnchorJob> {
        loop {
            // Register for wakeup before checking, so an enqueue between
            // the check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Ok(mut jobs) = self.jobs.lock() {
                if let Some(job) = jobs.pop_front() {
                    return Some(job);
                }
                if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }
}
