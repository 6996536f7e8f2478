use crate::application::pipeline::TxPipeline;
use crate::application::records::RecordService;
use crate::application::resource_pool::ResourcePool;
use crate::domain::digest::canonical_bytes;
use crate::domain::{PendingRecord, PendingStatus, ResourceRecord, ResourceStatus};
use crate::foundation::{now_millis, AnchorError, Outpoint, PendingId, Txid};
use crate::infrastructure::config::{FundingConfig, QueueConfig};
use crate::infrastructure::queue::JobQueue;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Everything one anchoring job needs. Cloned into the worker loop once at
/// startup; no hidden module-level instances.
#[derive(Clone)]
pub struct AnchorDeps {
    pub records: Arc<RecordService>,
    pub pool: Arc<ResourcePool>,
    pub pipeline: Arc<TxPipeline>,
    pub funding: FundingConfig,
}

/// Execute one anchoring flow: select/lock funding, build/sign/broadcast,
/// confirm the pending record. Exactly what a synchronous caller does
/// inline when the queue subsystem is disabled.
///
/// Any failure after the resource lock triggers a compensating unlock
/// before the error surfaces; nothing stays locked except via the
/// time-bounded reaper.
pub async fn process_anchor(deps: &AnchorDeps, pending_id: &PendingId) -> Result<Txid, AnchorError> {
    let pending = deps
        .records
        .get(pending_id)?
        .ok_or_else(|| AnchorError::PendingRecordMissing(pending_id.to_string()))?;

    if pending.status == PendingStatus::Confirmed {
        // Queue redelivery after a completed run.
        return pending
            .result_txid
            .ok_or_else(|| AnchorError::inconsistency(format!("confirmed record {} has no result_txid", pending_id)));
    }
    if pending.status == PendingStatus::Failed {
        return Err(AnchorError::InvalidStateTransition {
            from: pending.status.to_string(),
            to: PendingStatus::Confirmed.to_string(),
        });
    }

    let chunk = anchor_envelope(&pending);
    let fee_buffer = deps.pipeline.fees().fee_buffer;
    let resources = deps.pool.select_and_lock_many(0, fee_buffer)?;

    let result = anchor_locked(deps, &pending, &resources, chunk).await;
    match result {
        Ok(txid) => Ok(txid),
        Err(err) => {
            deps.pool.unlock_many(&resources)?;
            Err(err)
        }
    }
}

async fn anchor_locked(
    deps: &AnchorDeps,
    pending: &PendingRecord,
    resources: &[ResourceRecord],
    chunk: Vec<u8>,
) -> Result<Txid, AnchorError> {
    let change_script = crate::foundation::util::encoding::parse_hex_bytes(&deps.funding.locking_script_hex)?;

    let mut built = deps.pipeline.build(resources, vec![chunk], vec![], change_script.clone())?;
    deps.pipeline.sign(&mut built, resources).await?;
    let txid = deps.pipeline.broadcast(&built).await?;

    deps.pool.spend_many(resources)?;

    // The change output re-enters the pool as the pipeline's own creation;
    // sync() promotes it once confirmed.
    let storage = deps.pool.storage();
    let now = now_millis();
    for (vout, output) in built.transaction.outputs.iter().enumerate() {
        if output.value == 0 || output.script_pubkey != change_script {
            continue;
        }
        storage.insert_resource(ResourceRecord {
            outpoint: Outpoint::new(txid, vout as u32),
            amount: output.value,
            locking_script: output.script_pubkey.clone(),
            key_identifier: deps.funding.key_identifier.clone(),
            status: ResourceStatus::Unconfirmed,
            created_at_millis: now,
            updated_at_millis: now,
        })?;
    }

    deps.records.mark_confirmed(&pending.id, txid)?;
    Ok(txid)
}

/// The immutable bytes embedded in the null-data output: a canonical
/// envelope of the intent, so independent observers can re-derive and
/// verify the anchored record.
fn anchor_envelope(pending: &PendingRecord) -> Vec<u8> {
    let envelope = serde_json::json!({
        "uid": pending.uid_tag.as_str(),
        "kind": pending.kind.to_string(),
        "prev": pending.previous_txid.map(|txid| txid.to_string()),
        "payload": pending.payload,
    });
    canonical_bytes(&envelope)
}

/// Synchronous path used when the queue subsystem is disabled: identical
/// semantics, definitive success/failure, record marked failed on error.
pub async fn process_inline(deps: &AnchorDeps, pending_id: &PendingId) -> Result<Txid, AnchorError> {
    match process_anchor(deps, pending_id).await {
        Ok(txid) => Ok(txid),
        Err(err) => {
            if let Err(mark_err) = deps.records.mark_failed(pending_id, err.to_string()) {
                error!("failed to mark record failed id={} error={}", pending_id, mark_err);
            }
            Err(err)
        }
    }
}

/// Queue-driven execution outside the request path: bounded retry with
/// exponential backoff per job; exhausted attempts mark the record failed
/// and leave it for operator-driven recovery rather than retrying forever.
pub async fn run_worker_loop(
    deps: AnchorDeps,
    queue: Arc<dyn JobQueue>,
    config: QueueConfig,
    shutdown: Arc<Notify>,
) {
    info!("worker loop started max_attempts={} backoff_base_ms={}", config.max_attempts, config.backoff_base_ms);
    loop {
        let job = tokio::select! {
            _ = shutdown.notified() => {
                info!("worker loop shutting down");
                break;
            }
            job = queue.dequeue() => job,
        };
        let Some(mut job) = job else {
            info!("job queue closed; worker loop ending");
            break;
        };

        debug!("job dequeued job_id={} pending_id={} attempt={}", job.job_id, job.pending_id, job.attempts + 1);
        match process_anchor(&deps, &job.pending_id).await {
            Ok(txid) => {
                info!("job completed job_id={} pending_id={} txid={}", job.job_id, job.pending_id, txid);
            }
            Err(err) if err.is_retryable() && job.attempts + 1 < config.max_attempts => {
                job.attempts += 1;
                let delay = job_backoff(&config, job.attempts);
                warn!(
                    "job retrying job_id={} attempt={} of {} delay_ms={} error={}",
                    job.job_id,
                    job.attempts + 1,
                    config.max_attempts,
                    delay.as_millis(),
                    err
                );
                tokio::time::sleep(delay).await;
                if let Err(enqueue_err) = queue.enqueue(job.clone()) {
                    error!("job re-enqueue failed job_id={} error={}", job.job_id, enqueue_err);
                    mark_job_failed(&deps, &job.pending_id, &err);
                }
            }
            Err(err) => {
                // Conflicts and insufficient funds land here on the first
                // attempt; they must never be blindly retried.
                mark_job_failed(&deps, &job.pending_id, &err);
            }
        }
    }
}

fn mark_job_failed(deps: &AnchorDeps, pending_id: &PendingId, err: &AnchorError) {
    warn!("job exhausted pending_id={} error={}", pending_id, err);
    if let Err(mark_err) = deps.records.mark_failed(pending_id, err.to_string()) {
        error!("failed to mark record failed id={} error={}", pending_id, mark_err);
    }
}

fn job_backoff(config: &QueueConfig, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay = config.backoff_base_ms.saturating_mul(factor).min(config.backoff_max_ms);
    Duration::from_millis(delay)
}
