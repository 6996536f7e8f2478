use crate::application::lock_service::LockService;
use crate::application::orchestrator::PoolOrchestrator;
use crate::application::pipeline::TxPipeline;
use crate::application::records::RecordService;
use crate::application::resource_pool::ResourcePool;
use crate::application::worker::{process_inline, run_worker_loop, AnchorDeps};
use crate::foundation::{AnchorError, PendingId, Txid};
use crate::infrastructure::config::{AppConfig, StorageBackend};
use crate::infrastructure::locks::{LockStore, MemoryLockStore};
use crate::infrastructure::queue::{AnchorJob, JobQueue, MemoryJobQueue};
use crate::infrastructure::rpc::{HttpLedgerRpc, HttpRemoteSigner, LedgerRpc, RemoteSigner};
use crate::infrastructure::storage::{MemoryStorage, RocksStorage, Storage};
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Composition root: every service constructed explicitly once, passed by
/// reference, shut down through `close()`. No process-wide singletons.
pub struct AnchorContext {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub locks: Arc<LockService>,
    pub pool: Arc<ResourcePool>,
    pub pipeline: Arc<TxPipeline>,
    pub records: Arc<RecordService>,
    pub orchestrator: Arc<PoolOrchestrator>,
    pub queue: Arc<dyn JobQueue>,
    shutdown: Arc<Notify>,
}

impl AnchorContext {
    /// Wire the production service graph from configuration.
    pub fn initialize(config: AppConfig) -> Result<Self, AnchorError> {
        config.validate()?;
        crate::infrastructure::logging::init_logger(config.log_dir.as_deref(), &config.log_filters);

        let storage: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Rocks => Arc::new(RocksStorage::open_in_dir(&config.storage.data_dir)?),
        };

        let ledger: Arc<dyn LedgerRpc> =
            Arc::new(HttpLedgerRpc::new(&config.ledger.endpoint_url, Duration::from_millis(config.ledger.timeout_ms))?);
        let signer: Arc<dyn RemoteSigner> =
            Arc::new(HttpRemoteSigner::new(&config.signer.endpoint_url, Duration::from_millis(config.signer.timeout_ms))?);
        let lock_store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());

        Self::with_services(config, storage, lock_store, ledger, signer)
    }

    /// Wire the graph from pre-built infrastructure. Tests inject mocks
    /// here; production goes through `initialize`.
    pub fn with_services(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        lock_store: Arc<dyn LockStore>,
        ledger: Arc<dyn LedgerRpc>,
        signer: Arc<dyn RemoteSigner>,
    ) -> Result<Self, AnchorError> {
        let locks = Arc::new(LockService::new(lock_store));
        let pool = Arc::new(ResourcePool::new(storage.clone()));
        let pipeline = Arc::new(TxPipeline::new(ledger, signer, config.fees.clone()));
        let records = Arc::new(RecordService::new(storage.clone()));
        let orchestrator = Arc::new(PoolOrchestrator::new(
            pool.clone(),
            pipeline.clone(),
            locks.clone(),
            config.funding.clone(),
            config.ledger.clone(),
            config.pool.clone(),
        )?);
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());

        info!(
            "anchor context initialized backend={:?} queue_enabled={} min_pool_size={}",
            config.storage.backend, config.queue.enabled, config.pool.min_pool_size
        );

        Ok(Self {
            config,
            storage,
            locks,
            pool,
            pipeline,
            records,
            orchestrator,
            queue,
            shutdown: Arc::new(Notify::new()),
        })
    }

    fn deps(&self) -> AnchorDeps {
        AnchorDeps {
            records: self.records.clone(),
            pool: self.pool.clone(),
            pipeline: self.pipeline.clone(),
            funding: self.config.funding.clone(),
        }
    }

    /// Hand an anchoring intent to the engine. With the queue enabled the
    /// caller gets `None` and polls the pending record; with it disabled
    /// the flow runs inline and the caller gets a definitive txid.
    pub async fn submit(&self, pending_id: &PendingId) -> Result<Option<Txid>, AnchorError> {
        if !self.config.queue.enabled {
            return process_inline(&self.deps(), pending_id).await.map(Some);
        }

        let job = AnchorJob::new(pending_id.clone());
        if let Some(mut pending) = self.records.get(pending_id)? {
            pending.job_id = Some(job.job_id.clone());
            self.storage.update_pending(&pending)?;
        }
        self.queue.enqueue(job)?;
        Ok(None)
    }

    /// Operator entry point: revert every failed record to pending and
    /// hand it back to the engine. Intents that failed on a logical
    /// conflict will conflict again and should be reviewed instead.
    pub async fn recover_failed(&self) -> Result<usize, AnchorError> {
        let failed = self.storage.list_pending(Some(crate::domain::PendingStatus::Failed))?;
        let mut recovered = 0usize;
        for record in failed {
            self.records.recover(&record.id)?;
            self.submit(&record.id).await?;
            recovered += 1;
        }
        info!("failed records recovered and resubmitted count={}", recovered);
        Ok(recovered)
    }

    /// Spawn the queue worker. Call once per instance; additional worker
    /// processes simply run their own context.
    pub fn spawn_worker(&self) -> tokio::task::JoinHandle<()> {
        let deps = self.deps();
        let queue = self.queue.clone();
        let config = self.config.queue.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(run_worker_loop(deps, queue, config, shutdown))
    }

    /// Stop workers and close the queue. Leases die with their TTLs; no
    /// exit hook is relied upon for resource recovery.
    pub fn close(&self) {
        info!("anchor context closing");
        self.shutdown.notify_waiters();
        self.queue.close();
    }
}
