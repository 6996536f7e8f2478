//! Application layer: services wiring domain logic to infrastructure.

pub mod context;
pub mod lock_service;
pub mod orchestrator;
pub mod pipeline;
pub mod records;
pub mod resource_pool;
pub mod worker;

pub use context::AnchorContext;
pub use lock_service::{LockOutcome, LockService};
pub use orchestrator::{PoolOrchestrator, SplitOutcome, SweepOutcome, SyncReport};
pub use pipeline::TxPipeline;
pub use records::{ConfirmOutcome, RecordService};
pub use resource_pool::ResourcePool;
pub use worker::{process_anchor, process_inline, run_worker_loop, AnchorDeps};
