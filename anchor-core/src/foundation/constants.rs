//! System-wide constants for the anchoring engine.

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// Milliseconds per minute.
pub const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;

/// Placeholder unlocking-script size used for fee estimation before
/// signatures exist (signature push + pubkey push, worst case).
pub const PLACEHOLDER_SCRIPT_SIG_LEN: usize = 107;

/// Signature-hash flags for every input: ALL | FORKID.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Outputs below this value are uneconomical to spend alone.
pub const DEFAULT_DUST_THRESHOLD: u64 = 546;

/// Minimum fee accepted by the ledger network regardless of size.
pub const DEFAULT_MIN_FEE: u64 = 100;

/// Default fee rate in smallest units per 1000 serialized bytes.
pub const DEFAULT_FEE_RATE_PER_KB: u64 = 500;

/// Lower bound on the heartbeat interval (seconds).
pub const HEARTBEAT_MIN_INTERVAL_SECS: u64 = 2;

/// Upper bound on the heartbeat interval (seconds).
pub const HEARTBEAT_MAX_INTERVAL_SECS: u64 = 20;

/// Default lease TTL for whole-pool maintenance (seconds).
pub const DEFAULT_MAINTENANCE_TTL_SECS: u64 = 60;

/// Locked resources older than this are presumed orphaned by a crashed
/// process. Must exceed the longest maintenance lease TTL so a live,
/// heartbeat-extended operation never has its inputs reaped.
pub const DEFAULT_REAP_AFTER_MINUTES: u64 = 15;

/// Maximum rows recovered per reaper pass.
pub const DEFAULT_REAP_LIMIT: usize = 100;

/// Confirmations required before a discovered output becomes spendable.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;

/// Queue job retry ceiling.
pub const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 5;

/// Base delay for job retry backoff (milliseconds).
pub const DEFAULT_JOB_BACKOFF_BASE_MS: u64 = 500;

/// Cap for job retry backoff (milliseconds).
pub const DEFAULT_JOB_BACKOFF_MAX_MS: u64 = 30_000;

/// HTTP call timeout for external services (milliseconds).
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Attempts for transient-failure retries inside the client utilities.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Environment variable that freezes the clock in tests.
pub const TEST_NOW_MILLIS_ENV_VAR: &str = "ANCHOR_TEST_NOW_MILLIS";

/// Lock-store key serializing whole-pool maintenance across instances.
pub const POOL_MAINTENANCE_LOCK: &str = "pool-maintenance";
