//! Configuration: serde structs with explicit defaults, loaded from a TOML
//! file with `ANCHOR_`-prefixed environment overrides.

use crate::foundation::constants::*;
use crate::foundation::{AnchorError, KeyIdentifier};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Rocks,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Ledger identity whose unspent set backs the pool.
    #[serde(default)]
    pub identity: String,
    /// Locking script (hex) that change and split outputs pay to.
    #[serde(default)]
    pub locking_script_hex: String,
    /// Key reference submitted to the external signer for pool inputs.
    #[serde(default)]
    pub key_identifier: KeyIdentifier,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self { identity: String::new(), locking_script_hex: String::new(), key_identifier: KeyIdentifier::from("funding") }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { endpoint_url: String::new(), timeout_ms: default_http_timeout_ms(), min_confirmations: default_min_confirmations() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self { endpoint_url: String::new(), timeout_ms: default_http_timeout_ms() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_fee_rate_per_kb")]
    pub fee_rate_per_kb: u64,
    #[serde(default = "default_min_fee")]
    pub min_fee: u64,
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: u64,
    /// Headroom added on top of estimated needs when reserving inputs.
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate_per_kb: default_fee_rate_per_kb(),
            min_fee: default_min_fee(),
            dust_threshold: default_dust_threshold(),
            fee_buffer: default_fee_buffer(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Replenish when the available count drops below this.
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,
    /// Cap on outputs created by one split.
    #[serde(default = "default_max_split_outputs")]
    pub max_split_outputs: usize,
    /// Value of each split output.
    #[serde(default = "default_split_output_amount")]
    pub split_output_amount: u64,
    /// Sweep triggers only once this many dust rows have accumulated.
    #[serde(default = "default_dust_sweep_floor")]
    pub dust_sweep_floor: usize,
    #[serde(default = "default_reap_after_minutes")]
    pub reap_after_minutes: u64,
    #[serde(default = "default_reap_limit")]
    pub reap_limit: usize,
    #[serde(default = "default_maintenance_ttl_secs")]
    pub maintenance_ttl_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: default_min_pool_size(),
            max_split_outputs: default_max_split_outputs(),
            split_output_amount: default_split_output_amount(),
            dust_sweep_floor: default_dust_sweep_floor(),
            reap_after_minutes: default_reap_after_minutes(),
            reap_limit: default_reap_limit(),
            maintenance_ttl_secs: default_maintenance_ttl_secs(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// When false, callers run the anchoring flow inline.
    #[serde(default = "default_queue_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_job_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_job_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_job_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_queue_enabled(),
            max_attempts: default_max_job_attempts(),
            backoff_base_ms: default_job_backoff_base_ms(),
            backoff_max_ms: default_job_backoff_max_ms(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Log filter expression, e.g. `"info"` or `"anchor_core=debug"`.
    #[serde(default = "default_log_filters")]
    pub log_filters: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Load from a TOML file (if present) with `ANCHOR_`-prefixed env
    /// overrides, e.g. `ANCHOR_LEDGER__ENDPOINT_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self, AnchorError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: AppConfig = figment.merge(Env::prefixed("ANCHOR_").split("__")).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnchorError> {
        if self.pool.max_split_outputs == 0 {
            return Err(AnchorError::ConfigError("pool.max_split_outputs must be at least 1".to_string()));
        }
        if self.fees.fee_rate_per_kb == 0 {
            return Err(AnchorError::ConfigError("fees.fee_rate_per_kb must be non-zero".to_string()));
        }
        if self.pool.reap_after_minutes * 60 <= self.pool.maintenance_ttl_secs {
            return Err(AnchorError::ConfigError(
                "pool.reap_after_minutes must exceed pool.maintenance_ttl_secs so live leases are never reaped".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_http_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

const fn default_min_confirmations() -> u32 {
    DEFAULT_MIN_CONFIRMATIONS
}

const fn default_fee_rate_per_kb() -> u64 {
    DEFAULT_FEE_RATE_PER_KB
}

const fn default_min_fee() -> u64 {
    DEFAULT_MIN_FEE
}

const fn default_dust_threshold() -> u64 {
    DEFAULT_DUST_THRESHOLD
}

const fn default_fee_buffer() -> u64 {
    2_000
}

const fn default_min_pool_size() -> usize {
    10
}

const fn default_max_split_outputs() -> usize {
    40
}

const fn default_split_output_amount() -> u64 {
    10_000
}

const fn default_dust_sweep_floor() -> usize {
    20
}

const fn default_reap_after_minutes() -> u64 {
    DEFAULT_REAP_AFTER_MINUTES
}

const fn default_reap_limit() -> usize {
    DEFAULT_REAP_LIMIT
}

const fn default_maintenance_ttl_secs() -> u64 {
    DEFAULT_MAINTENANCE_TTL_SECS
}

const fn default_queue_enabled() -> bool {
    true
}

const fn default_max_job_attempts() -> u32 {
    DEFAULT_MAX_JOB_ATTEMPTS
}

const fn default_job_backoff_base_ms() -> u64 {
    DEFAULT_JOB_BACKOFF_BASE_MS
}

const fn default_job_backoff_max_ms() -> u64 {
    DEFAULT_JOB_BACKOFF_MAX_MS
}

fn default_log_filters() -> String {
    "info".to_string()
}
