use crate::foundation::{AnchorError, Outpoint, Txid};
use async_trait::async_trait;
use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One entry of the ledger's current unspent set for an identity.
#[derive(Clone, Debug, PartialEq)]
pub struct UnspentOutput {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub locking_script: Vec<u8>,
    pub confirmations: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendStatus {
    Unspent,
    Spent,
    Unknown,
}

/// External ledger-data provider. All calls are bounded by a timeout;
/// callers retry only on network error / 5xx via the shared combinator.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn list_unspent(&self, identity: &str) -> Result<Vec<UnspentOutput>, AnchorError>;
    async fn get_height(&self) -> Result<u64, AnchorError>;
    async fn get_spend_status(&self, outpoint: &Outpoint) -> Result<SpendStatus, AnchorError>;
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, AnchorError>;
}

// =========================================================================
// HTTP implementation
// =========================================================================

#[derive(Debug, Deserialize)]
struct UnspentEntryDto {
    txid: String,
    vout: u32,
    #[serde(alias = "satoshis", alias = "value")]
    amount: u64,
    #[serde(alias = "script")]
    locking_script: String,
    #[serde(default)]
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct HeightDto {
    #[serde(alias = "blocks")]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct SpendStatusDto {
    spent: bool,
}

#[derive(Debug, Deserialize)]
struct BroadcastDto {
    txid: String,
}

pub struct HttpLedgerRpc {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerRpc {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AnchorError> {
        let base_url = base_url.into();
        info!("ledger rpc client url={} timeout_ms={}", redact_url(&base_url), timeout.as_millis());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AnchorError::ConfigError(format!("ledger http client: {}", err)))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Convert an HTTP response into a typed value at the boundary.
    /// 5xx maps to a retryable outage, 4xx to a terminal rejection; the
    /// payload shape never leaks past this function.
    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, AnchorError> {
        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::service_unavailable("ledger", format!("{} returned {}: {}", what, status, body)));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::TransactionRejected { details: format!("{} returned {}: {}", what, status, body) });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| AnchorError::inconsistency(format!("{} payload did not match schema: {}", what, err)))
    }

    fn map_transport_err(err: reqwest::Error, what: &str) -> AnchorError {
        AnchorError::network("ledger", format!("{}: {}", what, err))
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn list_unspent(&self, identity: &str) -> Result<Vec<UnspentOutput>, AnchorError> {
        let started = Instant::now();
        let url = format!("{}/address/{}/unspent", self.base_url, identity);
        trace!("ledger list_unspent request identity={}", identity);
        let response = self.client.get(&url).send().await.map_err(|err| Self::map_transport_err(err, "list_unspent"))?;
        let entries: Vec<UnspentEntryDto> = Self::read_json(response, "list_unspent").await?;
        debug!(
            "ledger list_unspent identity={} utxo_count={} elapsed_ms={}",
            identity,
            entries.len(),
            started.elapsed().as_millis()
        );

        entries
            .into_iter()
            .map(|entry| {
                Ok(UnspentOutput {
                    outpoint: Outpoint::new(entry.txid.parse()?, entry.vout),
                    amount: entry.amount,
                    locking_script: hex::decode(&entry.locking_script)?,
                    confirmations: entry.confirmations,
                })
            })
            .collect()
    }

    async fn get_height(&self) -> Result<u64, AnchorError> {
        let url = format!("{}/chain/height", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|err| Self::map_transport_err(err, "get_height"))?;
        let dto: HeightDto = Self::read_json(response, "get_height").await?;
        Ok(dto.height)
    }

    async fn get_spend_status(&self, outpoint: &Outpoint) -> Result<SpendStatus, AnchorError> {
        let url = format!("{}/tx/{}/out/{}/status", self.base_url, outpoint.txid, outpoint.vout);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => return Err(Self::map_transport_err(err, "get_spend_status")),
        };
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SpendStatus::Unknown);
        }
        let dto: SpendStatusDto = Self::read_json(response, "get_spend_status").await?;
        Ok(if dto.spent { SpendStatus::Spent } else { SpendStatus::Unspent })
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, AnchorError> {
        let started = Instant::now();
        let url = format!("{}/tx/broadcast", self.base_url);
        info!("ledger broadcast start size_bytes={}", raw_tx.len());
        let body = serde_json::json!({ "raw": hex::encode(raw_tx) });
        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("ledger broadcast transport failure error={}", err);
                return Err(Self::map_transport_err(err, "broadcast"));
            }
        };
        let dto: BroadcastDto = Self::read_json(response, "broadcast").await?;
        let txid: Txid = dto.txid.parse()?;
        debug!("ledger broadcast txid={} elapsed_ms={}", txid, started.elapsed().as_millis());
        Ok(txid)
    }
}

fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end + 3);
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    format!("{scheme}<redacted>@{}", &rest[at + 1..])
}

// =========================================================================
// Mock implementation for tests
// =========================================================================

pub struct MockLedgerRpc {
    unspent: Mutex<Vec<UnspentOutput>>,
    spent: Mutex<HashSet<Outpoint>>,
    known_txids: Mutex<HashSet<Txid>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
    height: std::sync::atomic::AtomicU64,
    fail_broadcasts: std::sync::atomic::AtomicU32,
    reject_broadcasts: std::sync::atomic::AtomicBool,
}

impl MockLedgerRpc {
    pub fn new() -> Self {
        Self {
            unspent: Mutex::new(Vec::new()),
            spent: Mutex::new(HashSet::new()),
            known_txids: Mutex::new(HashSet::new()),
            broadcasts: Mutex::new(Vec::new()),
            height: std::sync::atomic::AtomicU64::new(0),
            fail_broadcasts: std::sync::atomic::AtomicU32::new(0),
            reject_broadcasts: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_unspent(unspent: Vec<UnspentOutput>) -> Self {
        let mock = Self::new();
        if let Ok(mut entries) = mock.unspent.lock() {
            *entries = unspent;
        }
        mock
    }

    pub fn push_unspent(&self, output: UnspentOutput) {
        if let Ok(mut entries) = self.unspent.lock() {
            entries.push(output);
        }
    }

    pub fn remove_unspent(&self, outpoint: &Outpoint) {
        if let Ok(mut entries) = self.unspent.lock() {
            entries.retain(|entry| entry.outpoint != *outpoint);
        }
    }

    pub fn mark_spent(&self, outpoint: Outpoint) {
        if let Ok(mut spent) = self.spent.lock() {
            spent.insert(outpoint);
        }
        self.remove_unspent(&outpoint);
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, std::sync::atomic::Ordering::Relaxed);
    }

    /// The next `count` broadcasts fail with a retryable network error.
    pub fn fail_next_broadcasts(&self, count: u32) {
        self.fail_broadcasts.store(count, std::sync::atomic::Ordering::SeqCst);
    }

    /// All broadcasts are rejected with a 4xx-class error.
    pub fn reject_broadcasts(&self, reject: bool) {
        self.reject_broadcasts.store(reject, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().map(|txs| txs.len()).unwrap_or(0)
    }
}

impl Default for MockLedgerRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerRpc for MockLedgerRpc {
    async fn list_unspent(&self, _identity: &str) -> Result<Vec<UnspentOutput>, AnchorError> {
        let entries = self
            .unspent
            .lock()
            .map_err(|_| AnchorError::StorageError { operation: "mock unspent lock".to_string(), details: "poisoned".to_string() })?;
        Ok(entries.clone())
    }

    async fn get_height(&self) -> Result<u64, AnchorError> {
        Ok(self.height.load(std::sync::atomic::Ordering::Relaxed))
    }

    async fn get_spend_status(&self, outpoint: &Outpoint) -> Result<SpendStatus, AnchorError> {
        if self.spent.lock().map(|spent| spent.contains(outpoint)).unwrap_or(false) {
            return Ok(SpendStatus::Spent);
        }
        let listed = self
            .unspent
            .lock()
            .map(|entries| entries.iter().any(|entry| entry.outpoint == *outpoint))
            .unwrap_or(false);
        if listed {
            return Ok(SpendStatus::Unspent);
        }
        if self.known_txids.lock().map(|known| known.contains(&outpoint.txid)).unwrap_or(false) {
            return Ok(SpendStatus::Unspent);
        }
        Ok(SpendStatus::Unknown)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, AnchorError> {
        if self.reject_broadcasts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AnchorError::TransactionRejected { details: "mock rejection".to_string() });
        }
        let remaining = self.fail_broadcasts.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_broadcasts.store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(AnchorError::network("ledger", "mock outage"));
        }
        if let Ok(mut broadcasts) = self.broadcasts.lock() {
            broadcasts.push(raw_tx.to_vec());
        }
        let digest = crate::domain::tx::encode::sha256d(raw_tx);
        let txid = Txid::new(digest);
        if let Ok(mut known) = self.known_txids.lock() {
            known.insert(txid);
        }
        Ok(txid)
    }
}
