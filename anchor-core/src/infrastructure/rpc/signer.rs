use crate::foundation::{AnchorError, Hash32, KeyIdentifier};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One pre-image digest to sign, referencing key material by identifier.
/// Raw key bytes never enter this crate.
#[derive(Clone, Debug, Serialize)]
pub struct SignRequest {
    pub key_identifier: KeyIdentifier,
    #[serde(with = "hex_bytes")]
    pub digest: Hash32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignatureEntry {
    #[serde(with = "hex_vec")]
    pub signature: Vec<u8>,
    #[serde(with = "hex_vec")]
    pub public_key: Vec<u8>,
}

/// External signing service. The response is strictly index-aligned with
/// the request: signature `i` answers digest `i`. That correspondence is a
/// hard invariant checked at the boundary, not a convention.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<SignatureEntry>, AnchorError>;
}

#[derive(Serialize)]
struct SignBody<'a> {
    requests: &'a [SignRequest],
}

#[derive(Deserialize)]
struct SignResponse {
    signatures: Vec<SignatureEntry>,
}

pub struct HttpRemoteSigner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemoteSigner {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AnchorError> {
        let endpoint = endpoint.into();
        info!("signer client endpoint={} timeout_ms={}", endpoint, timeout.as_millis());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AnchorError::ConfigError(format!("signer http client: {}", err)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RemoteSigner for HttpRemoteSigner {
    async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<SignatureEntry>, AnchorError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SignBody { requests })
            .send()
            .await
            .map_err(|err| AnchorError::network("signer", err.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("signer unavailable status={} body_len={}", status, body.len());
            return Err(AnchorError::service_unavailable("signer", format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Message(format!("signer refused request ({}): {}", status, body)));
        }

        let parsed: SignResponse = response
            .json()
            .await
            .map_err(|err| AnchorError::inconsistency(format!("signer payload did not match schema: {}", err)))?;

        if parsed.signatures.len() != requests.len() {
            return Err(AnchorError::SignerResponseMismatch { expected: requests.len(), actual: parsed.signatures.len() });
        }
        debug!("signer returned signatures count={} elapsed_ms={}", parsed.signatures.len(), started.elapsed().as_millis());
        Ok(parsed.signatures)
    }
}

/// Test double: deterministic per-digest pseudo-signatures, index-aligned.
pub struct MockSigner {
    fail_next: std::sync::atomic::AtomicU32,
    truncate_response: std::sync::atomic::AtomicBool,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            fail_next: std::sync::atomic::AtomicU32::new(0),
            truncate_response: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, std::sync::atomic::Ordering::SeqCst);
    }

    /// Drop the last signature from every response, simulating a
    /// misaligned upstream.
    pub fn truncate_responses(&self, truncate: bool) {
        self.truncate_response.store(truncate, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSigner for MockSigner {
    async fn sign(&self, requests: &[SignRequest]) -> Result<Vec<SignatureEntry>, AnchorError> {
        let remaining = self.fail_next.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(AnchorError::service_unavailable("signer", "mock outage"));
        }
        let mut signatures: Vec<SignatureEntry> = requests
            .iter()
            .map(|request| {
                // 70-byte stand-in derived from the digest so tests can
                // assert alignment.
                let mut signature = vec![0x30u8];
                signature.extend_from_slice(&request.digest);
                signature.extend_from_slice(&request.digest);
                signature.extend_from_slice(&request.digest[..5]);
                SignatureEntry { signature, public_key: vec![0x02; 33] }
            })
            .collect();
        if self.truncate_response.load(std::sync::atomic::Ordering::SeqCst) && !signatures.is_empty() {
            signatures.pop();
        }
        if signatures.len() != requests.len() {
            return Err(AnchorError::SignerResponseMismatch { expected: requests.len(), actual: signatures.len() });
        }
        Ok(signatures)
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
