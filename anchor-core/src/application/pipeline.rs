use crate::domain::tx::builder::{build_transaction, BuildParams, BuiltTransaction, TxInputSource};
use crate::domain::tx::encode::TxOutput;
use crate::domain::tx::script::unlocking_script;
use crate::domain::ResourceRecord;
use crate::foundation::{AnchorError, Txid, SIGHASH_ALL_FORKID};
use crate::infrastructure::config::FeeConfig;
use crate::infrastructure::rpc::{retry_with_backoff, LedgerRpc, RemoteSigner, RetryPolicy, SignRequest};
use log::{debug, info};
use std::sync::Arc;

/// Build → sign → broadcast. Signing is always delegated: this pipeline
/// computes pre-image digests and submits them by key identifier; it never
/// holds a private key.
pub struct TxPipeline {
    ledger: Arc<dyn LedgerRpc>,
    signer: Arc<dyn RemoteSigner>,
    fees: FeeConfig,
    retry: RetryPolicy,
}

impl TxPipeline {
    pub fn new(ledger: Arc<dyn LedgerRpc>, signer: Arc<dyn RemoteSigner>, fees: FeeConfig) -> Self {
        Self { ledger, signer, fees, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Construct the unsigned transaction and per-input digests from
    /// locked pool resources.
    pub fn build(
        &self,
        resources: &[ResourceRecord],
        data_chunks: Vec<Vec<u8>>,
        outputs: Vec<TxOutput>,
        change_script: Vec<u8>,
    ) -> Result<BuiltTransaction, AnchorError> {
        let inputs: Vec<TxInputSource> = resources
            .iter()
            .map(|record| TxInputSource {
                outpoint: record.outpoint,
                amount: record.amount,
                locking_script: record.locking_script.clone(),
                key_identifier: record.key_identifier.clone(),
            })
            .collect();

        let params = BuildParams {
            data_chunks,
            outputs,
            change_script,
            fee_rate_per_kb: self.fees.fee_rate_per_kb,
            min_fee: self.fees.min_fee,
            dust_threshold: self.fees.dust_threshold,
        };
        let built = build_transaction(&inputs, &params)?;
        debug!(
            "transaction built inputs={} outputs={} fee={} change={}",
            built.transaction.inputs.len(),
            built.transaction.outputs.len(),
            built.fee,
            built.change_value
        );
        Ok(built)
    }

    /// Submit the per-input digests and splice the returned signatures
    /// into unlocking scripts. The response must be index-aligned with
    /// the request; the client enforces the length, this end pairs by
    /// position.
    pub async fn sign(&self, built: &mut BuiltTransaction, resources: &[ResourceRecord]) -> Result<(), AnchorError> {
        let requests: Vec<SignRequest> = resources
            .iter()
            .zip(built.per_input_digests.iter())
            .map(|(record, digest)| SignRequest { key_identifier: record.key_identifier.clone(), digest: *digest })
            .collect();

        let signatures = retry_with_backoff(self.retry, AnchorError::is_retryable, || async {
            self.signer.sign(&requests).await
        })
        .await?;

        if signatures.len() != built.transaction.inputs.len() {
            return Err(AnchorError::SignerResponseMismatch {
                expected: built.transaction.inputs.len(),
                actual: signatures.len(),
            });
        }

        for (input, entry) in built.transaction.inputs.iter_mut().zip(signatures.iter()) {
            input.script_sig = unlocking_script(&entry.signature, SIGHASH_ALL_FORKID as u8, &entry.public_key)?;
        }
        debug!("transaction signed inputs={}", built.transaction.inputs.len());
        Ok(())
    }

    /// Broadcast the raw transaction. Network trouble and 5xx are retried
    /// with bounded backoff; a 4xx-class rejection (e.g. an input already
    /// spent) surfaces immediately, since retrying a logically impossible
    /// operation would loop forever.
    pub async fn broadcast(&self, built: &BuiltTransaction) -> Result<Txid, AnchorError> {
        let raw = built.transaction.serialize();
        let txid = retry_with_backoff(self.retry, AnchorError::is_retryable, || {
            let raw = raw.clone();
            async move { self.ledger.broadcast(&raw).await }
        })
        .await?;
        info!("transaction broadcast txid={} size_bytes={} fee={}", txid, raw.len(), built.fee);
        Ok(txid)
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerRpc> {
        &self.ledger
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }
}
