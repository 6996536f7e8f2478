use crate::domain::tx::encode::{Transaction, TxInput, TxOutput, SEQUENCE_FINAL, TX_VERSION};
use crate::domain::tx::fee::fee_for_size;
use crate::domain::tx::script::null_data_script;
use crate::domain::tx::sighash::signature_preimage_digest;
use crate::foundation::{AnchorError, Hash32, KeyIdentifier, Outpoint, PLACEHOLDER_SCRIPT_SIG_LEN};

/// A funding input selected for spending: the outpoint plus everything the
/// signer round needs (value, locking script, key reference).
#[derive(Clone, Debug)]
pub struct TxInputSource {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub locking_script: Vec<u8>,
    pub key_identifier: KeyIdentifier,
}

#[derive(Clone, Debug)]
pub struct BuildParams {
    /// Each chunk becomes its own null-data output.
    pub data_chunks: Vec<Vec<u8>>,
    /// Value-bearing outputs (consolidation / split targets). May be empty.
    pub outputs: Vec<TxOutput>,
    pub change_script: Vec<u8>,
    pub fee_rate_per_kb: u64,
    pub min_fee: u64,
    pub dust_threshold: u64,
}

#[derive(Clone, Debug)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    /// One signature pre-image digest per input, index-aligned with
    /// `transaction.inputs` and with the signer request that follows.
    pub per_input_digests: Vec<Hash32>,
    pub fee: u64,
    /// Zero when the residue was folded into the fee as dust.
    pub change_value: u64,
}

/// Build an unsigned transaction carrying `data_chunks` in null-data
/// outputs plus a change output, charging a fee derived from the actual
/// serialized size at the given rate.
///
/// Fees depend on size and size depends on whether the change output
/// survives, so the first estimate is corrected by a second pass before
/// amounts are finalized.
pub fn build_transaction(inputs: &[TxInputSource], params: &BuildParams) -> Result<BuiltTransaction, AnchorError> {
    if inputs.is_empty() {
        return Err(AnchorError::invalid_record("transaction requires at least one input"));
    }

    let mut total_in: u64 = 0;
    for input in inputs {
        total_in = total_in
            .checked_add(input.amount)
            .ok_or_else(|| AnchorError::EncodingError("input value overflow".to_string()))?;
    }

    let mut fixed_outputs = Vec::with_capacity(params.data_chunks.len() + params.outputs.len());
    for chunk in &params.data_chunks {
        fixed_outputs.push(TxOutput { value: 0, script_pubkey: null_data_script(std::slice::from_ref(chunk))? });
    }
    fixed_outputs.extend(params.outputs.iter().cloned());

    let fixed_out_value: u64 = fixed_outputs.iter().map(|out| out.value).sum();
    if total_in < fixed_out_value {
        return Err(AnchorError::InsufficientFunds { required: fixed_out_value, available: total_in });
    }
    let spendable = total_in - fixed_out_value;

    // First pass: assume a change output exists and estimate the fee from
    // the placeholder-signed size.
    let with_change = assemble(inputs, &fixed_outputs, Some((0, params.change_script.clone())));
    let fee_with_change = fee_for_size(estimated_size(&with_change), params.fee_rate_per_kb, params.min_fee)?;

    let (transaction, fee, change_value) = if spendable > fee_with_change && spendable - fee_with_change > params.dust_threshold {
        // Second pass: same shape, corrected change amount.
        let change = spendable - fee_with_change;
        let tx = assemble(inputs, &fixed_outputs, Some((change, params.change_script.clone())));
        (tx, fee_with_change, change)
    } else {
        // Change would be dust (or negative): drop the output, re-derive
        // the fee from the smaller size and fold the residue in.
        let without_change = assemble(inputs, &fixed_outputs, None);
        if without_change.outputs.is_empty() {
            // Nothing but a would-be-dust change: the inputs cannot pay
            // for a transaction that pays anyone.
            return Err(AnchorError::InsufficientFunds {
                required: fee_with_change.saturating_add(params.dust_threshold),
                available: total_in,
            });
        }
        let fee_floor = fee_for_size(estimated_size(&without_change), params.fee_rate_per_kb, params.min_fee)?;
        if spendable < fee_floor {
            return Err(AnchorError::InsufficientFunds {
                required: fixed_out_value.saturating_add(fee_floor),
                available: total_in,
            });
        }
        (without_change, spendable, 0)
    };

    let mut per_input_digests = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        per_input_digests.push(signature_preimage_digest(&transaction, index, &input.locking_script, input.amount)?);
    }

    Ok(BuiltTransaction { transaction, per_input_digests, fee, change_value })
}

fn assemble(inputs: &[TxInputSource], fixed_outputs: &[TxOutput], change: Option<(u64, Vec<u8>)>) -> Transaction {
    let tx_inputs = inputs
        .iter()
        .map(|input| TxInput { previous_output: input.outpoint, script_sig: Vec::new(), sequence: SEQUENCE_FINAL })
        .collect::<Vec<_>>();

    let mut outputs = fixed_outputs.to_vec();
    if let Some((value, script)) = change {
        outputs.push(TxOutput { value, script_pubkey: script });
    }

    Transaction { version: TX_VERSION, inputs: tx_inputs, outputs, lock_time: 0 }
}

/// Size as it will be once signed: empty unlocking scripts are priced at
/// the worst-case placeholder length. The length varint stays one byte for
/// both the empty and the placeholder script, so only the script bytes grow.
fn estimated_size(tx: &Transaction) -> usize {
    tx.serialized_size() + tx.inputs.len() * PLACEHOLDER_SCRIPT_SIG_LEN
}
