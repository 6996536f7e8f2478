use crate::domain::tx::encode::{sha256d, write_outpoint, write_varint, Transaction};
use crate::foundation::{AnchorError, Hash32, SIGHASH_ALL_FORKID};

/// Signature pre-image digest for one input, per the ledger's post-fork
/// signature-hash algorithm (ALL | FORKID). The digest commits to every
/// prevout, every sequence, this input's locking script and value, and
/// every output, so a signature cannot be replayed against a different
/// spending context.
pub fn signature_preimage_digest(tx: &Transaction, input_index: usize, locking_script: &[u8], input_value: u64) -> Result<Hash32, AnchorError> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        AnchorError::EncodingError(format!("input index {} out of range ({} inputs)", input_index, tx.inputs.len()))
    })?;

    let hash_prevouts = {
        let mut buf = Vec::with_capacity(tx.inputs.len() * 36);
        for inp in &tx.inputs {
            write_outpoint(&mut buf, &inp.previous_output);
        }
        sha256d(&buf)
    };

    let hash_sequence = {
        let mut buf = Vec::with_capacity(tx.inputs.len() * 4);
        for inp in &tx.inputs {
            buf.extend_from_slice(&inp.sequence.to_le_bytes());
        }
        sha256d(&buf)
    };

    let hash_outputs = {
        let mut buf = Vec::new();
        for out in &tx.outputs {
            buf.extend_from_slice(&out.value.to_le_bytes());
            write_varint(&mut buf, out.script_pubkey.len() as u64);
            buf.extend_from_slice(&out.script_pubkey);
        }
        sha256d(&buf)
    };

    let mut preimage = Vec::with_capacity(156 + locking_script.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    write_outpoint(&mut preimage, &input.previous_output);
    write_varint(&mut preimage, locking_script.len() as u64);
    preimage.extend_from_slice(locking_script);
    preimage.extend_from_slice(&input_value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());

    Ok(sha256d(&preimage))
}
