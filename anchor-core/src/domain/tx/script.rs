use crate::foundation::AnchorError;

pub const OP_FALSE: u8 = 0x00;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Append a minimal-length data push to a script.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) -> Result<(), AnchorError> {
    match data.len() {
        len if len < OP_PUSHDATA1 as usize => {
            script.push(len as u8);
        }
        len if len <= u8::MAX as usize => {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
        }
        len if len <= u16::MAX as usize => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len if len <= u32::MAX as usize => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        len => return Err(AnchorError::EncodingError(format!("data push too large: {} bytes", len))),
    }
    script.extend_from_slice(data);
    Ok(())
}

/// Zero-value output script carrying arbitrary application data immutably:
/// `OP_FALSE OP_RETURN <chunk>...`. Provably unspendable.
pub fn null_data_script(chunks: &[Vec<u8>]) -> Result<Vec<u8>, AnchorError> {
    let mut script = Vec::with_capacity(2 + chunks.iter().map(|c| c.len() + 5).sum::<usize>());
    script.push(OP_FALSE);
    script.push(OP_RETURN);
    for chunk in chunks {
        push_data(&mut script, chunk)?;
    }
    Ok(script)
}

/// Unlocking script for a standard pay-to-pubkey-hash input:
/// `<signature || sighash_flag> <pubkey>`.
pub fn unlocking_script(signature: &[u8], sighash_flag: u8, public_key: &[u8]) -> Result<Vec<u8>, AnchorError> {
    let mut sig_with_flag = Vec::with_capacity(signature.len() + 1);
    sig_with_flag.extend_from_slice(signature);
    sig_with_flag.push(sighash_flag);

    let mut script = Vec::with_capacity(sig_with_flag.len() + public_key.len() + 2);
    push_data(&mut script, &sig_with_flag)?;
    push_data(&mut script, public_key)?;
    Ok(script)
}
