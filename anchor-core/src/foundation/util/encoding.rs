use crate::foundation::{AnchorError, Hash32};

/// Parse a 32-byte value from hex, with or without a `0x` prefix.
pub fn parse_hex_32bytes(s: &str) -> Result<Hash32, AnchorError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)?;
    let array: Hash32 = bytes
        .as_slice()
        .try_into()
        .map_err(|_| AnchorError::EncodingError(format!("expected 32 bytes, got {}", bytes.len())))?;
    Ok(array)
}

/// Decode a hex script, with or without a `0x` prefix.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, AnchorError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(stripped)?)
}
