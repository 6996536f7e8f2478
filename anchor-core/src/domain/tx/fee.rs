use crate::foundation::AnchorError;

/// Fee for a transaction of `size_bytes` at `rate_per_kb` smallest units
/// per 1000 bytes, rounded up, floored at `min_fee`.
///
/// Monotonic in size for a fixed rate: adding bytes never decreases the fee.
pub fn fee_for_size(size_bytes: usize, rate_per_kb: u64, min_fee: u64) -> Result<u64, AnchorError> {
    let size = size_bytes as u64;
    let scaled = size
        .checked_mul(rate_per_kb)
        .ok_or(AnchorError::FeeOverflow { size_bytes: size, rate_per_kb })?;
    let fee = scaled.div_ceil(1000);
    Ok(fee.max(min_fee))
}
