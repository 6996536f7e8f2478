use crate::foundation::AnchorError;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: crate::foundation::DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        let exp = self.base_delay.checked_mul(factor).unwrap_or(self.max_delay);
        let capped = if exp > self.max_delay { self.max_delay } else { exp };

        // Jitter ±20% based on wall-clock nanos (good enough; avoids pulling
        // randomness into every call site).
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos() as u64).unwrap_or(0);
        let bucket = (nanos % 41) as i64 - 20; // [-20..20]
        let ppm = 1_000_000 + bucket * 10_000;
        let jittered_ms = (capped.as_millis() as i64).saturating_mul(ppm) / 1_000_000;
        Duration::from_millis(jittered_ms.max(1) as u64)
    }
}

/// Retry an async operation with bounded exponential backoff.
///
/// `is_retryable` decides per error: network trouble and 5xx-class outages
/// are worth another attempt; 4xx-class and logical failures surface
/// immediately. Both external clients share this one combinator.
pub async fn retry_with_backoff<F, Fut, T, P>(policy: RetryPolicy, is_retryable: P, mut op: F) -> Result<T, AnchorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnchorError>>,
    P: Fn(&AnchorError) -> bool,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                log::warn!("retryable failure attempt={} of {} error={}", attempt + 1, attempts, err);
                last_err = Some(err);
                if attempt + 1 < attempts {
                    sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AnchorError::Message("retry exhausted".to_string())))
}
