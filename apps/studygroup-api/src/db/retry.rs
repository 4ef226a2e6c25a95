//! Bounded retry for transactions that hit transient store failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ApiError;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_ms: u64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            base_ms,
        }
    }

    /// Sleep before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at [`MAX_BACKOFF_MS`], plus up to half of that again as jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
            .min(MAX_BACKOFF_MS);
        let jitter = if exp >= 2 {
            rand::thread_rng().gen_range(0..=exp / 2)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. Each call to `op` must open its own transaction.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < policy.attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "transient store error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
