//! Bounded exponential backoff for provider calls.
//!
//! Classification of a failed attempt:
//! - 401: never retried, returned as-is
//! - 503: converted to [`LlmError::ModelUnavailable`] and returned, so the
//!   caller switches models instead of hammering this one
//! - 429 and everything else: `min(base * 2^attempt, max)` sleep, then retry

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::LlmError;

/// Retry budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds or the policy gives up.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_auth_failure() {
            return Err(err);
        }

        if err.status() == Some(503) {
            return Err(LlmError::ModelUnavailable {
                message: err.to_string(),
            });
        }

        if attempt + 1 >= attempts {
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        if err.is_rate_limited() {
            warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Rate limit hit, retrying");
        } else {
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
