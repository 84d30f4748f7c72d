//! Bounded retry policy for upstream calls.
//!
//! Kept separate from business logic: call sites decide *whether* an
//! operation is retryable (an OAuth code exchange never is - the code is
//! single-use), the policy only decides *how often* and *how long* to
//! wait. Delays grow exponentially with a random jitter so concurrent
//! retries from multiple instances do not synchronize.

use std::time::Duration;

use rand::Rng;

/// A bounded retry policy with exponential backoff and jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy for idempotent platform calls (webhook registration,
    /// charge status fetch).
    pub const UPSTREAM: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_millis(250),
    };

    /// Delay before retry number `retry` (1-based), with jitter applied.
    ///
    /// Returns `None` once the attempt budget is exhausted.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_attempts {
            return None;
        }
        let exp = self.base_delay.saturating_mul(1 << (retry - 1).min(16));
        // Full jitter: anywhere between zero and the exponential delay.
        let jitter_ms = rand::rng().random_range(0..=exp.as_millis().min(u128::from(u64::MAX)));
        Some(Duration::from_millis(
            u64::try_from(jitter_ms).unwrap_or(u64::MAX),
        ))
    }

    /// Run `op` under this policy, retrying while `is_retryable` says the
    /// error is transient.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted or the error is
    /// not retryable.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) => {
                    let Some(delay) = self.backoff(attempt) else {
                        return Err(e);
                    };
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying upstream call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
