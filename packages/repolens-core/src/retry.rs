//! Exponential backoff with jitter for retryable dependency failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`
    /// plus up to 25% jitter, capped at `max_delay`. A `retry_after` hint
    /// from the dependency takes precedence over the computed base.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let base = hint.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        });
        let capped = base.min(self.max_delay);
        let jitter_ceiling = capped.as_millis() as u64 / 4;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        };
        (capped + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Enforce a per-call time budget; elapsing it yields `Error::Timeout`,
/// which the retry policy treats as retryable.
pub async fn with_timeout<T, Fut>(limit: Duration, name: &str, operation: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(crate::error::Error::Timeout(format!(
            "{name} exceeded {}s",
            limit.as_secs()
        ))),
    }
}

/// Run `operation`, retrying retryable errors per `policy`.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.attempts => {
                let delay = policy.delay_for(attempt, err.retry_after());
                warn!(
                    operation = name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
