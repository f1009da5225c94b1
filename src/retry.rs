use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff with jitter, so concurrent workers hitting the same
/// rate limit do not come back in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 5,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    /// `min(base * 2^retry, max) + jitter(0..base)` for a 0-indexed retry.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let capped = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);
        let jitter = if self.base_delay_secs > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_secs)
        } else {
            0
        };
        Duration::from_secs(capped + jitter)
    }
}

/// Run `operation` until it succeeds, `classifier` says abort, or the
/// retries run out. The last error is returned in the failure cases.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    label: &str,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        attempt += 1;
        if attempt >= total_attempts || classifier(&err) == RetryAction::Abort {
            return Err(err);
        }
        let delay = config.delay_for_retry(attempt - 1);
        tracing::warn!(
            "{}: attempt {}/{} failed, retrying in {}s: {}",
            label,
            attempt,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}
