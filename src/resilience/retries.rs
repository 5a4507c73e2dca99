//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible async operation a bounded number of times
//! - Wait with exponential backoff + jitter between attempts
//! - Report how many retries were spent, on success and on failure

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::calculate_backoff;

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(
            retry,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }
}

/// Final error after the retry budget is spent.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub retries: u32,
}

/// Run `op` until it succeeds or `policy.max_retries` retries are spent.
///
/// `op` receives the 0-based attempt number. On success returns the value
/// and the number of retries that were needed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retries = 0;
    loop {
        match op(retries).await {
            Ok(value) => return Ok((value, retries)),
            Err(error) if retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::warn!(attempt = retries, delay = ?delay, error = %error, "Operation failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(RetryError { error, retries }),
        }
    }
}
