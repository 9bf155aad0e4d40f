use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// base * attempt
    Linear(Duration),
    /// base * 2^(attempt - 1)
    Exponential(Duration),
}

impl Backoff {
    /// Delay to wait after the failed `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear(base) => base.saturating_mul(attempt),
            Backoff::Exponential(base) => base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// `retries` additional attempts after the first, linear backoff.
    pub fn linear(retries: u32, base_delay: Duration) -> Self {
        Self { max_attempts: retries.saturating_add(1), backoff: Backoff::Linear(base_delay) }
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts run out.
/// `op` receives the 1-based attempt number.
pub async fn retry_with<F, Fut, T, E, R>(policy: RetryPolicy, is_retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.backoff.delay(attempt);
                log::debug!("attempt {}/{} failed: {}; retrying in {:?}", attempt, max_attempts, e, delay);
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
