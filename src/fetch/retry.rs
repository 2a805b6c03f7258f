//! Bounded retry with exponential backoff for fetches.

use crate::core::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after that.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; no delay before the first
        let exponent = attempt.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1 << exponent)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Exhaustion is reported as `AppError::Transport` carrying the last failure.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt);
                tracing::debug!(target: "fetch_task", "Retrying {} in {:?} (attempt {}/{})", target, delay, attempt, self.max_attempts);
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) => {
                    tracing::warn!(target: "fetch_task", "Attempt {}/{} for {} failed: {}", attempt, self.max_attempts, target, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let message = match last_error {
            Some(e) => format!("gave up after {} attempt(s): {}", self.max_attempts, e),
            None => "no attempts were made".to_string(),
        };
        Err(AppError::transport(target, message))
    }
}

/// Server errors, throttling, timeouts and connection failures are worth another try.
/// Client errors are not.
fn is_retryable(error: &AppError) -> bool {
    match error {
        AppError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
        AppError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        AppError::Timeout(_) | AppError::Transport { .. } | AppError::Io(_) => true,
        _ => false,
    }
}
