//! Retry with exponential backoff

use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::classifier::is_non_retryable;
use crate::context::OperationContext;
use crate::error::{RetryReport, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Wait after the `attempt`-th failure (1-based):
    /// `initial * factor^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Copy with the given overrides applied.
    pub fn merged(&self, options: &RetryOptions) -> Self {
        Self {
            max_retries: options.max_retries.unwrap_or(self.max_retries),
            initial_delay: options.initial_delay.unwrap_or(self.initial_delay),
            max_delay: options.max_delay.unwrap_or(self.max_delay),
            backoff_factor: options.backoff_factor.unwrap_or(self.backoff_factor),
        }
    }
}

/// Per-call overrides of a [`RetryConfig`]. Unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub initial_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_factor: Option<f64>,
}

impl RetryOptions {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }
}

/// Run `operation` until it succeeds or attempts run out.
///
/// Non-retryable failures (see [`is_non_retryable`]) are returned as-is after
/// the attempt that produced them. When every attempt fails, the last error is
/// wrapped in [`ServiceError::Exhausted`] with a [`RetryReport`].
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    context: &OperationContext,
    config: &RetryConfig,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        info!(
            attempt = attempt,
            max_attempts = max_attempts,
            context = ?context,
            "Executing operation (attempt {}/{})",
            attempt,
            max_attempts
        );

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt = attempt, context = ?context, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        error!(
            attempt = attempt,
            code = %err.code(),
            error = %err,
            context = ?context,
            "Attempt {} failed",
            attempt
        );

        if is_non_retryable(&err) {
            error!(code = %err.code(), context = ?context, "Critical error detected, stopping retries");
            return Err(err);
        }

        if attempt >= max_attempts {
            error!(attempts = attempt, context = ?context, "All retry attempts failed");
            return Err(ServiceError::Exhausted {
                source: Box::new(err),
                report: RetryReport {
                    attempts: attempt,
                    context: context.clone(),
                    timestamp: Utc::now(),
                    handled: true,
                },
            });
        }

        let delay = config.delay_for(attempt);
        warn!(delay_ms = delay.as_millis() as u64, "Waiting {:?} before next attempt", delay);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
