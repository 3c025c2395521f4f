//! Single entry point bundling the resilience primitives.

use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::classifier::{self, ErrorInfo};
use crate::context::OperationContext;
use crate::error::{ErrorKind, ServiceError, Severity};
use crate::fallback::{FallbackCatalog, FallbackResponse};
use crate::notifier::{CriticalNotifier, LogNotifier};
use crate::rate_limiter::RateLimiter;
use crate::retry::{self, RetryConfig, RetryOptions};
use crate::validation::{self, FieldRule};

/// User-safe summary of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub message: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub severity: Severity,
}

/// What the caller sends back instead of the failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandledError {
    pub success: bool,
    pub error: ErrorSummary,
    pub fallback: FallbackResponse,
}

/// Upper bound on a critical-error notification before the fallback is returned.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ResilienceToolkit {
    retry: RetryConfig,
    fallbacks: Arc<FallbackCatalog>,
    notifier: Arc<dyn CriticalNotifier>,
    notify_timeout: Duration,
}

impl Default for ResilienceToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceToolkit {
    pub fn new() -> Self {
        Self {
            retry: RetryConfig::default(),
            fallbacks: Arc::new(FallbackCatalog::default()),
            notifier: Arc::new(LogNotifier),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fallbacks(mut self, fallbacks: FallbackCatalog) -> Self {
        self.fallbacks = Arc::new(fallbacks);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CriticalNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn classify(&self, error: &ServiceError) -> ErrorInfo {
        classifier::classify(error)
    }

    pub fn is_non_retryable(&self, error: &ServiceError) -> bool {
        classifier::is_non_retryable(error)
    }

    /// Retry `operation` with the toolkit's config, overridden by `options`.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: F,
        context: &OperationContext,
        options: RetryOptions,
    ) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let config = self.retry.merged(&options);
        retry::execute_with_retry(operation, context, &config).await
    }

    pub fn circuit_breaker<F>(&self, operation: F, config: CircuitBreakerConfig) -> CircuitBreaker<F> {
        CircuitBreaker::new(operation, config)
    }

    pub fn rate_limiter(&self, limit: usize, window: Duration) -> RateLimiter {
        RateLimiter::new(limit, window)
    }

    pub fn validate_input(&self, data: &Map<String, Value>, rules: &[FieldRule]) -> Result<(), ServiceError> {
        validation::validate_input(data, rules)
    }

    pub fn fallback_message(&self, kind: ErrorKind) -> &str {
        self.fallbacks.message_for(kind)
    }

    pub fn fallback_response(&self, context: &OperationContext) -> FallbackResponse {
        self.fallbacks.response_for(context)
    }

    /// Turn any failure into a user-safe [`HandledError`].
    ///
    /// Critical failures are forwarded to the notifier first, bounded by the
    /// notify timeout. Notifier failures and timeouts are logged and never
    /// surface to the caller.
    pub async fn handle(&self, error: &ServiceError, context: &OperationContext) -> HandledError {
        let info = classifier::classify(error);

        error!(
            code = %info.code,
            error_type = %info.kind,
            severity = %info.severity,
            error_message = %info.message,
            context = ?context,
            "Error handled"
        );

        if info.severity == Severity::Critical {
            match tokio::time::timeout(self.notify_timeout, self.notifier.notify(&info, context)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, code = %info.code, "Failed to deliver critical error notification");
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.notify_timeout.as_millis() as u64,
                        code = %info.code,
                        "Critical error notification timed out"
                    );
                }
            }
        }

        HandledError {
            success: false,
            error: ErrorSummary {
                message: self.fallbacks.message_for(info.kind).to_string(),
                code: info.code,
                kind: info.kind,
                severity: info.severity,
            },
            fallback: self.fallbacks.response_for(context),
        }
    }
}
