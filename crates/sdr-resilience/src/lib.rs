//! # SDR Resilience
//!
//! Guards for calls to unreliable downstream services (LLM, messaging APIs):
//! error classification, retry with exponential backoff, circuit breaking,
//! sliding-window rate limiting and a façade that turns any failure into a
//! user-safe fallback reply.
//!
//! Nothing here is global. Build a [`ResilienceToolkit`] once and share it.

pub mod circuit_breaker;
pub mod classifier;
pub mod context;
pub mod error;
pub mod fallback;
pub mod notifier;
pub mod rate_limiter;
pub mod retry;
pub mod toolkit;
pub mod validation;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classifier::{classify, is_non_retryable, ErrorInfo, NON_RETRYABLE_CODES};
pub use context::OperationContext;
pub use error::{ErrorKind, RetryReport, ServiceError, Severity};
pub use fallback::{FallbackAction, FallbackCatalog, FallbackResponse};
pub use notifier::{CriticalNotifier, LogNotifier, NotifyError};
pub use rate_limiter::RateLimiter;
pub use retry::{execute_with_retry, RetryConfig, RetryOptions};
pub use toolkit::{ErrorSummary, HandledError, ResilienceToolkit, DEFAULT_NOTIFY_TIMEOUT};
pub use validation::{validate_input, FieldKind, FieldRule};
