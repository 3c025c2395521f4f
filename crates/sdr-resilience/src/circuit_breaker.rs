//! Three-state circuit breaker around a single async operation.
//!
//! - CLOSED: calls pass through, consecutive failures are counted
//! - OPEN: calls are rejected with [`ServiceError::CircuitOpen`] until
//!   `reset_timeout` has elapsed since the last failure
//! - HALF_OPEN: one trial call is admitted; success closes the circuit,
//!   failure re-opens it and restarts the clock

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub threshold: u32,
    /// Per-call timeout, counted as a failure when hit
    pub timeout: Duration,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Clears the half-open trial call slot even if the caller drops the call future.
struct TrialGuard<'a>(&'a Mutex<BreakerState>);

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().trial_in_flight = false;
    }
}

pub struct CircuitBreaker<F> {
    operation: F,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl<F> CircuitBreaker<F> {
    pub fn new(operation: F, config: CircuitBreakerConfig) -> Self {
        Self {
            operation,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    /// State as last recorded. An OPEN circuit whose reset timeout has
    /// elapsed reports OPEN until the next call moves it to HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Invoke the wrapped operation through the breaker.
    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T, ServiceError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let is_trial = self.admit()?;
        let _trial = is_trial.then(|| TrialGuard(&self.inner));

        let outcome = match tokio::time::timeout(self.config.timeout, (self.operation)(args)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                after: self.config.timeout,
            }),
        };

        match outcome {
            Ok(value) => {
                self.on_success(is_trial);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    /// Returns whether this call is the half-open trial call.
    fn admit(&self) -> Result<bool, ServiceError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if !cooled {
                    return Err(ServiceError::CircuitOpen);
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!("Circuit breaker entering HALF_OPEN state");
                Ok(true)
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(ServiceError::CircuitOpen),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(true)
            }
        }
    }

    /// Only the half-open trial call may close the circuit. A call admitted while
    /// CLOSED that finishes after the circuit tripped leaves it OPEN.
    fn on_success(&self, is_trial: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen if is_trial => {
                inner.failures = 0;
                inner.state = CircuitState::Closed;
                info!("Circuit breaker reset to CLOSED state");
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, err: &ServiceError) {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        let tripped = inner.failures >= self.config.threshold.max(1);
        if tripped || inner.state == CircuitState::HalfOpen {
            if inner.state != CircuitState::Open {
                error!(
                    failures = inner.failures,
                    threshold = self.config.threshold,
                    code = %err.code(),
                    "Circuit breaker opened due to failures"
                );
            }
            inner.state = CircuitState::Open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: 2,
            timeout: Duration::from_secs(1),
            reset_timeout: Duration::from_secs(30),
        }
    }

    /// Operation whose outcome is switched by the flag; counts invocations.
    fn switchable(
        healthy: Arc<AtomicBool>,
        calls: Arc<AtomicU32>,
    ) -> impl Fn(u32) -> std::future::Ready<Result<u32, ServiceError>> {
        move |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            if healthy.load(Ordering::SeqCst) {
                std::future::ready(Ok(n * 2))
            } else {
                std::future::ready(Err(ServiceError::http(503, "down")))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let healthy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreaker::new(switchable(healthy, calls.clone()), config());

        assert!(breaker.call(1).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.call(1).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        assert_eq!(breaker.call(1).await.unwrap_err(), ServiceError::CircuitOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let healthy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreaker::new(switchable(healthy.clone(), calls.clone()), config());

        let _ = breaker.call(1).await;
        let _ = breaker.call(1).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        healthy.store(true, Ordering::SeqCst);

        assert_eq!(breaker.call(21).await.unwrap(), 42);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens_and_restarts_clock() {
        let healthy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreaker::new(switchable(healthy, calls.clone()), config());

        let _ = breaker.call(1).await;
        let _ = breaker.call(1).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(breaker.call(1).await.unwrap_err(), ServiceError::http(503, "down"));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.call(1).await.unwrap_err(), ServiceError::CircuitOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let healthy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreaker::new(switchable(healthy.clone(), calls), config());

        let _ = breaker.call(1).await;
        assert_eq!(breaker.failure_count(), 1);

        healthy.store(true, Ordering::SeqCst);
        breaker.call(1).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);

        healthy.store(false, Ordering::SeqCst);
        let _ = breaker.call(1).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_and_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            |_: ()| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ServiceError>(())
            },
            config(),
        );

        let err = breaker.call(()).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout { after: Duration::from_secs(1) });
        assert_eq!(breaker.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_in_half_open() {
        let breaker = CircuitBreaker::new(
            |fail: bool| async move {
                if fail {
                    return Err(ServiceError::failure("boom"));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            },
            config(),
        );

        let _ = breaker.call(true).await;
        let _ = breaker.call(true).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        let (a, b) = tokio::join!(breaker.call(false), breaker.call(false));
        let rejected = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(ServiceError::CircuitOpen)))
            .count();
        assert_eq!(rejected, 1);
        assert!(a.is_ok() || b.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_open_circuit() {
        let breaker = CircuitBreaker::new(
            |delay_ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if delay_ms < 100 {
                    Err(ServiceError::failure("fast failure"))
                } else {
                    Ok(())
                }
            },
            CircuitBreakerConfig {
                threshold: 1,
                timeout: Duration::from_secs(5),
                reset_timeout: Duration::from_secs(30),
            },
        );

        let (slow, fast) = tokio::join!(breaker.call(500), breaker.call(10));
        assert!(slow.is_ok());
        assert!(fast.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(breaker.call(500).await.unwrap_err(), ServiceError::CircuitOpen);
    }

    #[test]
    fn test_state_serializes_upper_case() {
        assert_eq!(serde_json::to_value(CircuitState::HalfOpen).unwrap(), "HALF_OPEN");
    }
}
