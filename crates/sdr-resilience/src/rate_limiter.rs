use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::ServiceError;

/// Sliding-window limiter: at most `limit` admitted requests per key within
/// any `window`. Rejected requests are not recorded.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), ServiceError> {
        let now = Instant::now();
        let mut history = self.requests.entry(key.to_string()).or_default();

        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() >= self.limit {
            warn!(key = %key, limit = self.limit, "Rate limit exceeded");
            return Err(ServiceError::RateLimited { key: key.to_string() });
        }

        history.push_back(now);
        Ok(())
    }

    /// Requests still counted against `key` in the current window.
    pub fn in_window(&self, key: &str) -> usize {
        let now = Instant::now();
        self.requests
            .get(key)
            .map(|h| h.iter().filter(|t| now.duration_since(**t) < self.window).count())
            .unwrap_or(0)
    }

    /// Drop keys whose whole history has aged out.
    pub fn purge_idle(&self) {
        let now = Instant::now();
        self.requests
            .retain(|_, history| history.back().is_some_and(|t| now.duration_since(*t) < self.window));
    }

    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}
