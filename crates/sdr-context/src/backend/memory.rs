use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{KeyTtl, KvBackend, ServerInfo};
use crate::error::StoreError;

struct Entry {
    value: String,
    expires_at: Option<Instant>, // None: no expiry
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process backend with lazy expiry, for tests and single-node use.
pub struct MemoryBackend {
    map: DashMap<String, Entry>,
    started_at: Instant,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            map: DashMap::new(),
            started_at: Instant::now(),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write without an expiration, like a bare `SET`.
    pub fn set_persistent(&self, key: &str, value: &str) {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `key` only if it is still expired under the write lock, so an
    /// entry rewritten since the read survives.
    fn evict_expired(&self, key: &str, now: Instant) {
        self.map.remove_if(key, |_, e| e.is_expired(now));
    }

    fn approx_mem_bytes(&self) -> u64 {
        // key + value + rough per-entry overhead
        self.map
            .iter()
            .map(|r| (r.key().len() + r.value.len() + 64) as u64)
            .sum()
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let value = match self.map.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.value.clone()),
        };
        if value.is_none() {
            self.evict_expired(key, now);
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.map.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .map
            .iter()
            .filter(|r| r.key().starts_with(prefix) && !r.is_expired(now))
            .map(|r| r.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = Instant::now();
        Ok(match self.map.get(key) {
            None => KeyTtl::Missing,
            Some(e) if e.is_expired(now) => KeyTtl::Missing,
            Some(e) => match e.expires_at {
                None => KeyTtl::Persistent,
                Some(at) => KeyTtl::Expires(at.saturating_duration_since(now)),
            },
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.map.get_mut(key) {
            Some(mut e) if !e.is_expired(now) => {
                e.expires_at = Some(now + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn server_info(&self) -> Result<ServerInfo, StoreError> {
        Ok(ServerInfo {
            memory_usage: format_bytes(self.approx_mem_bytes()),
            uptime_secs: self.started_at.elapsed().as_secs(),
        })
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "v", 10).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert_eq!(backend.ttl("k").await.unwrap(), KeyTtl::Missing);
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_read_keeps_fresh_rewrite() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "old", 10).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        // a read saw the stale entry, then a writer got in before eviction
        let observed_at = Instant::now();
        backend.set_ex("k", "new", 10).await.unwrap();
        backend.evict_expired("k", observed_at);

        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_resets_ttl() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "v1", 100).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        backend.set_ex("k", "v2", 100).await.unwrap();

        assert_eq!(backend.ttl("k").await.unwrap(), KeyTtl::Expires(Duration::from_secs(100)));
    }

    #[tokio::test]
    async fn test_persistent_keys_and_expire() {
        let backend = MemoryBackend::new();
        backend.set_persistent("p", "v");
        assert_eq!(backend.ttl("p").await.unwrap(), KeyTtl::Persistent);

        assert!(backend.expire("p", 30).await.unwrap());
        assert!(matches!(backend.ttl("p").await.unwrap(), KeyTtl::Expires(_)));
        assert!(!backend.expire("missing", 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let backend = MemoryBackend::new();
        backend.set_ex("ctx:a", "1", 60).await.unwrap();
        backend.set_ex("ctx:b", "2", 60).await.unwrap();
        backend.set_ex("other:c", "3", 60).await.unwrap();

        let mut keys = backend.keys_with_prefix("ctx:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ctx:a".to_string(), "ctx:b".to_string()]);
    }

    #[tokio::test]
    async fn test_del_reports_removal() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "v", 60).await.unwrap();
        assert!(backend.del("k").await.unwrap());
        assert!(!backend.del("k").await.unwrap());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00K");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00M");
    }
}
