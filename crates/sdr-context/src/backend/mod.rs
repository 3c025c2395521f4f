//! Key-value backend port and its adapters

mod memory;
mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

pub use self::memory::MemoryBackend;
pub use self::redis::{parse_info_field, reconnect_delay, RedisBackend};

/// Remaining lifetime of a key, mirroring the `TTL` command's three outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (`-2`)
    Missing,
    /// Key exists without an expiration (`-1`)
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    pub fn from_redis(secs: i64) -> Self {
        match secs {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            s => KeyTtl::Expires(Duration::from_secs(s as u64)),
        }
    }
}

/// Store-level metrics used by context statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub memory_usage: String,
    pub uptime_secs: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` and (re)set the expiration to `ttl_secs`.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Returns whether a key was removed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Returns whether the key existed.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    async fn server_info(&self) -> Result<ServerInfo, StoreError>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_from_redis() {
        assert_eq!(KeyTtl::from_redis(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_redis(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_redis(0), KeyTtl::Expires(Duration::ZERO));
        assert_eq!(KeyTtl::from_redis(86_400), KeyTtl::Expires(Duration::from_secs(86_400)));
    }
}
