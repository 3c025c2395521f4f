//! Redis adapter over a deadpool connection pool

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, Cmd, FromRedisValue};
use deadpool_redis::{Config, Pool, Runtime};
use sdr_shared::StoreSettings;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{KeyTtl, KvBackend, ServerInfo};
use crate::error::StoreError;

const RECONNECT_STEP_MS: u64 = 50;
const RECONNECT_MAX_MS: u64 = 2_000;

/// Capped linear reconnection backoff: `min(attempt * 50ms, 2s)`.
pub fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_millis((attempt as u64 * RECONNECT_STEP_MS).min(RECONNECT_MAX_MS))
}

/// Extract `field:value` from an `INFO` reply.
pub fn parse_info_field(info: &str, field: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == field).then(|| value.trim().to_string())
    })
}

pub struct RedisBackend {
    pool: Pool,
    max_retries_per_request: u32,
}

impl RedisBackend {
    /// Build the pool and ping the server once. An unreachable server is
    /// logged, not fatal: connections are established lazily per request.
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let pool = Config::from_url(settings.connection_url())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Config(e.to_string()))?;

        info!(host = %settings.host, port = settings.port, db = settings.db, "Redis client connected");

        let backend = Self {
            pool,
            max_retries_per_request: settings.max_retries_per_request,
        };

        match backend.run::<String>(&cmd("PING")).await {
            Ok(_) => info!("Redis client ready"),
            Err(e) => error!(error = %e, "Redis client error"),
        }

        Ok(backend)
    }

    async fn query<T: FromRedisValue>(&self, command: &Cmd) -> Result<T, StoreError> {
        let mut conn = self.pool.get().await?;
        Ok(command.query_async(&mut conn).await?)
    }

    /// Run a command, retrying connection failures with capped linear backoff.
    async fn run<T: FromRedisValue>(&self, command: &Cmd) -> Result<T, StoreError> {
        let mut attempt = 0;
        loop {
            match self.query(command).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection() && attempt < self.max_retries_per_request => {
                    attempt += 1;
                    let delay = reconnect_delay(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries_per_request,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Redis connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Redis Client Error");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run(cmd("GET").arg(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.run(cmd("SETEX").arg(key).arg(ttl_secs).arg(value)).await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.run(cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.run(cmd("KEYS").arg(format!("{}*", prefix))).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let secs: i64 = self.run(cmd("TTL").arg(key)).await?;
        Ok(KeyTtl::from_redis(secs))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let applied: i64 = self.run(cmd("EXPIRE").arg(key).arg(ttl_secs)).await?;
        Ok(applied == 1)
    }

    async fn server_info(&self) -> Result<ServerInfo, StoreError> {
        let memory: String = self.run(cmd("INFO").arg("memory")).await?;
        let server: String = self.run(cmd("INFO").arg("server")).await?;

        Ok(ServerInfo {
            memory_usage: parse_info_field(&memory, "used_memory_human").unwrap_or_else(|| "unknown".to_string()),
            uptime_secs: parse_info_field(&server, "uptime_in_seconds")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    async fn close(&self) {
        debug!("Closing Redis pool");
        self.pool.close();
    }
}
