//! Configuration management
//!
//! Values resolve lowest to highest: built-in defaults, `config/default.*`,
//! environment (after `.env` is loaded), explicit overrides.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::*;
use crate::error::AppError;

/// Key-value store connection and context record settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StoreSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Record time-to-live in seconds, reset on every write (`REDIS_TTL`)
    #[serde(rename = "ttl")]
    pub ttl_secs: u64,
    pub prefix: String,
    pub max_retries_per_request: u32,
    pub required_fields: Vec<String>,
}

/// Explicit constructor configuration. Every `Some` wins over the environment.
#[derive(Debug, Default, Clone)]
pub struct StoreOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub ttl_secs: Option<u64>,
    pub prefix: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: None,
            db: DEFAULT_REDIS_DB,
            ttl_secs: DEFAULT_CONTEXT_TTL_SECS,
            prefix: DEFAULT_CONTEXT_PREFIX.to_string(),
            max_retries_per_request: DEFAULT_MAX_RETRIES_PER_REQUEST,
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl StoreSettings {
    /// Load from defaults, optional config file and `REDIS_*` environment.
    pub fn load() -> Result<Self, AppError> {
        Self::load_with(&StoreOverrides::default())
    }

    pub fn load_with(overrides: &StoreOverrides) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let env = Environment::with_prefix("REDIS")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("required_fields");
        Ok(Self::build(env, overrides)?)
    }

    fn build(env: Environment, overrides: &StoreOverrides) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("db", defaults.db)?
            .set_default("ttl", defaults.ttl_secs)?
            .set_default("prefix", defaults.prefix)?
            .set_default("max_retries_per_request", defaults.max_retries_per_request as i64)?
            .set_default("required_fields", defaults.required_fields)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(env)
            .set_override_option("host", overrides.host.clone())?
            .set_override_option("port", overrides.port.map(|p| p as i64))?
            .set_override_option("password", overrides.password.clone())?
            .set_override_option("db", overrides.db)?
            .set_override_option("ttl", overrides.ttl_secs)?
            .set_override_option("prefix", overrides.prefix.clone())?
            .build()?;
        config.try_deserialize()
    }

    /// `redis://[:password@]host:port/db`
    pub fn connection_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Namespaced key for a conversation identifier.
    pub fn key_for(&self, conversation_id: &str) -> String {
        format!("{}{}", self.prefix, conversation_id)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Rotation period of the file sinks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

/// Log sinks: console plus rotating combined and error-only files.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub dir: String,
    pub rotation: LogRotation,
    /// Rotated error files kept on disk
    pub error_max_files: usize,
    /// Rotated combined files kept on disk
    pub combined_max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
            dir: DEFAULT_LOG_DIR.to_string(),
            rotation: LogRotation::Daily,
            error_max_files: ERROR_LOG_MAX_FILES,
            combined_max_files: COMBINED_LOG_MAX_FILES,
        }
    }
}

impl LogSettings {
    /// Load from defaults and `LOG_*` environment (`LOG_LEVEL`, `LOG_FORMAT`, `LOG_DIR`, `LOG_ROTATION`).
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Ok(Self::build(Environment::with_prefix("LOG").try_parsing(true))?)
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config::builder()
            .set_default("level", defaults.level)?
            .set_default("format", "pretty")?
            .set_default("dir", defaults.dir)?
            .set_default("rotation", "daily")?
            .set_default("error_max_files", defaults.error_max_files as u64)?
            .set_default("combined_max_files", defaults.combined_max_files as u64)?
            .add_source(env)
            .build()?;
        config.try_deserialize()
    }
}
