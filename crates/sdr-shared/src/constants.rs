//! Application-wide constants

pub const SERVICE_NAME: &str = "orange-sdr";

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DB: i64 = 0;
/// 24 hours
pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 86_400;
pub const DEFAULT_CONTEXT_PREFIX: &str = "orange:sdr:context:";
pub const DEFAULT_MAX_RETRIES_PER_REQUEST: u32 = 3;

/// Fields a lead must provide before qualification is complete.
pub const DEFAULT_REQUIRED_FIELDS: [&str; 6] = ["nome", "cpf", "telefone", "email", "renda", "entrada"];

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const ERROR_LOG_MAX_FILES: usize = 5;
pub const COMBINED_LOG_MAX_FILES: usize = 10;
