//! Failure taxonomy for guarded operations

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::context::OperationContext;

/// Metadata attached once every retry attempt has failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryReport {
    pub attempts: u32,
    pub context: OperationContext,
    pub timestamp: DateTime<Utc>,
    pub handled: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Network-level failure, `code` is the socket error (`ECONNREFUSED`, ...)
    #[error("Connection error [{code}]: {message}")]
    Connection { code: String, message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Operation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Circuit breaker is OPEN")]
    CircuitOpen,

    #[error("Rate limit exceeded for {key}")]
    RateLimited { key: String },

    #[error("{message}")]
    Failure {
        code: Option<String>,
        message: String,
        critical: bool,
    },

    #[error("{source} (gave up after {} attempts)", .report.attempts)]
    Exhausted {
        source: Box<ServiceError>,
        report: RetryReport,
    },
}

impl ServiceError {
    pub fn connection(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Connection {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ServiceError::Failure {
            code: None,
            message: message.into(),
            critical: false,
        }
    }

    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Failure {
            code: Some(code.into()),
            message: message.into(),
            critical: false,
        }
    }

    /// A failure the caller has flagged as critical: never retried.
    pub fn critical(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Failure {
            code: Some(code.into()),
            message: message.into(),
            critical: true,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> String {
        match self {
            ServiceError::Connection { code, .. } => code.clone(),
            ServiceError::Http { status, .. } => format!("HTTP_{}", status),
            ServiceError::Validation { .. } => "VALIDATION_ERROR".to_string(),
            ServiceError::Timeout { .. } => "TIMEOUT".to_string(),
            ServiceError::CircuitOpen => "CIRCUIT_OPEN".to_string(),
            ServiceError::RateLimited { .. } => "RATE_LIMIT".to_string(),
            ServiceError::Failure { code, .. } => code.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            ServiceError::Exhausted { source, .. } => source.code(),
        }
    }

    pub fn is_flagged_critical(&self) -> bool {
        match self {
            ServiceError::Failure { critical, .. } => *critical,
            ServiceError::Exhausted { source, .. } => source.is_flagged_critical(),
            _ => false,
        }
    }

    /// The error the last attempt failed with, without retry annotation.
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::Exhausted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn retry_report(&self) -> Option<&RetryReport> {
        match self {
            ServiceError::Exhausted { report, .. } => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Auth,
    RateLimit,
    Api,
    Validation,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
