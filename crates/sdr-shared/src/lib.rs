//! # SDR Shared
//!
//! Configuration loading, telemetry and shared error types for the
//! conversation persistence and resilience crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod telemetry;

pub use config::{LogFormat, LogRotation, LogSettings, StoreOverrides, StoreSettings};
pub use error::AppError;
pub use telemetry::{init_telemetry, TelemetryGuard};
