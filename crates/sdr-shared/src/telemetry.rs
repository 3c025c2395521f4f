//! Telemetry setup
//!
//! Three sinks share one registry: a console layer, a combined JSON file and
//! an error-only JSON file. Both files rotate on the configured period and
//! keep a bounded number of old files.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::{LogFormat, LogRotation, LogSettings};
use crate::constants::SERVICE_NAME;

/// Keeps the background log writers alive. Dropping it flushes pending records.
#[must_use = "dropping the guard stops the file sinks"]
pub struct TelemetryGuard {
    _guards: Vec<WorkerGuard>,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Non-blocking rolling writer for `<dir>/<name>.<period>.log`
/// (`<dir>/<name>.log` when rotation is off).
pub fn rotating_writer(
    dir: &Path,
    name: &str,
    rotation: LogRotation,
    max_files: usize,
) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(rotation.into())
        .filename_prefix(name)
        .filename_suffix("log")
        .max_log_files(max_files.max(1))
        .build(dir)
        .with_context(|| format!("opening {} log in {}", name, dir.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

pub fn init_telemetry(settings: &LogSettings) -> Result<TelemetryGuard> {
    // RUST_LOG wins over the configured level
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(&settings.level)?,
    };

    let dir = Path::new(&settings.dir);
    let (combined_writer, combined_guard) =
        rotating_writer(dir, "combined", settings.rotation, settings.combined_max_files)?;
    let (error_writer, error_guard) = rotating_writer(dir, "error", settings.rotation, settings.error_max_files)?;

    let console_pretty = (settings.format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .pretty()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
    });
    let console_json = (settings.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_pretty)
        .with(console_json)
        .with(
            fmt::layer()
                .json()
                .with_writer(combined_writer)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(error_writer)
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("installing global tracing subscriber")?;

    info!(
        service = SERVICE_NAME,
        level = %settings.level,
        dir = %settings.dir,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _guards: vec![combined_guard, error_guard],
    })
}
