use crate::error::NrfuError;
use chrono::Local;
use std::io;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    prelude::*,
    EnvFilter, Layer,
};

struct CustomTime;

impl FormatTime for CustomTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Initialize the tracing system for logging
///
/// # Arguments
///
/// * `level` - The log level to use ("error", "warn", "info", "debug", "trace")
///
/// Credentials are never written to the log at any level; transport-layer
/// messages carry only the host, command counts and durations.
pub fn init_logging(level: &str) -> Result<(), NrfuError> {
    let filter_level = match level.to_lowercase().as_str() {
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    // Create a filter based on RUST_LOG env var, or use our filter level
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_val) => EnvFilter::new(env_val),
        Err(_) => EnvFilter::new(level.to_lowercase()),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_timer(CustomTime)
                .with_filter(filter_level),
        )
        .try_init()
        .map_err(|e| NrfuError::LogError(e.to_string()))?;

    tracing::debug!("Logging initialized at {} level", level.to_uppercase());

    Ok(())
}
