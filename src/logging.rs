//! Subscriber setup
//!
//! One rolling, non-blocking file sink. Text mode also echoes to stdout.
//! Every use case runs inside `Context::span()`; JSON lines carry that span's
//! `correlation_id` and `instrument` fields so one unit of work can be grepped
//! across services.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogConfig;
use crate::error::EngineError;

/// Overrides `log_level` when set, e.g. `PIX_LOG=pix_lifecycle=debug`
pub const LOG_ENV: &str = "PIX_LOG";

fn rotation(name: &str) -> Result<Rotation, EngineError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "minutely" => Ok(Rotation::MINUTELY),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        "never" => Ok(Rotation::NEVER),
        other => Err(EngineError::Config(format!("unknown log rotation '{}'", other))),
    }
}

fn filter(config: &LogConfig) -> Result<EnvFilter, EngineError> {
    match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| EngineError::Config(format!("log_level '{}': {}", config.log_level, e))),
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the process; dropping it
/// flushes and stops the file writer.
pub fn init_logging(config: &LogConfig) -> Result<WorkerGuard, EngineError> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation(&config.rotation)?)
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)
        .map_err(|e| EngineError::Config(format!("log_dir '{}': {}", config.log_dir, e)))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let registry = tracing_subscriber::registry().with(filter(config)?);

    let installed = if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(file_writer)
            .with_ansi(false);
        registry.with(file_layer).try_init()
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(file_writer)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).try_init()
    };
    installed.map_err(|e| EngineError::System(format!("subscriber already installed: {}", e)))?;

    Ok(guard)
}
