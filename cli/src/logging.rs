use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use aris_core::api::LoggingConfig;

/// Installs the global subscriber: a log file truncated at startup, plus the
/// console when enabled. Keep the guard alive until exit so the file is flushed.
pub fn init(cfg: &LoggingConfig) -> Result<WorkerGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&cfg.file)
        .with_context(|| format!("open log file {}", cfg.file))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let default_level = if cfg.console { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let console_layer = cfg
        .console
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}
