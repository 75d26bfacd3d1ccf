//! File logging. The terminal belongs to the operator, so tracing output goes to `logs/`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_FILE: &str = "theme-builder.log";

/// Install the global subscriber. `RUST_LOG` overrides the default level.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
pub fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let default_level = if verbose { "theme_builder=debug" } else { "theme_builder=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok(guard)
}
