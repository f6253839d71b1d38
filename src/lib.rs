//! Chartfeed Library
//!
//! Keeps stock chart displays supplied with market data: raw provider ticks
//! are aggregated into chart-ready series, memoized in a quote/chart cache,
//! fetched by concurrent refresh tasks, and applied by a single consumer.

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod iex;
pub mod metrics;
pub mod model;
pub mod refresh;

pub use error::{ChartError, Result};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// Initialize tracing subscriber for logging.
///
/// With a log file, output also goes to a daily rolling file; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init_logging(level: &str, log_file: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chartfeed={}", level).into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;

            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
