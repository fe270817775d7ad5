//! Subscriber setup for the binary and the Python entry point.
//!
//! The library itself only emits `tracing` events; whoever embeds it decides
//! whether and where a subscriber is installed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::CrawlError;
use crate::settings::LogSettings;

const LOG_FILE_PREFIX: &str = "crawler.log";

/// Keeps the background file writer alive. Drop it at shutdown to flush.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Installs the console layer and, when a directory is configured, a daily
/// rolling file layer.
pub fn init(settings: &LogSettings) -> Result<LogGuard, CrawlError> {
    let console = if settings.json {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let (file_layer, file_guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| CrawlError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_file(true)
                .with_line_number(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter(settings))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| CrawlError::Runtime(format!("logging already initialized: {e}")))?;

    Ok(LogGuard { _file: file_guard })
}
