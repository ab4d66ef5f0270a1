//! Tracing setup for kagami.
//!
//! Logs go to stderr. When a log directory is configured they are also
//! written, without colour, to a daily-rolling file through a non-blocking
//! writer.
//!
//! ```no_run
//! let _guard = kagami_telemetry::init_tracing(&kagami_telemetry::LogConfig::default());
//! tracing::info!("ready");
//! ```
//!
//! `RUST_LOG` always wins over the configured filter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix for rolling log files.
pub const LOG_FILE_NAME: &str = "kagami.log";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    /// Directory for rolling log files; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,
    /// Colour the stderr output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Filter from `RUST_LOG`, falling back to the configured directives and
    /// then to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when file logging is on; hold it for the
/// life of the process or buffered records are lost. A second call leaves the
/// first subscriber in place.
pub fn init_tracing(config: &LogConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi),
        )
        .with(file_layer)
        .try_init();

    match result {
        Ok(()) => {
            if let Some(dir) = &config.log_dir {
                tracing::debug!(log_dir = %dir.display(), "file logging enabled");
            }
            guard
        }
        Err(e) => {
            tracing::debug!(error = %e, "tracing already initialised");
            None
        }
    }
}
