//! Logging setup for binaries.
//!
//! The library itself only emits `tracing` events; nothing in it installs a
//! subscriber. Binaries call [`init_logging`] once at startup.
//!
//! Filter priority:
//! 1. `RUST_LOG`
//! 2. `SWARMSYNC_LOG`
//! 3. the configured level
//!
//! ```text
//! RUST_LOG=info,swarmsync::transfer=debug swarmsync sync ref.bin out.bin
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Application-specific filter variable.
pub const LOG_ENV: &str = "SWARMSYNC_LOG";

/// Errors while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file directory could not be created.
    #[error("failed to create log directory {}: {source}", path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A global subscriber is already installed.
    #[error("failed to install logger: {0}")]
    Init(String),
}

/// Keeps the background log writer alive; logs are flushed on drop.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter from the environment, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| std::env::var(LOG_ENV).ok())
        .unwrap_or_else(|| default_level.to_string());

    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Logs go to stderr in compact form and, when `settings.file` is set, also
/// to that file through a non-blocking writer.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, LoggingError> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .compact();

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "swarmsync.log".into());

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_falls_back_on_garbage() {
        // An invalid directive must not panic.
        let _ = env_filter("=[not valid");
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("logs/swarmsync.log");
        let (_writer, _guard) = file_writer(&path).unwrap();
        assert!(temp.path().join("logs").is_dir());
    }
}
