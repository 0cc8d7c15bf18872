//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use swarmsync::config::ConfigError;
use swarmsync::delta::DeltaError;
use swarmsync::logging::LoggingError;
use swarmsync::transfer::TransferError;

/// Everything a command can fail with.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments or configuration.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// Reading, matching or hashing a file failed.
    Delta(DeltaError),
    /// The transfer could not be created or a peer was refused.
    Transfer(TransferError),
    /// A file operation outside the library failed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Formatting command output failed.
    Output(String),
    /// The transfer ended without a complete file.
    Sync(String),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }

    /// Print the error and exit with a failure status.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(1);
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Delta(e) => write!(f, "{}", e),
            CliError::Transfer(e) => write!(f, "{}", e),
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CliError::Output(msg) => write!(f, "Failed to format output: {}", msg),
            CliError::Sync(msg) => write!(f, "Sync failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<DeltaError> for CliError {
    fn from(e: DeltaError) -> Self {
        CliError::Delta(e)
    }
}

impl From<TransferError> for CliError {
    fn from(e: TransferError) -> Self {
        CliError::Transfer(e)
    }
}
