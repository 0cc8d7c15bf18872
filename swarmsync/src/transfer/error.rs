//! Error and problem types for the transfer engine.
//!
//! [`TransferError`] is returned for API misuse and construction failures.
//! Runtime failures of a running transfer never surface as `Err`; they move
//! the manager to BROKEN and are reported as a [`TransferProblem`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::source::SourceId;
use crate::delta::DeltaError;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors returned by the download manager API.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source is already attached to this transfer.
    #[error("source {0} is already attached")]
    DuplicateSource(SourceId),

    /// The admission policy refused the source.
    #[error("source {source_id} refused: {reason}")]
    SourceRejected { source_id: SourceId, reason: String },

    /// No such source is attached.
    #[error("unknown source {0}")]
    UnknownSource(SourceId),

    /// The temp file could not be created or opened.
    #[error("failed to open temp file {}: {source}", path.display())]
    TempFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A delta-sync stage failed.
    #[error(transparent)]
    Delta(#[from] DeltaError),
}

/// Why a transfer became BROKEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferProblem {
    /// The local candidate or temp file vanished.
    FileNotFound,
    /// Reading or writing a file failed.
    IoError,
    /// Any other failure.
    General,
    /// The caller broke the transfer explicitly.
    BrokenDownload,
    /// The assembled file failed digest verification too many times.
    VerificationFailed,
}

impl TransferProblem {
    /// Classify a delta-sync failure.
    pub fn from_delta(err: &DeltaError) -> Self {
        match err {
            DeltaError::NotFound { .. } => TransferProblem::FileNotFound,
            DeltaError::Read { .. } | DeltaError::Write { .. } => TransferProblem::IoError,
            _ => TransferProblem::General,
        }
    }
}

impl fmt::Display for TransferProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransferProblem::FileNotFound => "file not found",
            TransferProblem::IoError => "I/O error",
            TransferProblem::General => "general failure",
            TransferProblem::BrokenDownload => "download broken",
            TransferProblem::VerificationFailed => "verification failed",
        };
        f.write_str(text)
    }
}
