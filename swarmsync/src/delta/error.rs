//! Error types for the delta-sync pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for delta-sync operations.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// Errors raised while building records, matching, copying or hashing.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// A required file does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The record describes a different file length than expected.
    #[error("signature record length mismatch: expected {expected} bytes, record has {actual}")]
    RecordMismatch { expected: u64, actual: u64 },

    /// The record is internally inconsistent.
    #[error("invalid signature record: {0}")]
    InvalidRecord(String),

    /// Encoding or decoding a record failed.
    #[error("record encoding error: {0}")]
    Encode(String),

    /// The operation was cancelled through its progress callback.
    #[error("operation cancelled")]
    Cancelled,
}

impl DeltaError {
    /// Map an I/O error from reading `path`, keeping not-found distinct.
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            DeltaError::NotFound { path }
        } else {
            DeltaError::Read { path, source }
        }
    }

    /// Map an I/O error from writing `path`.
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DeltaError::Write {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_not_found_maps_to_not_found() {
        let err = DeltaError::read("/a/b", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, DeltaError::NotFound { .. }));
        assert_eq!(err.to_string(), "file not found: /a/b");
    }

    #[test]
    fn test_read_other_keeps_source() {
        let err = DeltaError::read("/a/b", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, DeltaError::Read { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_record_mismatch_display() {
        let err = DeltaError::RecordMismatch {
            expected: 10,
            actual: 12,
        };
        assert!(err.to_string().contains("expected 10"));
    }
}
