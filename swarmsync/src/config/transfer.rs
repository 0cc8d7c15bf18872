//! Tunables handed to every download manager.

use crate::delta::default_part_length;
use crate::transfer::SourceSelection;

/// Default maximum bytes per range request (32 KiB).
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 32 * 1024;

/// Default minimum file size for delta-sync.
///
/// Below this, fetching the whole file costs less than exchanging a
/// signature record.
pub const DEFAULT_MIN_DELTA_SIZE: u64 = 8000;

/// Default number of outstanding range requests per source.
pub const DEFAULT_MAX_REQUESTS_PER_SOURCE: usize = 15;

/// Default number of consecutive digest mismatches before a transfer breaks.
pub const DEFAULT_MAX_VERIFICATION_FAILURES: u32 = 3;

/// Transfer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Largest range requested from a source at once.
    pub max_chunk_size: u64,
    /// Smallest file for which delta-sync is attempted.
    pub min_delta_size: u64,
    /// Outstanding range requests allowed per source.
    pub max_requests_per_source: usize,
    /// Block size for signature records; `None` derives it from the file size.
    pub part_length: Option<u64>,
    /// How the next range request picks its source.
    pub source_selection: SourceSelection,
    /// Consecutive digest mismatches tolerated before breaking.
    pub max_verification_failures: u32,
    /// Worker threads for the default pool (0 = one per CPU).
    pub worker_threads: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_delta_size: DEFAULT_MIN_DELTA_SIZE,
            max_requests_per_source: DEFAULT_MAX_REQUESTS_PER_SOURCE,
            part_length: None,
            source_selection: SourceSelection::default(),
            max_verification_failures: DEFAULT_MAX_VERIFICATION_FAILURES,
            worker_threads: 0,
        }
    }
}

impl TransferConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum range request size (minimum 1).
    pub fn with_max_chunk_size(mut self, bytes: u64) -> Self {
        self.max_chunk_size = bytes.max(1);
        self
    }

    /// Set the delta-sync size threshold.
    pub fn with_min_delta_size(mut self, bytes: u64) -> Self {
        self.min_delta_size = bytes;
        self
    }

    /// Set the per-source request budget (minimum 1).
    pub fn with_max_requests_per_source(mut self, count: usize) -> Self {
        self.max_requests_per_source = count.max(1);
        self
    }

    /// Fix the signature block size.
    pub fn with_part_length(mut self, bytes: u64) -> Self {
        self.part_length = Some(bytes.max(1));
        self
    }

    /// Set the source selection strategy.
    pub fn with_source_selection(mut self, selection: SourceSelection) -> Self {
        self.source_selection = selection;
        self
    }

    /// Set how many digest mismatches are tolerated (minimum 1).
    pub fn with_max_verification_failures(mut self, count: u32) -> Self {
        self.max_verification_failures = count.max(1);
        self
    }

    /// Set the worker thread count.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Block size to use for a file of `file_size` bytes.
    pub fn part_length_for(&self, file_size: u64) -> u64 {
        self.part_length
            .unwrap_or_else(|| default_part_length(file_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.max_chunk_size, 32 * 1024);
        assert_eq!(config.min_delta_size, 8000);
        assert_eq!(config.max_requests_per_source, 15);
        assert_eq!(config.max_verification_failures, 3);
        assert_eq!(config.source_selection, SourceSelection::FirstEligible);
        assert!(config.part_length.is_none());
    }

    #[test]
    fn test_builders_clamp() {
        let config = TransferConfig::new()
            .with_max_chunk_size(0)
            .with_max_requests_per_source(0)
            .with_max_verification_failures(0);
        assert_eq!(config.max_chunk_size, 1);
        assert_eq!(config.max_requests_per_source, 1);
        assert_eq!(config.max_verification_failures, 1);
    }

    #[test]
    fn test_part_length_for() {
        let config = TransferConfig::default();
        assert_eq!(config.part_length_for(1_000_000), 1000);
        assert_eq!(config.with_part_length(4096).part_length_for(1_000_000), 4096);
    }
}
