//! Byte counter for transfer progress and throughput.

use std::time::{Duration, Instant};

/// Accumulates transferred bytes against the total size of a file.
///
/// The counter may start with bytes that were already present (for example
/// blocks reused by delta-sync). Those count towards completion but not
/// towards the measured transfer rate.
#[derive(Debug, Clone)]
pub struct TransferCounter {
    initial: u64,
    transferred: u64,
    total: u64,
    started_at: Instant,
}

impl TransferCounter {
    /// Create a counter for `total` bytes, `already_transferred` of which are present.
    pub fn new(already_transferred: u64, total: u64) -> Self {
        Self {
            initial: already_transferred,
            transferred: already_transferred,
            total,
            started_at: Instant::now(),
        }
    }

    /// Record a received chunk of `len` bytes.
    pub fn chunk_transferred(&mut self, len: u64) {
        self.transferred = self.transferred.saturating_add(len);
    }

    /// Bytes counted so far, including the initial offset.
    pub fn bytes_transferred(&self) -> u64 {
        self.transferred
    }

    /// Total size of the file.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Completion as a percentage (0.0 to 100.0).
    ///
    /// An empty file is reported as complete.
    pub fn completion_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.transferred.min(self.total) as f64 / self.total as f64) * 100.0
    }

    /// Average transfer rate since the counter was created.
    pub fn bytes_per_second(&self) -> f64 {
        self.rate_over(self.started_at.elapsed())
    }

    fn rate_over(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        (self.transferred - self.initial) as f64 / secs
    }

    /// Drop all progress and restart the rate measurement.
    pub fn reset(&mut self) {
        self.initial = 0;
        self.transferred = 0;
        self.started_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_new() {
        let counter = TransferCounter::new(0, 1000);
        assert_eq!(counter.bytes_transferred(), 0);
        assert_eq!(counter.total_bytes(), 1000);
        assert_eq!(counter.completion_percent(), 0.0);
    }

    #[test]
    fn test_counter_with_initial_bytes() {
        let mut counter = TransferCounter::new(250, 1000);
        counter.chunk_transferred(250);
        assert_eq!(counter.bytes_transferred(), 500);
        assert_eq!(counter.completion_percent(), 50.0);
    }

    #[test]
    fn test_counter_empty_file() {
        let counter = TransferCounter::new(0, 0);
        assert_eq!(counter.completion_percent(), 100.0);
    }

    #[test]
    fn test_rate_excludes_initial_bytes() {
        let mut counter = TransferCounter::new(10_000, 20_000);
        counter.chunk_transferred(1_000);
        let rate = counter.rate_over(Duration::from_secs(2));
        assert_eq!(rate, 500.0);
    }

    #[test]
    fn test_rate_zero_elapsed() {
        let counter = TransferCounter::new(0, 100);
        assert_eq!(counter.rate_over(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut counter = TransferCounter::new(100, 1000);
        counter.chunk_transferred(400);
        counter.reset();
        assert_eq!(counter.bytes_transferred(), 0);
        assert_eq!(counter.total_bytes(), 1000);
    }
}
