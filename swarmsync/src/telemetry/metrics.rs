//! Atomic transfer counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::MetricsSnapshot;

/// Counters shared between managers and whoever displays them.
///
/// All updates use relaxed ordering; counters are independent and only read
/// for display.
#[derive(Debug)]
pub struct TransferMetrics {
    started_at: Instant,
    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
    bytes_reused: AtomicU64,
    part_requests_sent: AtomicU64,
    records_requested: AtomicU64,
    sources_lost: AtomicU64,
    verification_failures: AtomicU64,
    transfers_completed: AtomicU64,
    transfers_broken: AtomicU64,
}

impl Default for TransferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMetrics {
    /// Create a metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            chunks_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_reused: AtomicU64::new(0),
            part_requests_sent: AtomicU64::new(0),
            records_requested: AtomicU64::new(0),
            sources_lost: AtomicU64::new(0),
            verification_failures: AtomicU64::new(0),
            transfers_completed: AtomicU64::new(0),
            transfers_broken: AtomicU64::new(0),
        }
    }

    /// A chunk of `bytes` arrived from a source.
    pub fn chunk_received(&self, bytes: u64) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Delta-sync reused `bytes` from a local candidate.
    pub fn bytes_reused(&self, bytes: u64) {
        self.bytes_reused.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A range request was accepted by a source.
    pub fn part_requested(&self) {
        self.part_requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// A signature record was requested.
    pub fn record_requested(&self) {
        self.records_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// A source left an unfinished transfer.
    pub fn source_lost(&self) {
        self.sources_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// The assembled file failed its digest check.
    pub fn verification_failed(&self) {
        self.verification_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A transfer completed.
    pub fn transfer_completed(&self) {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A transfer broke.
    pub fn transfer_broken(&self) {
        self.transfers_broken.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.elapsed();
        let bytes_received = self.bytes_received.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        MetricsSnapshot {
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received,
            bytes_reused: self.bytes_reused.load(Ordering::Relaxed),
            part_requests_sent: self.part_requests_sent.load(Ordering::Relaxed),
            records_requested: self.records_requested.load(Ordering::Relaxed),
            sources_lost: self.sources_lost.load(Ordering::Relaxed),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            transfers_broken: self.transfers_broken.load(Ordering::Relaxed),
            uptime: elapsed,
            bytes_per_second: if secs > 0.0 {
                bytes_received as f64 / secs
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_metrics_start_at_zero() {
        let snapshot = TransferMetrics::new().snapshot();
        assert_eq!(snapshot.chunks_received, 0);
        assert_eq!(snapshot.bytes_received, 0);
        assert_eq!(snapshot.transfers_completed, 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = TransferMetrics::new();
        metrics.chunk_received(100);
        metrics.chunk_received(50);
        metrics.bytes_reused(1000);
        metrics.part_requested();
        metrics.record_requested();
        metrics.source_lost();
        metrics.verification_failed();
        metrics.transfer_broken();

        let s = metrics.snapshot();
        assert_eq!(s.chunks_received, 2);
        assert_eq!(s.bytes_received, 150);
        assert_eq!(s.bytes_reused, 1000);
        assert_eq!(s.part_requests_sent, 1);
        assert_eq!(s.records_requested, 1);
        assert_eq!(s.sources_lost, 1);
        assert_eq!(s.verification_failures, 1);
        assert_eq!(s.transfers_broken, 1);
    }

    #[test]
    fn test_thread_safe_counting() {
        use std::thread;

        let metrics = Arc::new(TransferMetrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.chunk_received(10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let s = metrics.snapshot();
        assert_eq!(s.chunks_received, 800);
        assert_eq!(s.bytes_received, 8000);
    }
}
