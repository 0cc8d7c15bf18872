//! Point-in-time view of [`TransferMetrics`](super::TransferMetrics).

use std::fmt;
use std::time::Duration;

/// Plain copy of every counter, safe to hold and format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub bytes_reused: u64,
    pub part_requests_sent: u64,
    pub records_requested: u64,
    pub sources_lost: u64,
    pub verification_failures: u64,
    pub transfers_completed: u64,
    pub transfers_broken: u64,
    /// Time since the metrics were created.
    pub uptime: Duration,
    /// Average network receive rate over the uptime.
    pub bytes_per_second: f64,
}

impl MetricsSnapshot {
    /// Share of the assembled bytes that came from local candidates.
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.bytes_received + self.bytes_reused;
        if total == 0 {
            0.0
        } else {
            self.bytes_reused as f64 / total as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "received: {} bytes in {} chunks ({:.1} KB/s)",
            self.bytes_received,
            self.chunks_received,
            self.bytes_per_second / 1024.0
        )?;
        writeln!(
            f,
            "reused:   {} bytes ({:.1}%)",
            self.bytes_reused,
            self.reuse_ratio() * 100.0
        )?;
        writeln!(
            f,
            "requests: {} parts, {} records",
            self.part_requests_sent, self.records_requested
        )?;
        write!(
            f,
            "outcome:  {} completed, {} broken, {} verification failures, {} sources lost",
            self.transfers_completed,
            self.transfers_broken,
            self.verification_failures,
            self.sources_lost
        )
    }
}
