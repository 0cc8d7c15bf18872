//! Transfer phases and point-in-time snapshots.

use std::fmt;

use crate::parts::PartCounts;

/// Where a transfer is in its lifecycle.
///
/// ```text
/// Initial ─► (FileRecordRequest ─► Matching ─► Copying)? ─► Downloading ─► Verifying
///                                                              ▲              │
///                                                              └── mismatch ──┤
///                                                                             ▼
///                                                               Completed | Broken
/// ```
///
/// [`Aborted`](TransferPhase::Aborted) can be reached from any non-terminal
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    Initial,
    FileRecordRequest,
    Matching,
    Copying,
    Downloading,
    Verifying,
    Completed,
    Broken,
    Aborted,
}

impl TransferPhase {
    /// No further progress is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Completed | TransferPhase::Broken | TransferPhase::Aborted
        )
    }

    /// The delta-sync part of the lifecycle.
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            TransferPhase::FileRecordRequest | TransferPhase::Matching | TransferPhase::Copying
        )
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferPhase::Initial => "initial",
            TransferPhase::FileRecordRequest => "requesting record",
            TransferPhase::Matching => "matching",
            TransferPhase::Copying => "copying",
            TransferPhase::Downloading => "downloading",
            TransferPhase::Verifying => "verifying",
            TransferPhase::Completed => "completed",
            TransferPhase::Broken => "broken",
            TransferPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a download manager.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    pub phase: TransferPhase,
    pub file_size: u64,
    /// Byte totals per part state; `None` while no tracker exists.
    pub parts: Option<PartCounts>,
    /// Bytes assembled so far, including bytes reused from a local copy.
    pub bytes_transferred: u64,
    pub completion_percent: f64,
    /// Network rate since the counter was last reset.
    pub bytes_per_second: f64,
    pub sources: usize,
    pub started_sources: usize,
    pub pending_requests: usize,
    pub verification_failures: u32,
    pub has_record: bool,
}

impl TransferSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
