//! Callbacks for transfer lifecycle events.

use std::path::Path;

use super::error::TransferProblem;
use super::manager::TransferFile;
use super::phase::TransferPhase;

/// Receives lifecycle events from a download manager.
///
/// Phase, completion and failure events are delivered after the manager
/// lock is released, so implementations may call back into the manager.
/// Every method defaults to doing nothing.
pub trait TransferObserver: Send + Sync {
    /// The manager moved from `from` to `to`.
    fn phase_changed(&self, _file: &TransferFile, _from: TransferPhase, _to: TransferPhase) {}

    /// Progress of a worker stage (matching, copying, verifying), 0..=100.
    fn stage_progress(&self, _file: &TransferFile, _phase: TransferPhase, _percent: u8) {}

    /// The file is fully assembled and verified at `temp_path`.
    fn completed(&self, _file: &TransferFile, _temp_path: &Path) {}

    /// The transfer failed for good.
    fn broken(&self, _file: &TransferFile, _problem: TransferProblem, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}
