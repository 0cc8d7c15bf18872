//! What a manager transfers and what it is wired to.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::Span;

use crate::telemetry::TransferMetrics;
use crate::transfer::observer::{NoopObserver, TransferObserver};
use crate::transfer::policy::{SourceAdmissionPolicy, SwarmingPolicy};
use crate::transfer::worker::{RayonWorkerPool, WorkerPool};

/// The remote file being transferred and where it goes locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFile {
    name: String,
    disk_path: PathBuf,
    size: u64,
    modified: SystemTime,
    candidate: Option<PathBuf>,
}

impl TransferFile {
    /// Describe a file of `size` bytes last modified at `modified` on the
    /// remote side, to be stored at `disk_path`.
    ///
    /// Whatever already exists at `disk_path` is the delta-sync candidate.
    pub fn new(disk_path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        let disk_path = disk_path.into();
        let name = disk_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| disk_path.display().to_string());
        Self {
            name,
            candidate: Some(disk_path.clone()),
            disk_path,
            size,
            modified,
        }
    }

    /// Use another local file as the delta-sync candidate.
    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidate = Some(path.into());
        self
    }

    /// Never attempt delta-sync for this file.
    pub fn without_candidate(mut self) -> Self {
        self.candidate = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Remote modification time.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Local file that may share blocks with the remote file.
    pub fn candidate(&self) -> Option<&Path> {
        self.candidate.as_deref()
    }
}

impl fmt::Display for TransferFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

/// Collaborators injected into a manager.
#[derive(Clone)]
pub struct TransferContext {
    pub(super) worker_pool: Arc<dyn WorkerPool>,
    pub(super) observer: Arc<dyn TransferObserver>,
    pub(super) metrics: Arc<TransferMetrics>,
    pub(super) admission: Arc<dyn SourceAdmissionPolicy>,
    pub(super) parent_span: Option<Span>,
}

impl TransferContext {
    /// Context running worker jobs on `worker_pool`, with a swarming
    /// admission policy, no observer and private metrics.
    pub fn new(worker_pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            worker_pool,
            observer: Arc::new(NoopObserver),
            metrics: Arc::new(TransferMetrics::new()),
            admission: Arc::new(SwarmingPolicy),
            parent_span: None,
        }
    }

    /// Deliver lifecycle events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Record into shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<TransferMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the source admission policy.
    pub fn with_admission_policy(mut self, policy: Arc<dyn SourceAdmissionPolicy>) -> Self {
        self.admission = policy;
        self
    }

    /// Nest the manager's span under `span`.
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent_span = Some(span);
        self
    }

    pub fn metrics(&self) -> &Arc<TransferMetrics> {
        &self.metrics
    }
}

impl Default for TransferContext {
    fn default() -> Self {
        Self::new(Arc::new(RayonWorkerPool::global()))
    }
}

impl fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferContext")
            .field("admission", &self.admission)
            .field("parent_span", &self.parent_span)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_transfer_file_defaults_candidate_to_disk_path() {
        let file = TransferFile::new("/data/a.bin", 10, UNIX_EPOCH);
        assert_eq!(file.name(), "a.bin");
        assert_eq!(file.candidate(), Some(Path::new("/data/a.bin")));
        assert_eq!(file.to_string(), "a.bin (10 bytes)");
    }

    #[test]
    fn test_transfer_file_candidate_overrides() {
        let file = TransferFile::new("/data/a.bin", 10, UNIX_EPOCH).with_candidate("/old/a.bin");
        assert_eq!(file.candidate(), Some(Path::new("/old/a.bin")));
        assert_eq!(file.without_candidate().candidate(), None);
    }
}
