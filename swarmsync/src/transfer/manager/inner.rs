//! Manager state and the transitions between phases.
//!
//! Everything here runs with the manager lock held. Nothing in this file
//! blocks for long: expensive work is queued as a [`WorkerJob`] and observer
//! notifications as an [`Event`]; both are handed out through
//! [`ManagerState::take_outbox`] and run once the lock is released.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, info, trace, warn};

use super::context::TransferFile;
use crate::config::TransferConfig;
use crate::delta::{DeltaError, DeltaResult, Digest256, FilePartsRecord};
use crate::parts::{FilePartsState, PartState, TransferCounter};
use crate::range::Range;
use crate::telemetry::TransferMetrics;
use crate::transfer::download::Download;
use crate::transfer::error::{TransferError, TransferProblem, TransferResult};
use crate::transfer::phase::{TransferPhase, TransferSnapshot};
use crate::transfer::policy::SourceAdmissionPolicy;
use crate::transfer::source::{FileChunk, SourceId};
use crate::transfer::temp_file::touch_modified;

/// Per-manager settings that never change after construction.
pub(super) struct Env {
    pub file: TransferFile,
    pub temp_path: PathBuf,
    pub config: TransferConfig,
    pub metrics: Arc<TransferMetrics>,
    pub admission: Arc<dyn SourceAdmissionPolicy>,
    /// A local candidate exists and the file is large enough.
    pub delta_enabled: bool,
}

/// Observer notification waiting for the lock to be released.
#[derive(Debug)]
pub(super) enum Event {
    PhaseChanged {
        from: TransferPhase,
        to: TransferPhase,
    },
    Completed,
    Broken {
        problem: TransferProblem,
        message: String,
    },
}

/// Background work waiting for the lock to be released.
#[derive(Debug)]
pub(super) enum WorkerJob {
    /// Match the local candidate against the record and copy hits.
    MatchAndCopy {
        epoch: u64,
        record: Arc<FilePartsRecord>,
        candidate: PathBuf,
        temp: File,
    },
    /// Hash the assembled temp file.
    Verify { epoch: u64, digest: Digest256 },
}

impl WorkerJob {
    /// Manager epoch the job was queued at.
    pub(super) fn epoch(&self) -> u64 {
        match self {
            WorkerJob::MatchAndCopy { epoch, .. } | WorkerJob::Verify { epoch, .. } => *epoch,
        }
    }
}

/// Work collected during one locked operation.
#[derive(Debug, Default)]
pub(super) struct Outbox {
    pub events: Vec<Event>,
    pub jobs: Vec<WorkerJob>,
}

pub(super) struct ManagerState {
    phase: TransferPhase,
    /// Attached sources in join order.
    sources: IndexMap<SourceId, Download>,
    /// `None` while the delta-sync phase decides what is needed.
    tracker: Option<FilePartsState>,
    record: Option<Arc<FilePartsRecord>>,
    /// Source asked for the record and not yet delivered it.
    record_source: Option<SourceId>,
    counter: TransferCounter,
    temp: Option<File>,
    /// Bumped whenever outstanding worker results become meaningless.
    epoch: u64,
    verification_failures: u32,
    released: bool,
    aborted: bool,
    /// Round-robin position for source selection.
    cursor: usize,
    outbox: Outbox,
}

impl ManagerState {
    pub(super) fn new(env: &Env, temp: File) -> Self {
        let size = env.file.size();
        Self {
            phase: TransferPhase::Initial,
            sources: IndexMap::new(),
            tracker: (!env.delta_enabled).then(|| FilePartsState::new(size)),
            record: None,
            record_source: None,
            counter: TransferCounter::new(0, size),
            temp: Some(temp),
            epoch: 0,
            verification_failures: 0,
            released: false,
            aborted: false,
            cursor: 0,
            outbox: Outbox::default(),
        }
    }

    pub(super) fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    pub(super) fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub(super) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a worker result started at `epoch` may still be applied.
    pub(super) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.phase.is_terminal()
    }

    pub(super) fn set_phase(&mut self, to: TransferPhase) {
        if self.phase == to {
            return;
        }
        let from = self.phase;
        self.phase = to;
        debug!(%from, %to, "Phase changed");
        self.outbox.events.push(Event::PhaseChanged { from, to });
    }

    fn using_part_requests(&self) -> bool {
        self.sources
            .values()
            .next()
            .is_some_and(Download::uses_part_requests)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    pub(super) fn add_source(&mut self, env: &Env, mut download: Download) -> TransferResult<()> {
        let id = download.source().clone();
        if self.phase.is_terminal() {
            debug!(source = %id, phase = %self.phase, "Ignoring source for finished transfer");
            return Ok(());
        }
        if self.sources.contains_key(&id) {
            return Err(TransferError::DuplicateSource(id));
        }
        if let Err(reason) = env.admission.allows_source(
            self.sources.len(),
            self.using_part_requests(),
            &download.capabilities(),
        ) {
            warn!(source = %id, %reason, "Source refused");
            return Err(TransferError::SourceRejected {
                source_id: id,
                reason,
            });
        }

        download.set_max_pending(env.config.max_requests_per_source);
        let start_offset = self
            .tracker
            .as_ref()
            .and_then(|t| t.find_first_part(PartState::Needed))
            .map_or(0, |r| r.start());
        info!(
            source = %id,
            part_requests = download.uses_part_requests(),
            delta = download.supports_delta(),
            start_offset,
            "Source added"
        );
        download.transport().request_file(start_offset);
        self.sources.insert(id, download);

        if env.file.size() == 0 {
            self.set_completed(env);
            return Ok(());
        }
        if self.phase == TransferPhase::Initial && self.tracker.is_some() {
            self.set_phase(TransferPhase::Downloading);
        }
        self.ensure_record_requested(env);
        self.send_requests(env);
        Ok(())
    }

    pub(super) fn source_ready(&mut self, env: &Env, id: &SourceId) -> TransferResult<()> {
        let Some(download) = self.sources.get_mut(id) else {
            warn!(source = %id, "Ready signal from unknown source");
            return Err(TransferError::UnknownSource(id.clone()));
        };
        if self.phase.is_terminal() {
            return Ok(());
        }
        download.set_started();
        debug!(source = %id, "Source ready for requests");

        self.ensure_record_requested(env);
        self.send_requests(env);
        Ok(())
    }

    pub(super) fn remove_source(&mut self, env: &Env, id: &SourceId) -> TransferResult<()> {
        let Some(mut download) = self.sources.shift_remove(id) else {
            error!(source = %id, "Removed source is not attached");
            return Err(TransferError::UnknownSource(id.clone()));
        };
        if self.phase.is_terminal() {
            return Ok(());
        }
        env.metrics.source_lost();

        let pending = download.take_pending();
        info!(
            source = %id,
            reverted = pending.len(),
            remaining = self.sources.len(),
            "Source removed"
        );
        for range in pending {
            self.revert_pending(range);
        }

        if self.record_source.as_ref() == Some(id) {
            debug!(source = %id, "Source left before delivering the signature record");
            self.record_source = None;
        }
        self.ensure_record_requested(env);
        self.send_requests(env);
        Ok(())
    }

    /// Return the still-pending bytes of `range` to NEEDED.
    fn revert_pending(&mut self, range: Range) {
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        let pending: Vec<Range> = tracker
            .parts()
            .filter(|(_, state)| *state == PartState::Pending)
            .filter_map(|(r, _)| r.intersection(&range))
            .collect();
        for r in pending {
            tracker.set_part_state(r, PartState::Needed);
        }
    }

    // =========================================================================
    // Signature record
    // =========================================================================

    /// Make sure some source owes us the record, or give up on delta-sync.
    fn ensure_record_requested(&mut self, env: &Env) {
        if !env.delta_enabled
            || self.tracker.is_some()
            || self.record.is_some()
            || self.phase.is_terminal()
        {
            return;
        }
        if let Some(id) = &self.record_source {
            if self.sources.get(id).is_some_and(|d| !d.is_broken()) {
                return;
            }
            self.record_source = None;
        }

        let ready = self
            .sources
            .values()
            .find(|d| d.is_started() && !d.is_broken() && d.supports_delta());
        match ready {
            Some(download) => {
                let id = download.source().clone();
                info!(source = %id, "Requesting signature record");
                download.transport().request_parts_record();
                env.metrics.record_requested();
                self.record_source = Some(id);
                self.set_phase(TransferPhase::FileRecordRequest);
            }
            None => {
                let may_deliver = self
                    .sources
                    .values()
                    .any(|d| !d.is_broken() && d.supports_delta());
                if !may_deliver {
                    self.fall_back_to_full(env);
                }
            }
        }
    }

    fn fall_back_to_full(&mut self, env: &Env) {
        info!("No source can provide a signature record, fetching the whole file");
        self.tracker = Some(FilePartsState::new(env.file.size()));
        self.counter = TransferCounter::new(0, env.file.size());
        self.set_phase(TransferPhase::Downloading);
    }

    pub(super) fn received_parts_record(
        &mut self,
        env: &Env,
        id: &SourceId,
        record: FilePartsRecord,
    ) {
        if self.phase.is_terminal() {
            debug!(source = %id, "Ignoring signature record for finished transfer");
            return;
        }
        if let Some(existing) = &self.record {
            if **existing != record {
                warn!(source = %id, "Ignoring a second, different signature record");
            } else {
                debug!(source = %id, "Ignoring duplicate signature record");
            }
            return;
        }
        if record.file_length() != env.file.size() {
            let err = DeltaError::RecordMismatch {
                expected: env.file.size(),
                actual: record.file_length(),
            };
            self.set_broken(env, TransferProblem::General, err.to_string());
            return;
        }
        if let Err(err) = record.validate() {
            self.set_broken(env, TransferProblem::General, err.to_string());
            return;
        }

        let record = Arc::new(record);
        self.record = Some(Arc::clone(&record));
        self.record_source = None;

        if self.tracker.is_some() {
            debug!(source = %id, "Record arrived after full download started, keeping it for verification");
            return;
        }
        let Some(candidate) = env.file.candidate() else {
            self.fall_back_to_full(env);
            self.send_requests(env);
            return;
        };
        let temp = match self.temp.as_ref().map(File::try_clone) {
            Some(Ok(temp)) => temp,
            Some(Err(e)) => {
                self.set_broken(
                    env,
                    TransferProblem::IoError,
                    format!("failed to share temp file: {}", e),
                );
                return;
            }
            None => return,
        };

        info!(
            source = %id,
            blocks = record.parts().len(),
            part_length = record.part_length(),
            "Signature record received, matching local copy"
        );
        self.set_phase(TransferPhase::Matching);
        self.outbox.jobs.push(WorkerJob::MatchAndCopy {
            epoch: self.epoch,
            record,
            candidate: candidate.to_path_buf(),
            temp,
        });
    }

    /// Install the tracker produced by matching and copying.
    pub(super) fn delta_finished(&mut self, env: &Env, result: DeltaResult<FilePartsState>) {
        match result {
            Ok(tracker) => {
                let reused = tracker.count_part_states(tracker.range(), PartState::Available);
                env.metrics.bytes_reused(reused);
                info!(reused, total = env.file.size(), "Local copy applied");

                self.counter = TransferCounter::new(reused, env.file.size());
                let complete = tracker.is_completed();
                self.tracker = Some(tracker);
                if complete {
                    self.check_completed(env);
                } else {
                    self.set_phase(TransferPhase::Downloading);
                    self.send_requests(env);
                }
            }
            Err(err) => {
                self.set_broken(env, TransferProblem::from_delta(&err), err.to_string());
            }
        }
    }

    // =========================================================================
    // Scheduling and data
    // =========================================================================

    /// Hand NEEDED ranges to sources until nothing is needed or nobody
    /// accepts more work.
    pub(super) fn send_requests(&mut self, env: &Env) {
        if self.phase.is_terminal() || !self.using_part_requests() {
            return;
        }
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };

        while let Some(needed) = tracker.find_first_part(PartState::Needed) {
            let range = needed.truncate(env.config.max_chunk_size);
            let loads: Vec<usize> = self
                .sources
                .values()
                .map(|d| d.pending_requests().len())
                .collect();

            let assigned = env
                .config
                .source_selection
                .candidate_order(&loads, self.cursor)
                .into_iter()
                .find(|&idx| {
                    self.sources
                        .get_index_mut(idx)
                        .is_some_and(|(_, d)| d.request_part(range))
                });

            let Some(idx) = assigned else {
                break;
            };
            tracker.set_part_state(range, PartState::Pending);
            env.metrics.part_requested();
            self.cursor = idx + 1;
            trace!(%range, source = idx, "Range requested");
        }
    }

    pub(super) fn received_chunk(&mut self, env: &Env, id: &SourceId, chunk: FileChunk) {
        if self.phase.is_terminal() {
            trace!(source = %id, "Ignoring chunk for finished transfer");
            return;
        }
        if !self.sources.contains_key(id) {
            warn!(source = %id, offset = chunk.offset, "Ignoring chunk from unknown source");
            return;
        }
        let range = chunk.range();
        if range.is_empty() {
            return;
        }
        if range.end() > env.file.size() {
            warn!(source = %id, %range, size = env.file.size(), "Ignoring chunk beyond end of file");
            return;
        }
        if self.tracker.is_none() {
            error!(source = %id, %range, "Chunk received before the parts state exists");
            return;
        }
        let Some(temp) = self.temp.as_mut() else {
            return;
        };

        if let Err(e) = write_at(temp, chunk.offset, &chunk.data) {
            let message = format!("failed to write {}: {}", env.temp_path.display(), e);
            self.set_broken(env, TransferProblem::IoError, message);
            return;
        }

        if let Some(download) = self.sources.get_mut(id) {
            download.chunk_received(range);
        }
        let len = range.length();
        self.counter.chunk_transferred(len);
        env.metrics.chunk_received(len);
        trace!(source = %id, %range, "Chunk written");

        let completed = match self.tracker.as_mut() {
            Some(tracker) => {
                tracker.set_part_state(range, PartState::Available);
                tracker.is_completed()
            }
            None => false,
        };
        if completed {
            self.check_completed(env);
        } else {
            self.send_requests(env);
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    fn check_completed(&mut self, env: &Env) {
        self.set_phase(TransferPhase::Verifying);
        if let Some(temp) = self.temp.as_mut() {
            if let Err(e) = temp.flush() {
                warn!(error = %e, "Failed to flush temp file before verification");
            }
        }
        match &self.record {
            Some(record) => {
                debug!(digest = %record.file_digest_hex(), "Verifying assembled file");
                self.outbox.jobs.push(WorkerJob::Verify {
                    epoch: self.epoch,
                    digest: *record.file_digest(),
                });
            }
            None => self.set_completed(env),
        }
    }

    pub(super) fn verification_finished(&mut self, env: &Env, result: DeltaResult<bool>) {
        match result {
            Ok(true) => {
                self.verification_failures = 0;
                self.set_completed(env);
            }
            Ok(false) => {
                self.verification_failures += 1;
                env.metrics.verification_failed();
                if self.verification_failures >= env.config.max_verification_failures {
                    let message = format!(
                        "digest mismatch after {} attempts",
                        self.verification_failures
                    );
                    self.set_broken(env, TransferProblem::VerificationFailed, message);
                    return;
                }
                warn!(
                    attempt = self.verification_failures,
                    "Digest mismatch, fetching the whole file again"
                );
                for download in self.sources.values_mut() {
                    download.take_pending();
                }
                self.tracker = Some(FilePartsState::new(env.file.size()));
                self.counter.reset();
                self.set_phase(TransferPhase::Downloading);
                self.send_requests(env);
            }
            Err(err) => {
                self.set_broken(env, TransferProblem::from_delta(&err), err.to_string());
            }
        }
    }

    fn set_completed(&mut self, env: &Env) {
        if self.phase.is_terminal() {
            return;
        }
        info!(
            bytes = self.counter.bytes_transferred(),
            sources = self.sources.len(),
            "Transfer completed"
        );
        self.set_phase(TransferPhase::Completed);
        env.metrics.transfer_completed();
        self.release(env);
        self.outbox.events.push(Event::Completed);
    }

    pub(super) fn set_broken(&mut self, env: &Env, problem: TransferProblem, message: String) {
        if self.phase.is_terminal() {
            return;
        }
        error!(%problem, %message, "Transfer broken");
        self.set_phase(TransferPhase::Broken);
        env.metrics.transfer_broken();
        for download in self.sources.values_mut() {
            download.set_broken();
            download.transport().abort();
        }
        self.release(env);
        self.outbox.events.push(Event::Broken { problem, message });
    }

    pub(super) fn abort(&mut self, env: &Env) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        for download in self.sources.values() {
            download.transport().abort();
        }
        if !self.phase.is_terminal() {
            info!("Transfer aborted");
            self.set_phase(TransferPhase::Aborted);
        }
        self.release(env);
    }

    pub(super) fn abort_and_cleanup(&mut self, env: &Env) {
        self.abort(env);
        match fs::remove_file(&env.temp_path) {
            Ok(()) => debug!(path = %env.temp_path.display(), "Removed temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %env.temp_path.display(), error = %e, "Failed to remove temp file"),
        }
    }

    /// Drop the tracker, record and temp handle, and stamp the temp file
    /// with the remote modification time.
    fn release(&mut self, env: &Env) {
        self.epoch += 1;
        if self.released {
            return;
        }
        self.released = true;
        self.tracker = None;
        self.record = None;
        self.record_source = None;
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.sync_all() {
                warn!(error = %e, "Failed to sync temp file");
            }
        }
        if let Err(e) = touch_modified(&env.temp_path, env.file.modified()) {
            warn!(
                path = %env.temp_path.display(),
                error = %e,
                "Failed to update temp file modification time"
            );
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub(super) fn snapshot(&self, env: &Env) -> TransferSnapshot {
        TransferSnapshot {
            phase: self.phase,
            file_size: env.file.size(),
            parts: self.tracker.as_ref().map(FilePartsState::counts),
            bytes_transferred: self.counter.bytes_transferred(),
            completion_percent: if self.phase == TransferPhase::Completed {
                100.0
            } else {
                self.counter.completion_percent()
            },
            bytes_per_second: self.counter.bytes_per_second(),
            sources: self.sources.len(),
            started_sources: self.sources.values().filter(|d| d.is_started()).count(),
            pending_requests: self
                .sources
                .values()
                .map(|d| d.pending_requests().len())
                .sum(),
            verification_failures: self.verification_failures,
            has_record: self.record.is_some(),
        }
    }

    pub(super) fn sources(&self) -> Vec<SourceId> {
        self.sources.keys().cloned().collect()
    }

    pub(super) fn pending_requests(&self, id: &SourceId) -> Option<Vec<Range>> {
        self.sources
            .get(id)
            .map(|d| d.pending_requests().to_vec())
    }

    pub(super) fn parts_state(&self) -> Option<FilePartsState> {
        self.tracker.clone()
    }
}

fn write_at(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::policy::SwarmingPolicy;
    use crate::transfer::source::{SourceCapabilities, SourceTransport};
    use crate::transfer::temp_file::temp_file_path;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    struct SilentTransport;

    impl SourceTransport for SilentTransport {
        fn request_file(&self, _start_offset: u64) {}

        fn request_range(&self, _range: Range) -> bool {
            true
        }

        fn request_parts_record(&self) {}

        fn abort(&self) {}
    }

    fn full_download_env(temp: &TempDir, size: u64) -> Env {
        let target = temp.path().join("f.bin");
        Env {
            file: TransferFile::new(&target, size, UNIX_EPOCH).without_candidate(),
            temp_path: temp_file_path(&target),
            config: TransferConfig::default(),
            metrics: Arc::new(TransferMetrics::new()),
            admission: Arc::new(SwarmingPolicy),
            delta_enabled: false,
        }
    }

    fn broken_problems(outbox: Outbox) -> Vec<TransferProblem> {
        outbox
            .events
            .into_iter()
            .filter_map(|event| match event {
                Event::Broken { problem, .. } => Some(problem),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_failed_chunk_write_breaks_transfer() {
        let temp = TempDir::new().unwrap();
        let env = full_download_env(&temp, 4096);
        fs::write(&env.temp_path, b"").unwrap();
        // opened read-only, so every write fails
        let handle = File::open(&env.temp_path).unwrap();
        let mut state = ManagerState::new(&env, handle);

        let id = SourceId::new("a");
        let download = Download::new(id.clone(), SourceCapabilities::full(), Arc::new(SilentTransport));
        state.add_source(&env, download).unwrap();
        state.source_ready(&env, &id).unwrap();
        assert_eq!(state.phase(), TransferPhase::Downloading);
        state.take_outbox();

        state.received_chunk(&env, &id, FileChunk::new(0, vec![7u8; 1024]));

        assert_eq!(state.phase(), TransferPhase::Broken);
        assert_eq!(broken_problems(state.take_outbox()), vec![TransferProblem::IoError]);
        assert_eq!(env.metrics.snapshot().transfers_broken, 1);
        assert_eq!(env.metrics.snapshot().chunks_received, 0);
    }
}
