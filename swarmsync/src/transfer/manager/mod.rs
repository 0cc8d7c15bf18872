//! The download manager: one file, many sources.
//!
//! A [`DownloadManager`] owns the temp file, the part-state tracker and the
//! set of attached sources for a single file, and drives the transfer from
//! the first source to a verified result.
//!
//! # Architecture
//!
//! ```text
//!  transport threads                       worker pool
//!  ─────────────────                       ───────────
//!  add_source ─┐                          ┌─► match + copy ─┐
//!  source_ready├─► Mutex<ManagerState> ───┤                 ├─► apply (epoch checked)
//!  chunk/record│        │                 └─► verify ───────┘
//!  remove ─────┘        ▼
//!                 observer events (after unlock)
//! ```
//!
//! Every state-changing entry point takes the same lock. Matching, copying
//! and hashing never run under it; they are queued while the lock is held
//! and submitted once it is released, as are observer notifications.
//!
//! # Example
//!
//! ```ignore
//! use swarmsync::transfer::{DownloadManager, TransferContext, TransferFile, Download};
//!
//! let file = TransferFile::new("/data/video.mkv", size, modified);
//! let manager = DownloadManager::new(file, TransferConfig::default(), TransferContext::default())?;
//! manager.add_source(Download::new("peer-1", caps, transport))?;
//! // the transport later calls manager.source_ready(..), received_chunk(..), ...
//! manager.wait_for_terminal(Duration::from_secs(60));
//! ```

mod context;
mod inner;
mod pipeline;

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{info, info_span, Span};

pub use context::{TransferContext, TransferFile};

use self::inner::{Env, Event, ManagerState, Outbox};
use crate::config::TransferConfig;
use crate::delta::FilePartsRecord;
use crate::parts::FilePartsState;
use crate::range::Range;
use crate::transfer::download::Download;
use crate::transfer::error::{TransferError, TransferProblem, TransferResult};
use crate::transfer::observer::TransferObserver;
use crate::transfer::phase::{TransferPhase, TransferSnapshot};
use crate::transfer::source::{FileChunk, SourceId};
use crate::transfer::temp_file::{open_temp_file, temp_file_path};
use crate::transfer::worker::WorkerPool;

pub(super) struct Shared {
    env: Env,
    state: Mutex<ManagerState>,
    changed: Condvar,
    pool: Arc<dyn WorkerPool>,
    observer: Arc<dyn TransferObserver>,
    span: Span,
}

impl Shared {
    /// Apply a worker result if the manager is still at `epoch`.
    fn apply(
        self: &Arc<Self>,
        epoch: u64,
        f: impl FnOnce(&mut ManagerState, &Env),
    ) -> bool {
        let outbox = {
            let mut state = self.state.lock();
            if !state.is_current(epoch) {
                tracing::debug!(epoch, "Discarding stale worker result");
                return false;
            }
            f(&mut state, &self.env);
            state.take_outbox()
        };
        self.changed.notify_all();
        self.dispatch(outbox);
        true
    }

    /// Deliver queued events, then start queued jobs. Never called with the
    /// lock held.
    fn dispatch(self: &Arc<Self>, outbox: Outbox) {
        let file = &self.env.file;
        for event in outbox.events {
            match event {
                Event::PhaseChanged { from, to } => self.observer.phase_changed(file, from, to),
                Event::Completed => self.observer.completed(file, &self.env.temp_path),
                Event::Broken { problem, message } => {
                    self.observer.broken(file, problem, &message)
                }
            }
        }
        for job in outbox.jobs {
            pipeline::submit(self, job);
        }
    }
}

/// Coordinates the transfer of one file from any number of sources.
///
/// Cheap to clone; clones share the same transfer.
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

/// Non-owning handle to a [`DownloadManager`], for transports.
#[derive(Clone)]
pub struct WeakDownloadManager {
    shared: Weak<Shared>,
}

impl WeakDownloadManager {
    /// The manager, if it still exists.
    pub fn upgrade(&self) -> Option<DownloadManager> {
        self.shared.upgrade().map(|shared| DownloadManager { shared })
    }
}

impl DownloadManager {
    /// Create a manager and its temp file.
    ///
    /// The temp file is created (or truncated) next to the target. Delta-sync
    /// is planned when the file is at least `config.min_delta_size` bytes and
    /// a local candidate exists; otherwise everything starts out NEEDED.
    pub fn new(
        file: TransferFile,
        config: TransferConfig,
        context: TransferContext,
    ) -> TransferResult<Self> {
        let span = match &context.parent_span {
            Some(parent) => {
                info_span!(parent: parent, "transfer", file = %file.name(), size = file.size())
            }
            None => info_span!("transfer", file = %file.name(), size = file.size()),
        };

        let temp_path = temp_file_path(file.disk_path());
        let temp = open_temp_file(&temp_path).map_err(|source| TransferError::TempFile {
            path: temp_path.clone(),
            source,
        })?;

        let delta_enabled = file.size() >= config.min_delta_size
            && file
                .candidate()
                .is_some_and(|c| c != temp_path.as_path() && c.is_file());

        span.in_scope(|| {
            info!(
                temp = %temp_path.display(),
                delta = delta_enabled,
                "Created download manager"
            )
        });

        let env = Env {
            file,
            temp_path,
            config,
            metrics: context.metrics,
            admission: context.admission,
            delta_enabled,
        };
        let state = ManagerState::new(&env, temp);

        Ok(Self {
            shared: Arc::new(Shared {
                env,
                state: Mutex::new(state),
                changed: Condvar::new(),
                pool: context.worker_pool,
                observer: context.observer,
                span,
            }),
        })
    }

    /// A handle that does not keep the manager alive.
    pub fn downgrade(&self) -> WeakDownloadManager {
        WeakDownloadManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Run `f` under the lock, then deliver whatever it queued.
    fn with_state<R>(&self, f: impl FnOnce(&mut ManagerState, &Env) -> R) -> R {
        let _enter = self.shared.span.enter();
        let (result, outbox) = {
            let mut state = self.shared.state.lock();
            let result = f(&mut state, &self.shared.env);
            (result, state.take_outbox())
        };
        self.shared.changed.notify_all();
        self.shared.dispatch(outbox);
        result
    }

    fn read<R>(&self, f: impl FnOnce(&ManagerState, &Env) -> R) -> R {
        let state = self.shared.state.lock();
        f(&state, &self.shared.env)
    }

    // =========================================================================
    // Transport → manager
    // =========================================================================

    /// Attach a source.
    ///
    /// # Errors
    ///
    /// [`TransferError::DuplicateSource`] if a source with the same id is
    /// attached, [`TransferError::SourceRejected`] if the admission policy
    /// refuses it.
    pub fn add_source(&self, download: Download) -> TransferResult<()> {
        self.with_state(|state, env| state.add_source(env, download))
    }

    /// The source accepted the transfer and takes requests from now on.
    pub fn source_ready(&self, id: &SourceId) -> TransferResult<()> {
        self.with_state(|state, env| state.source_ready(env, id))
    }

    /// Detach a source; its pending ranges become NEEDED again.
    pub fn remove_source(&self, id: &SourceId) -> TransferResult<()> {
        self.with_state(|state, env| state.remove_source(env, id))
    }

    /// Data arrived from a source.
    pub fn received_chunk(&self, id: &SourceId, chunk: FileChunk) {
        self.with_state(|state, env| state.received_chunk(env, id, chunk))
    }

    /// A source delivered the signature record.
    pub fn received_parts_record(&self, id: &SourceId, record: FilePartsRecord) {
        self.with_state(|state, env| state.received_parts_record(env, id, record))
    }

    /// Offer NEEDED ranges to sources with spare capacity.
    ///
    /// Runs automatically after every event; calling it again is harmless.
    pub fn send_requests(&self) {
        self.with_state(|state, env| state.send_requests(env))
    }

    // =========================================================================
    // Caller control
    // =========================================================================

    /// Stop the transfer and release its resources. Idempotent.
    pub fn abort(&self) {
        self.with_state(|state, env| state.abort(env))
    }

    /// Abort and delete the temp file.
    pub fn abort_and_cleanup(&self) {
        self.with_state(|state, env| state.abort_and_cleanup(env))
    }

    /// Break the transfer on the caller's behalf.
    pub fn set_broken(&self) {
        self.with_state(|state, env| {
            state.set_broken(env, TransferProblem::BrokenDownload, "broken by caller".to_string())
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn snapshot(&self) -> TransferSnapshot {
        self.read(|state, env| state.snapshot(env))
    }

    pub fn phase(&self) -> TransferPhase {
        self.read(|state, _| state.phase())
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == TransferPhase::Completed
    }

    pub fn is_broken(&self) -> bool {
        self.phase() == TransferPhase::Broken
    }

    /// At least one source has accepted the transfer.
    pub fn is_started(&self) -> bool {
        self.snapshot().started_sources > 0
    }

    /// Attached sources in join order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.read(|state, _| state.sources())
    }

    pub fn has_sources(&self) -> bool {
        self.snapshot().sources > 0
    }

    /// Ranges requested from `id` and not yet received.
    pub fn pending_requests(&self, id: &SourceId) -> Option<Vec<Range>> {
        self.read(|state, _| state.pending_requests(id))
    }

    /// Copy of the part-state tracker, if one exists.
    pub fn parts_state(&self) -> Option<FilePartsState> {
        self.read(|state, _| state.parts_state())
    }

    pub fn temp_path(&self) -> &Path {
        &self.shared.env.temp_path
    }

    pub fn file(&self) -> &TransferFile {
        &self.shared.env.file
    }

    /// Block until `predicate` holds for the current snapshot or `timeout`
    /// passes. Returns whether the predicate held.
    pub fn wait_until(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&TransferSnapshot) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if predicate(&state.snapshot(&self.shared.env)) {
                return true;
            }
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return predicate(&state.snapshot(&self.shared.env));
            }
        }
    }

    /// Block until the transfer completes, breaks or is aborted.
    pub fn wait_for_terminal(&self, timeout: Duration) -> Option<TransferPhase> {
        self.wait_until(timeout, TransferSnapshot::is_terminal)
            .then(|| self.phase())
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("file", &self.shared.env.file)
            .field("phase", &self.phase())
            .finish()
    }
}
