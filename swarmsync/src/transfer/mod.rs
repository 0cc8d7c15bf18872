//! Multi-source transfer of a single file.
//!
//! - [`DownloadManager`]: owns the transfer and its state machine
//! - [`Download`]: one source's share, with its outstanding requests
//! - [`SourceTransport`]: what the manager needs from a peer connection
//! - [`SourceAdmissionPolicy`] / [`SourceSelection`]: who may join and who
//!   gets the next range
//! - [`WorkerPool`]: where matching, copying and hashing run
//! - [`TransferObserver`]: lifecycle callbacks
//! - [`LoopbackSource`]: an in-process peer serving a local file

mod download;
mod error;
mod loopback;
mod manager;
mod observer;
mod phase;
mod policy;
mod source;
mod temp_file;
mod worker;

pub use download::{Download, DEFAULT_MAX_PENDING};
pub use error::{TransferError, TransferProblem, TransferResult};
pub use loopback::{LoopbackOptions, LoopbackSource};
pub use manager::{DownloadManager, TransferContext, TransferFile, WeakDownloadManager};
pub use observer::{NoopObserver, TransferObserver};
pub use phase::{TransferPhase, TransferSnapshot};
pub use policy::{SingleSourcePolicy, SourceAdmissionPolicy, SourceSelection, SwarmingPolicy};
pub use source::{FileChunk, SourceCapabilities, SourceId, SourceTransport};
pub use temp_file::{open_temp_file, temp_file_path, touch_modified, INCOMPLETE_PREFIX};
pub use worker::{InlineWorkerPool, Job, RayonWorkerPool, TokioWorkerPool, WorkerPool};
