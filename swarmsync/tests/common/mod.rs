//! Shared helpers for transfer integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH, Duration};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use swarmsync::config::TransferConfig;
use swarmsync::delta::{FilePartsRecord, FilePartsRecordBuilder};
use swarmsync::range::Range;
use swarmsync::transfer::{
    Download, DownloadManager, FileChunk, InlineWorkerPool, Job, SourceCapabilities, SourceId,
    SourceTransport, TransferContext, TransferFile, TransferObserver, TransferPhase,
    TransferProblem, WorkerPool,
};

/// Remote modification time used by every test file.
pub fn remote_mtime() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill(&mut data[..]);
    data
}

pub fn record_of(data: &[u8], part_length: u64) -> FilePartsRecord {
    let mut builder = FilePartsRecordBuilder::new(part_length);
    builder.update(data);
    builder.finish()
}

/// `record` re-decoded with a different block size and no validation, as a
/// peer could send it.
pub fn with_part_length(record: &FilePartsRecord, part_length: u64) -> FilePartsRecord {
    let mut bytes = record.encode().unwrap();
    // fixed-width encoding: file_length, then part_length
    bytes[8..16].copy_from_slice(&part_length.to_le_bytes());
    bincode::deserialize(&bytes).unwrap()
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Transport that records every request and never answers by itself.
#[derive(Default)]
pub struct MockTransport {
    pub file_requests: Mutex<Vec<u64>>,
    pub ranges: Mutex<Vec<Range>>,
    pub record_requests: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl MockTransport {
    pub fn take_ranges(&self) -> Vec<Range> {
        std::mem::take(&mut *self.ranges.lock())
    }

    pub fn range_count(&self) -> usize {
        self.ranges.lock().len()
    }

    pub fn records(&self) -> usize {
        self.record_requests.load(Ordering::SeqCst)
    }
}

impl SourceTransport for MockTransport {
    fn request_file(&self, start_offset: u64) {
        self.file_requests.lock().push(start_offset);
    }

    fn request_range(&self, range: Range) -> bool {
        self.ranges.lock().push(range);
        true
    }

    fn request_parts_record(&self) {
        self.record_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mock peer: its id and transport.
pub struct MockPeer {
    pub id: SourceId,
    pub transport: Arc<MockTransport>,
}

impl MockPeer {
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::new(id),
            transport: Arc::new(MockTransport::default()),
        }
    }

    pub fn download(&self, capabilities: SourceCapabilities) -> Download {
        Download::new(self.id.clone(), capabilities, self.transport.clone())
    }

    /// Attach with full capabilities and signal readiness.
    pub fn join(&self, manager: &DownloadManager) {
        manager
            .add_source(self.download(SourceCapabilities::full()))
            .unwrap();
        manager.source_ready(&self.id).unwrap();
    }

    /// Answer every outstanding range request from `data` until none are left.
    pub fn serve(&self, manager: &DownloadManager, data: &[u8]) -> usize {
        let mut served = 0;
        loop {
            let ranges = self.transport.take_ranges();
            if ranges.is_empty() {
                return served;
            }
            for range in ranges {
                let bytes = data[range.start() as usize..range.end() as usize].to_vec();
                manager.received_chunk(&self.id, FileChunk::new(range.start(), bytes));
                served += 1;
            }
        }
    }
}

/// Observer that keeps everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    pub phases: Mutex<Vec<TransferPhase>>,
    pub completed: AtomicUsize,
    pub broken: Mutex<Vec<(TransferProblem, String)>>,
}

impl RecordingObserver {
    pub fn phases(&self) -> Vec<TransferPhase> {
        self.phases.lock().clone()
    }

    pub fn completions(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn problems(&self) -> Vec<TransferProblem> {
        self.broken.lock().iter().map(|(p, _)| *p).collect()
    }
}

impl TransferObserver for RecordingObserver {
    fn phase_changed(&self, _file: &TransferFile, _from: TransferPhase, to: TransferPhase) {
        self.phases.lock().push(to);
    }

    fn completed(&self, _file: &TransferFile, _temp_path: &Path) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn broken(&self, _file: &TransferFile, problem: TransferProblem, message: &str) {
        self.broken.lock().push((problem, message.to_string()));
    }
}

/// Worker pool that holds jobs until told to run them.
#[derive(Default)]
pub struct ManualWorkerPool {
    jobs: Mutex<Vec<Job>>,
}

impl ManualWorkerPool {
    pub fn queued(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run queued jobs, including ones they queue, until none are left.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let jobs = std::mem::take(&mut *self.jobs.lock());
            if jobs.is_empty() {
                return ran;
            }
            for job in jobs {
                job();
                ran += 1;
            }
        }
    }
}

impl WorkerPool for ManualWorkerPool {
    fn execute(&self, job: Job) {
        self.jobs.lock().push(job);
    }
}

/// Manager over `target` with jobs run inline and events recorded.
pub fn inline_manager(
    target: &Path,
    size: u64,
    config: TransferConfig,
) -> (DownloadManager, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let context = TransferContext::new(Arc::new(InlineWorkerPool)).with_observer(observer.clone());
    let file = TransferFile::new(target, size, remote_mtime());
    let manager = DownloadManager::new(file, config, context).unwrap();
    (manager, observer)
}
