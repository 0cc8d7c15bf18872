//! In-process peer serving a local file.
//!
//! A [`LoopbackSource`] runs its own thread and answers the manager's
//! requests from a reference file on disk, calling back into the manager
//! through a [`WeakDownloadManager`] exactly like a network transport would.
//! It exercises the real threading model without a network, which makes it
//! useful for integration tests and the `sync` command.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::download::Download;
use super::manager::WeakDownloadManager;
use super::source::{FileChunk, SourceCapabilities, SourceId, SourceTransport};
use crate::config::DEFAULT_MAX_CHUNK_SIZE;
use crate::delta::{build_record, default_part_length};
use crate::range::Range;

/// How a loopback peer behaves.
#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub capabilities: SourceCapabilities,
    /// Delay before answering each request.
    pub latency: Duration,
    /// Block size of the records it sends; derived from the file size when unset.
    pub part_length: Option<u64>,
    /// Chunk size when streaming to a peer without range requests.
    pub stream_chunk_size: u64,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            capabilities: SourceCapabilities::full(),
            latency: Duration::ZERO,
            part_length: None,
            stream_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl LoopbackOptions {
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_part_length(mut self, part_length: u64) -> Self {
        self.part_length = Some(part_length);
        self
    }
}

#[derive(Debug)]
enum Command {
    File(u64),
    Range(Range),
    Record,
}

/// A peer thread serving `reference`.
pub struct LoopbackSource {
    id: SourceId,
    capabilities: SourceCapabilities,
    commands: Mutex<Option<Sender<Command>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackSource {
    /// Start a peer serving `reference` to `manager`.
    pub fn spawn(
        id: impl Into<SourceId>,
        reference: impl Into<PathBuf>,
        manager: WeakDownloadManager,
        options: LoopbackOptions,
    ) -> io::Result<Arc<Self>> {
        let id = id.into();
        let (tx, rx) = mpsc::channel();
        let peer = Peer {
            id: id.clone(),
            reference: reference.into(),
            manager,
            options: options.clone(),
        };
        let thread = thread::Builder::new()
            .name(format!("loopback-{}", id))
            .spawn(move || peer.run(rx))?;

        Ok(Arc::new(Self {
            id,
            capabilities: options.capabilities,
            commands: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        }))
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// A download bound to this peer, ready for
    /// [`DownloadManager::add_source`](super::DownloadManager::add_source).
    pub fn download(self: &Arc<Self>) -> Download {
        Download::new(
            self.id.clone(),
            self.capabilities,
            Arc::clone(self) as Arc<dyn SourceTransport>,
        )
    }

    /// Wait for the peer thread to exit after an abort.
    pub fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(source = %self.id, "Loopback thread panicked");
            }
        }
    }

    fn send(&self, command: Command) -> bool {
        self.commands
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }
}

impl SourceTransport for LoopbackSource {
    fn request_file(&self, start_offset: u64) {
        self.send(Command::File(start_offset));
    }

    fn request_range(&self, range: Range) -> bool {
        self.send(Command::Range(range))
    }

    fn request_parts_record(&self) {
        self.send(Command::Record);
    }

    fn abort(&self) {
        // Dropping the sender ends the peer loop.
        self.commands.lock().take();
    }
}

impl Drop for LoopbackSource {
    fn drop(&mut self) {
        self.commands.lock().take();
    }
}

/// State owned by the peer thread.
struct Peer {
    id: SourceId,
    reference: PathBuf,
    manager: WeakDownloadManager,
    options: LoopbackOptions,
}

impl Peer {
    fn run(self, commands: Receiver<Command>) {
        debug!(source = %self.id, reference = %self.reference.display(), "Loopback peer started");
        let mut file = match File::open(&self.reference) {
            Ok(file) => file,
            Err(e) => {
                warn!(source = %self.id, error = %e, "Loopback peer cannot open its file");
                self.disconnect();
                return;
            }
        };

        for command in commands {
            if !self.options.latency.is_zero() {
                thread::sleep(self.options.latency);
            }
            let served = match command {
                Command::File(offset) => self.open(&mut file, offset),
                Command::Range(range) => self.serve_range(&mut file, range),
                Command::Record => self.serve_record(),
            };
            match served {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(source = %self.id, error = %e, "Loopback peer failed");
                    self.disconnect();
                    break;
                }
            }
        }
        debug!(source = %self.id, "Loopback peer stopped");
    }

    /// Accept the transfer. Streaming peers send everything right away.
    fn open(&self, file: &mut File, offset: u64) -> io::Result<bool> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok(false);
        };
        if manager.source_ready(&self.id).is_err() {
            return Ok(false);
        }
        if self.options.capabilities.part_requests {
            return Ok(true);
        }

        let size = file.metadata()?.len();
        let mut offset = offset;
        while offset < size {
            let range = Range::by_bounds(offset, size).truncate(self.options.stream_chunk_size);
            let chunk = read_chunk(file, range)?;
            manager.received_chunk(&self.id, chunk);
            offset = range.end();
        }
        Ok(true)
    }

    fn serve_range(&self, file: &mut File, range: Range) -> io::Result<bool> {
        let chunk = read_chunk(file, range)?;
        let Some(manager) = self.manager.upgrade() else {
            return Ok(false);
        };
        manager.received_chunk(&self.id, chunk);
        Ok(true)
    }

    fn serve_record(&self) -> io::Result<bool> {
        let size = std::fs::metadata(&self.reference)?.len();
        let part_length = self
            .options
            .part_length
            .unwrap_or_else(|| default_part_length(size));
        let record = build_record(Path::new(&self.reference), part_length, &mut |_| true)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let Some(manager) = self.manager.upgrade() else {
            return Ok(false);
        };
        manager.received_parts_record(&self.id, record);
        Ok(true)
    }

    fn disconnect(&self) {
        if let Some(manager) = self.manager.upgrade() {
            let _ = manager.remove_source(&self.id);
        }
    }
}

fn read_chunk(file: &mut File, range: Range) -> io::Result<FileChunk> {
    let mut data = vec![0u8; range.length() as usize];
    file.seek(SeekFrom::Start(range.start()))?;
    file.read_exact(&mut data)?;
    Ok(FileChunk::new(range.start(), data))
}
