//! Sync command - assemble a file from several loopback peers.
//!
//! Each peer is a [`LoopbackSource`] thread serving the reference file. The
//! target, if present, is the local candidate for delta-sync. On success the
//! verified temp file replaces the target.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use indicatif::ProgressBar;
use swarmsync::config::ConfigFile;
use swarmsync::telemetry::TransferMetrics;
use swarmsync::transfer::{
    DownloadManager, LoopbackOptions, LoopbackSource, RayonWorkerPool, SourceCapabilities,
    SourceTransport, TransferContext, TransferFile, TransferObserver, TransferPhase,
    TransferProblem,
};

use super::common::{format_size, percent_bar, resolve_transfer_config, SelectionArg};
use crate::error::CliError;

/// Arguments for the sync command.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// The up-to-date file the peers serve
    pub reference: PathBuf,

    /// Where the file should end up; an existing file is reused where possible
    pub target: PathBuf,

    /// Number of peers
    #[arg(long, default_value_t = 3)]
    pub peers: usize,

    /// Delay each peer adds before answering a request
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Reuse this file instead of the target
    #[arg(long, conflicts_with = "no_delta")]
    pub candidate: Option<PathBuf>,

    /// Download everything even if a local copy exists
    #[arg(long)]
    pub no_delta: bool,

    /// Use a single peer that streams the whole file without range requests
    #[arg(long)]
    pub streaming: bool,

    /// How ranges are distributed over peers
    #[arg(long, value_enum)]
    pub selection: Option<SelectionArg>,

    /// Maximum bytes per range request
    #[arg(long)]
    pub max_chunk_size: Option<u64>,

    /// Maximum outstanding requests per peer
    #[arg(long)]
    pub max_requests: Option<usize>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,

    /// Leave the verified temp file in place instead of replacing the target
    #[arg(long)]
    pub keep_temp: bool,
}

/// Shows phase changes on the progress bar.
struct BarObserver {
    bar: ProgressBar,
}

impl TransferObserver for BarObserver {
    fn phase_changed(&self, _file: &TransferFile, _from: TransferPhase, to: TransferPhase) {
        self.bar.set_message(to.to_string());
        if matches!(to, TransferPhase::Matching | TransferPhase::Copying | TransferPhase::Verifying) {
            self.bar.set_position(0);
        }
    }

    fn stage_progress(&self, _file: &TransferFile, _phase: TransferPhase, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn broken(&self, _file: &TransferFile, problem: TransferProblem, message: &str) {
        self.bar.set_message(format!("{}: {}", problem, message));
    }
}

/// Run the sync command.
pub fn run(args: SyncArgs, config: &ConfigFile) -> Result<(), CliError> {
    if args.peers == 0 {
        return Err(CliError::Config("--peers must be at least 1".to_string()));
    }
    let meta = std::fs::metadata(&args.reference).map_err(|e| CliError::io(&args.reference, e))?;
    let modified = meta
        .modified()
        .map_err(|e| CliError::io(&args.reference, e))?;

    let transfer_config = resolve_transfer_config(
        config,
        args.max_chunk_size,
        args.max_requests,
        args.selection,
    );
    let pool = RayonWorkerPool::new(transfer_config.worker_threads)
        .map_err(|e| CliError::Config(format!("Failed to create worker pool: {}", e)))?;
    let metrics = Arc::new(TransferMetrics::new());
    let bar = percent_bar("Starting...");
    let context = TransferContext::new(Arc::new(pool))
        .with_metrics(Arc::clone(&metrics))
        .with_observer(Arc::new(BarObserver { bar: bar.clone() }));

    let mut file = TransferFile::new(&args.target, meta.len(), modified);
    if args.no_delta {
        file = file.without_candidate();
    } else if let Some(candidate) = &args.candidate {
        file = file.with_candidate(candidate);
    }
    let manager = DownloadManager::new(file, transfer_config, context)?;

    let peer_count = if args.streaming { 1 } else { args.peers };
    let capabilities = if args.streaming {
        SourceCapabilities::streaming()
    } else {
        SourceCapabilities::full()
    };
    let options = LoopbackOptions::default()
        .with_capabilities(capabilities)
        .with_latency(Duration::from_millis(args.latency_ms));

    let mut peers = Vec::with_capacity(peer_count);
    for i in 0..peer_count {
        let peer = LoopbackSource::spawn(
            format!("peer-{}", i + 1),
            &args.reference,
            manager.downgrade(),
            options.clone(),
        )
        .map_err(|e| CliError::io(&args.reference, e))?;
        manager.add_source(peer.download())?;
        peers.push(peer);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let phase = wait(&manager, &bar, &shutdown, Duration::from_secs(args.timeout_secs));
    for peer in &peers {
        peer.abort();
    }
    for peer in &peers {
        peer.join();
    }
    bar.finish_and_clear();

    match phase {
        TransferPhase::Completed => {
            let destination = if args.keep_temp {
                manager.temp_path().to_path_buf()
            } else {
                replace_target(manager.temp_path(), &args.target)?;
                args.target.clone()
            };
            print_summary(&manager, &metrics, &destination);
            Ok(())
        }
        TransferPhase::Broken => Err(CliError::Sync("transfer broken, see log".to_string())),
        _ => Err(CliError::Sync(format!("stopped in phase {}", phase))),
    }
}

/// Poll until the transfer ends, Ctrl+C is pressed or `timeout` passes.
fn wait(
    manager: &DownloadManager,
    bar: &ProgressBar,
    shutdown: &AtomicBool,
    timeout: Duration,
) -> TransferPhase {
    let deadline = Instant::now() + timeout;
    loop {
        if manager.wait_until(Duration::from_millis(100), |s| s.is_terminal()) {
            return manager.phase();
        }
        if shutdown.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted, aborting transfer");
            manager.abort_and_cleanup();
            return manager.phase();
        }
        if Instant::now() >= deadline {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Timed out, aborting transfer");
            manager.abort_and_cleanup();
            return manager.phase();
        }

        let snapshot = manager.snapshot();
        if snapshot.phase == TransferPhase::Downloading {
            bar.set_position(snapshot.completion_percent as u64);
            bar.set_message(format!(
                "Downloading {} / {} from {} peers",
                format_size(snapshot.bytes_transferred),
                format_size(snapshot.file_size),
                snapshot.started_sources
            ));
        }
    }
}

fn replace_target(temp: &Path, target: &Path) -> Result<(), CliError> {
    std::fs::rename(temp, target).map_err(|e| CliError::io(target, e))
}

fn print_summary(manager: &DownloadManager, metrics: &TransferMetrics, destination: &Path) {
    let snapshot = metrics.snapshot();
    println!("Transfer complete");
    println!("─────────────────");
    println!("  File:      {}", destination.display());
    println!("  Size:      {}", format_size(manager.file().size()));
    println!(
        "  Received:  {} in {} chunks",
        format_size(snapshot.bytes_received),
        snapshot.chunks_received
    );
    println!(
        "  Reused:    {} ({:.0}%)",
        format_size(snapshot.bytes_reused),
        snapshot.reuse_ratio() * 100.0
    );
    println!("  Requests:  {}", snapshot.part_requests_sent);
    println!("  Elapsed:   {:.1}s", snapshot.uptime.as_secs_f64());
}
