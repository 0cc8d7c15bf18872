//! SwarmSync - multi-source, delta-sync file transfer engine.
//!
//! Downloads one file from several peers at once, reusing whatever blocks a
//! stale local copy already has, and verifies the result.
//!
//! # Modules
//!
//! - [`range`]: half-open byte ranges
//! - [`parts`]: NEEDED / PENDING / AVAILABLE tracking and byte counters
//! - [`delta`]: signature records, block matching, copying and digests
//! - [`transfer`]: the download manager and everything it talks to
//! - [`config`]: tunables and the INI configuration file
//! - [`telemetry`]: atomic counters shared across transfers
//! - [`logging`]: subscriber setup for binaries
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use swarmsync::config::TransferConfig;
//! use swarmsync::transfer::{
//!     DownloadManager, LoopbackOptions, LoopbackSource, TransferContext, TransferFile,
//! };
//!
//! let meta = std::fs::metadata(&reference)?;
//! let file = TransferFile::new(&target, meta.len(), meta.modified()?);
//! let manager = DownloadManager::new(file, TransferConfig::default(), TransferContext::default())?;
//!
//! let peer = LoopbackSource::spawn("peer-1", &reference, manager.downgrade(), LoopbackOptions::default())?;
//! manager.add_source(peer.download())?;
//! manager.wait_for_terminal(Duration::from_secs(30));
//! ```

pub mod config;
pub mod delta;
pub mod logging;
pub mod parts;
pub mod range;
pub mod telemetry;
pub mod transfer;
