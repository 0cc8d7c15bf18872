//! Transfer telemetry for observability and user feedback.
//!
//! Managers record events into a shared [`TransferMetrics`] using lock-free
//! atomic counters. One instance can be shared by every manager of a process
//! to get totals across transfers.
//!
//! # Architecture
//!
//! ```text
//! DownloadManager ─────► TransferMetrics ─────► MetricsSnapshot ─────► Views
//!                        (atomic counters)     (point-in-time copy)   (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```
//! use swarmsync::telemetry::TransferMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(TransferMetrics::new());
//!
//! metrics.chunk_received(32 * 1024);
//! metrics.transfer_completed();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.bytes_received, 32 * 1024);
//! assert_eq!(snapshot.transfers_completed, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::TransferMetrics;
pub use snapshot::MetricsSnapshot;
