//! Delta synchronization: reuse blocks of a stale local copy.
//!
//! The pipeline has three stages, each a plain function so it can run on any
//! worker thread:
//!
//! 1. [`find_matches`] scans a local candidate against a remote
//!    [`FilePartsRecord`] and reports which local ranges equal which remote
//!    blocks.
//! 2. [`copy_matches`] writes those ranges into the temp file and returns the
//!    resulting [`FilePartsState`](crate::parts::FilePartsState).
//! 3. [`verify_file_digest`] checks the assembled file against the record's
//!    whole-file digest.
//!
//! # Example
//!
//! ```ignore
//! use swarmsync::delta::{build_record, find_matches};
//!
//! let record = build_record(&reference, 1024, &mut |_| true)?;
//! let matches = find_matches(&stale_copy, &record, &mut |_| true)?;
//! println!("{} blocks reusable", matches.len());
//! ```

mod checksum;
mod copier;
mod error;
mod matcher;
mod record;
mod rolling;

pub use checksum::{file_digest, verify_file_digest};
pub use copier::copy_matches;
pub use error::{DeltaError, DeltaResult};
pub use matcher::{find_matches, MatchInfo};
pub use record::{
    build_record, default_part_length, Digest256, FilePartsRecord, FilePartsRecordBuilder,
    PartInfo, MAX_PART_LENGTH, MIN_PART_LENGTH,
};
pub use rolling::{weak_checksum, RollingChecksum};
