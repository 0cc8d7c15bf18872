//! Part bookkeeping for a single file transfer.
//!
//! - [`FilePartsState`]: which byte ranges are needed, pending or available
//! - [`TransferCounter`]: bytes transferred against the file size

mod counter;
mod state;

pub use counter::TransferCounter;
pub use state::{FilePartsState, PartCounts, PartState};
