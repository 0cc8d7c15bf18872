//! Whole-file SHA-256 digests for verifying assembled files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{DeltaError, DeltaResult};
use super::record::{percent, Digest256};

/// Buffer size for reading files during digest calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the SHA-256 digest of a file.
///
/// `progress` receives the percentage read so far and may return `false` to
/// cancel.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the caller cancels.
pub fn file_digest(path: &Path, progress: &mut dyn FnMut(u8) -> bool) -> DeltaResult<Digest256> {
    let mut file = File::open(path).map_err(|e| DeltaError::read(path, e))?;
    let total = file
        .metadata()
        .map_err(|e| DeltaError::read(path, e))?
        .len();

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut read_total: u64 = 0;

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| DeltaError::read(path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        read_total += bytes_read as u64;
        if !progress(percent(read_total, total)) {
            return Err(DeltaError::Cancelled);
        }
    }

    Ok(hasher.finalize().into())
}

/// Check whether a file's digest equals `expected`.
pub fn verify_file_digest(
    path: &Path,
    expected: &Digest256,
    progress: &mut dyn FnMut(u8) -> bool,
) -> DeltaResult<bool> {
    Ok(&file_digest(path, progress)? == expected)
}
