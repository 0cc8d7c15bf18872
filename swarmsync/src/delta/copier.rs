//! Copies matched local blocks into the temp file.
//!
//! The output is the tracker the download resumes from: every copied block is
//! [`PartState::Available`], everything else is [`PartState::Needed`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use super::error::{DeltaError, DeltaResult};
use super::matcher::MatchInfo;
use super::record::{percent, FilePartsRecord};
use crate::parts::{FilePartsState, PartState};

/// Copy every matched block from `candidate` into `temp`.
///
/// `temp` is resized to the record's file length first. Blocks already
/// filled by an earlier match are skipped. `progress` always ends at 100.
/// `temp_path` is only used for error reporting.
pub fn copy_matches(
    candidate: &Path,
    temp: &mut File,
    temp_path: &Path,
    record: &FilePartsRecord,
    matches: &[MatchInfo],
    progress: &mut dyn FnMut(u8) -> bool,
) -> DeltaResult<FilePartsState> {
    temp.set_len(record.file_length())
        .map_err(|e| DeltaError::write(temp_path, e))?;

    let mut state = FilePartsState::new(record.file_length());
    if matches.is_empty() {
        return if progress(100) {
            Ok(state)
        } else {
            Err(DeltaError::Cancelled)
        };
    }

    let mut source = File::open(candidate).map_err(|e| DeltaError::read(candidate, e))?;
    let mut buffer = Vec::new();
    let mut copied: u64 = 0;

    for (done, m) in matches.iter().enumerate() {
        let target = record.part_range(m.part_index);
        if target.length() != m.local_range.length()
            || state.count_part_states(target, PartState::Available) == target.length()
        {
            continue;
        }

        buffer.resize(target.length() as usize, 0);
        source
            .seek(SeekFrom::Start(m.local_range.start()))
            .and_then(|_| source.read_exact(&mut buffer))
            .map_err(|e| DeltaError::read(candidate, e))?;
        temp.seek(SeekFrom::Start(target.start()))
            .and_then(|_| temp.write_all(&buffer))
            .map_err(|e| DeltaError::write(temp_path, e))?;

        state.set_part_state(target, PartState::Available);
        copied += target.length();

        if !progress(percent(done as u64 + 1, matches.len() as u64)) {
            return Err(DeltaError::Cancelled);
        }
    }

    temp.flush().map_err(|e| DeltaError::write(temp_path, e))?;
    if !progress(100) {
        return Err(DeltaError::Cancelled);
    }
    debug!(
        copied,
        total = record.file_length(),
        matches = matches.len(),
        "Copied matching blocks"
    );
    Ok(state)
}
