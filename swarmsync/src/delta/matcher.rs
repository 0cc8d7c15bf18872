//! Block matching against a signature record.
//!
//! Scans a local candidate file with a rolling checksum the size of the
//! record's blocks. At every offset the weak checksum is looked up in a table
//! built from the record; a weak hit only counts once the strong hash of the
//! window matches too. Matches survive insertions and deletions in the
//! candidate because the scan does not assume blocks are aligned.
//!
//! ```text
//! candidate:  [x][ block 0 ][ block 1 ][yy][ block 3 ]...
//!              ^ slide 1 byte on miss
//!                 ^ jump a whole block on match
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{DeltaError, DeltaResult};
use super::record::{percent, Digest256, FilePartsRecord};
use super::rolling::{weak_checksum, RollingChecksum};
use crate::range::Range;

/// Bytes read from the candidate per refill (64KB).
const READ_SIZE: usize = 64 * 1024;

/// A local byte range identical to a block of the reference file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchInfo {
    /// Where the bytes are in the local candidate.
    pub local_range: Range,
    /// Which block of the record they reproduce.
    pub part_index: u64,
}

/// Find every block of `record` present in the file at `candidate`.
///
/// `progress` receives the percentage of the candidate scanned so far and may
/// return `false` to cancel. Matches are ordered by local offset.
pub fn find_matches(
    candidate: &Path,
    record: &FilePartsRecord,
    progress: &mut dyn FnMut(u8) -> bool,
) -> DeltaResult<Vec<MatchInfo>> {
    let file = File::open(candidate).map_err(|e| DeltaError::read(candidate, e))?;
    let total = file
        .metadata()
        .map_err(|e| DeltaError::read(candidate, e))?
        .len();

    let part_length = record.part_length();
    let table = WeakTable::new(record);
    let mut scanner = Scanner::new(file, total);
    let mut matches = Vec::new();

    if !table.is_empty() && part_length <= total {
        scan(&mut scanner, record, &table, &mut matches, progress)
            .map_err(|e| map_scan_error(candidate, e))?;
    }

    match_tail(&mut scanner.file, total, record, &mut matches)
        .map_err(|e| DeltaError::read(candidate, e))?;

    if !progress(100) {
        return Err(DeltaError::Cancelled);
    }

    matches.sort_by_key(|m| (m.local_range.start(), m.part_index));
    Ok(matches)
}

enum ScanError {
    Io(io::Error),
    Cancelled,
}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> Self {
        ScanError::Io(e)
    }
}

fn map_scan_error(path: &Path, err: ScanError) -> DeltaError {
    match err {
        ScanError::Io(e) => DeltaError::read(path, e),
        ScanError::Cancelled => DeltaError::Cancelled,
    }
}

/// Weak checksum lookup over the record's full-length blocks.
struct WeakTable {
    by_weak: HashMap<u32, Vec<usize>>,
}

impl WeakTable {
    fn new(record: &FilePartsRecord) -> Self {
        let mut by_weak: HashMap<u32, Vec<usize>> = HashMap::new();
        for (pos, part) in record.parts().iter().enumerate() {
            if record.part_range(part.index).length() == record.part_length() {
                by_weak.entry(part.weak).or_default().push(pos);
            }
        }
        Self { by_weak }
    }

    fn is_empty(&self) -> bool {
        self.by_weak.is_empty()
    }

    fn candidates(&self, weak: u32) -> Option<&[usize]> {
        self.by_weak.get(&weak).map(Vec::as_slice)
    }
}

/// Sliding read buffer over the candidate.
struct Scanner {
    file: File,
    total: u64,
    buf: Vec<u8>,
    /// File offset of `buf[0]`.
    base: u64,
    read: u64,
    eof: bool,
}

impl Scanner {
    fn new(file: File, total: u64) -> Self {
        Self {
            file,
            total,
            buf: Vec::with_capacity(READ_SIZE * 2),
            base: 0,
            read: 0,
            eof: false,
        }
    }

    /// Make sure `buf[..len]` is loaded. Returns false at end of file.
    fn ensure(
        &mut self,
        len: usize,
        progress: &mut dyn FnMut(u8) -> bool,
    ) -> Result<bool, ScanError> {
        while self.buf.len() < len {
            if self.eof {
                return Ok(false);
            }
            let old = self.buf.len();
            self.buf.resize(old + READ_SIZE, 0);
            let n = self.file.read(&mut self.buf[old..])?;
            self.buf.truncate(old + n);
            if n == 0 {
                self.eof = true;
            }
            self.read += n as u64;
            if !progress(percent(self.read, self.total).min(99)) {
                return Err(ScanError::Cancelled);
            }
        }
        Ok(true)
    }

    /// Drop consumed bytes before `pos`, returning the new window start.
    fn compact(&mut self, pos: usize) -> usize {
        if pos >= READ_SIZE {
            self.buf.drain(..pos);
            self.base += pos as u64;
            0
        } else {
            pos
        }
    }
}

fn scan(
    scanner: &mut Scanner,
    record: &FilePartsRecord,
    table: &WeakTable,
    matches: &mut Vec<MatchInfo>,
    progress: &mut dyn FnMut(u8) -> bool,
) -> Result<(), ScanError> {
    let block = record.part_length() as usize;
    let mut pos = 0usize;

    'windows: loop {
        if !scanner.ensure(pos + block, progress)? {
            break;
        }
        let mut rolling = RollingChecksum::new(&scanner.buf[pos..pos + block]);

        loop {
            if let Some(candidates) = table.candidates(rolling.value()) {
                let window = &scanner.buf[pos..pos + block];
                let strong: Digest256 = Sha256::digest(window).into();
                let local_range = Range::by_length(scanner.base + pos as u64, block as u64);
                let before = matches.len();
                for &idx in candidates {
                    let part = &record.parts()[idx];
                    if part.strong == strong {
                        matches.push(MatchInfo {
                            local_range,
                            part_index: part.index,
                        });
                    }
                }
                if matches.len() > before {
                    pos = scanner.compact(pos + block);
                    continue 'windows;
                }
            }

            if !scanner.ensure(pos + block + 1, progress)? {
                break 'windows;
            }
            rolling.roll(scanner.buf[pos], scanner.buf[pos + block]);
            pos = scanner.compact(pos + 1);
        }
    }
    Ok(())
}

/// Check a short final block against the candidate's last bytes.
fn match_tail(
    file: &mut File,
    total: u64,
    record: &FilePartsRecord,
    matches: &mut Vec<MatchInfo>,
) -> io::Result<()> {
    let Some(last) = record.parts().last() else {
        return Ok(());
    };
    let tail = record.part_range(last.index);
    if tail.length() == record.part_length() || tail.length() > total {
        return Ok(());
    }

    let start = total - tail.length();
    let mut bytes = vec![0u8; tail.length() as usize];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut bytes)?;

    if weak_checksum(&bytes) != last.weak {
        return Ok(());
    }
    let strong: Digest256 = Sha256::digest(&bytes).into();
    if strong == last.strong {
        matches.push(MatchInfo {
            local_range: Range::by_length(start, tail.length()),
            part_index: last.index,
        });
    }
    Ok(())
}
