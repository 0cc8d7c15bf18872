//! Content-signature records.
//!
//! A [`FilePartsRecord`] describes a reference file as a sequence of
//! fixed-size blocks, each with a weak rolling checksum and a strong SHA-256
//! hash, plus the SHA-256 digest of the whole file. It is computed by the
//! peer holding the complete file and consumed by the receiving side to find
//! blocks it already has.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{DeltaError, DeltaResult};
use super::rolling::weak_checksum;
use crate::range::Range;

/// Smallest block size chosen by [`default_part_length`].
pub const MIN_PART_LENGTH: u64 = 512;

/// Largest block size chosen by [`default_part_length`], and the largest a
/// record may carry.
pub const MAX_PART_LENGTH: u64 = 64 * 1024;

/// Buffer size for reading files while building records (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// SHA-256 digest bytes.
pub type Digest256 = [u8; 32];

/// Pick a block size for a file: the square root of its length, clamped.
pub fn default_part_length(file_length: u64) -> u64 {
    ((file_length as f64).sqrt() as u64).clamp(MIN_PART_LENGTH, MAX_PART_LENGTH)
}

/// Checksums of one block of the reference file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    /// Position of the block in the file (block `i` starts at `i * part_length`).
    pub index: u64,
    /// Weak rolling checksum.
    pub weak: u32,
    /// SHA-256 of the block.
    pub strong: Digest256,
}

/// Immutable signature of a reference file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePartsRecord {
    file_length: u64,
    part_length: u64,
    parts: Vec<PartInfo>,
    file_digest: Digest256,
}

impl FilePartsRecord {
    /// Length of the reference file.
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Block size. The final block may be shorter.
    pub fn part_length(&self) -> u64 {
        self.part_length
    }

    /// Per-block checksums in file order.
    pub fn parts(&self) -> &[PartInfo] {
        &self.parts
    }

    /// SHA-256 digest of the whole reference file.
    pub fn file_digest(&self) -> &Digest256 {
        &self.file_digest
    }

    /// Hex form of the file digest.
    pub fn file_digest_hex(&self) -> String {
        hex::encode(self.file_digest)
    }

    /// Byte range of block `index` in the reference file.
    pub fn part_range(&self, index: u64) -> Range {
        let start = index.saturating_mul(self.part_length);
        Range::by_bounds(start, start.saturating_add(self.part_length).min(self.file_length))
    }

    /// Check the block size and that blocks are numbered in order and cover
    /// the file.
    pub fn validate(&self) -> DeltaResult<()> {
        if self.file_length > 0 && self.part_length == 0 {
            return Err(DeltaError::InvalidRecord("zero part length".to_string()));
        }
        if self.part_length > MAX_PART_LENGTH {
            return Err(DeltaError::InvalidRecord(format!(
                "part length {} exceeds {}",
                self.part_length, MAX_PART_LENGTH
            )));
        }
        let expected = if self.file_length == 0 {
            0
        } else {
            self.file_length.div_ceil(self.part_length)
        };
        if self.parts.len() as u64 != expected {
            return Err(DeltaError::InvalidRecord(format!(
                "expected {} parts, found {}",
                expected,
                self.parts.len()
            )));
        }
        if let Some((pos, part)) = self
            .parts
            .iter()
            .enumerate()
            .find(|(pos, part)| part.index != *pos as u64)
        {
            return Err(DeltaError::InvalidRecord(format!(
                "part at position {} has index {}",
                pos, part.index
            )));
        }
        Ok(())
    }

    /// Serialize to the compact sidecar format.
    pub fn encode(&self) -> DeltaResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| DeltaError::Encode(e.to_string()))
    }

    /// Deserialize from the compact sidecar format and validate.
    pub fn decode(bytes: &[u8]) -> DeltaResult<Self> {
        let record: Self =
            bincode::deserialize(bytes).map_err(|e| DeltaError::Encode(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

/// Incrementally builds a [`FilePartsRecord`] from streamed bytes.
#[derive(Debug)]
pub struct FilePartsRecordBuilder {
    part_length: u64,
    block: Vec<u8>,
    parts: Vec<PartInfo>,
    file_hasher: Sha256,
    file_length: u64,
}

impl FilePartsRecordBuilder {
    /// Create a builder producing blocks of `part_length` bytes, clamped to
    /// `1..=MAX_PART_LENGTH`.
    pub fn new(part_length: u64) -> Self {
        let part_length = part_length.clamp(1, MAX_PART_LENGTH);
        Self {
            part_length,
            block: Vec::with_capacity(part_length as usize),
            parts: Vec::new(),
            file_hasher: Sha256::new(),
            file_length: 0,
        }
    }

    /// Feed the next bytes of the file.
    pub fn update(&mut self, mut data: &[u8]) {
        self.file_hasher.update(data);
        self.file_length += data.len() as u64;

        while !data.is_empty() {
            let room = self.part_length as usize - self.block.len();
            let take = room.min(data.len());
            self.block.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.block.len() as u64 == self.part_length {
                self.flush_block();
            }
        }
    }

    fn flush_block(&mut self) {
        self.parts.push(PartInfo {
            index: self.parts.len() as u64,
            weak: weak_checksum(&self.block),
            strong: Sha256::digest(&self.block).into(),
        });
        self.block.clear();
    }

    /// Finish the record, emitting a short final block if needed.
    pub fn finish(mut self) -> FilePartsRecord {
        if !self.block.is_empty() {
            self.flush_block();
        }
        FilePartsRecord {
            file_length: self.file_length,
            part_length: self.part_length,
            parts: self.parts,
            file_digest: self.file_hasher.finalize().into(),
        }
    }
}

/// Build the record of a file on disk.
///
/// `progress` receives the percentage read so far and may return `false`
/// to cancel.
pub fn build_record(
    path: &Path,
    part_length: u64,
    progress: &mut dyn FnMut(u8) -> bool,
) -> DeltaResult<FilePartsRecord> {
    let mut file = File::open(path).map_err(|e| DeltaError::read(path, e))?;
    let total = file
        .metadata()
        .map_err(|e| DeltaError::read(path, e))?
        .len();

    let mut builder = FilePartsRecordBuilder::new(part_length);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut read_total: u64 = 0;

    loop {
        let n = file.read(&mut buffer).map_err(|e| DeltaError::read(path, e))?;
        if n == 0 {
            break;
        }
        builder.update(&buffer[..n]);
        read_total += n as u64;
        if !progress(percent(read_total, total)) {
            return Err(DeltaError::Cancelled);
        }
    }

    Ok(builder.finish())
}

/// Integer percentage of `done` over `total`, 100 for an empty total.
pub(crate) fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_builder_splits_blocks() {
        let mut builder = FilePartsRecordBuilder::new(4);
        builder.update(b"abcdefghij");
        let record = builder.finish();

        assert_eq!(record.file_length(), 10);
        assert_eq!(record.parts().len(), 3);
        assert_eq!(record.parts()[0].weak, weak_checksum(b"abcd"));
        let expected: Digest256 = Sha256::digest(b"ij").into();
        assert_eq!(record.parts()[2].strong, expected);
        assert_eq!(record.part_range(2), Range::by_bounds(8, 10));
        record.validate().unwrap();
    }

    #[test]
    fn test_builder_is_independent_of_update_boundaries() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 253) as u8).collect();

        let mut whole = FilePartsRecordBuilder::new(64);
        whole.update(&data);

        let mut pieces = FilePartsRecordBuilder::new(64);
        for chunk in data.chunks(7) {
            pieces.update(chunk);
        }

        assert_eq!(whole.finish(), pieces.finish());
    }

    #[test]
    fn test_file_digest_is_sha256() {
        let mut builder = FilePartsRecordBuilder::new(8);
        builder.update(b"hello world");
        let record = builder.finish();
        assert_eq!(
            record.file_digest_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_empty_file_record() {
        let record = FilePartsRecordBuilder::new(512).finish();
        assert_eq!(record.file_length(), 0);
        assert!(record.parts().is_empty());
        record.validate().unwrap();
    }

    #[test]
    fn test_encode_decode() {
        let mut builder = FilePartsRecordBuilder::new(16);
        builder.update(&[7u8; 100]);
        let record = builder.finish();

        let bytes = record.encode().unwrap();
        assert_eq!(FilePartsRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(FilePartsRecord::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_validate_detects_missing_parts() {
        let mut builder = FilePartsRecordBuilder::new(10);
        builder.update(&[0u8; 35]);
        let mut record = builder.finish();
        record.parts.pop();
        assert!(matches!(record.validate(), Err(DeltaError::InvalidRecord(_))));
    }

    #[test]
    fn test_oversized_part_length_is_rejected() {
        let mut builder = FilePartsRecordBuilder::new(10_000);
        builder.update(&[3u8; 10_000]);
        let mut record = builder.finish();
        record.part_length = u64::MAX;

        // still a single block covering the file
        assert_eq!(record.part_range(0), Range::by_bounds(0, 10_000));
        assert!(matches!(record.validate(), Err(DeltaError::InvalidRecord(_))));

        let bytes = record.encode().unwrap();
        assert!(matches!(
            FilePartsRecord::decode(&bytes),
            Err(DeltaError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_builder_clamps_part_length() {
        let mut builder = FilePartsRecordBuilder::new(u64::MAX);
        builder.update(&[1u8; 100]);
        let record = builder.finish();
        assert_eq!(record.part_length(), MAX_PART_LENGTH);
        record.validate().unwrap();

        assert_eq!(FilePartsRecordBuilder::new(0).finish().part_length(), 1);
    }

    #[test]
    fn test_build_record_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ref.bin");
        let data = vec![0x5Au8; 200_000];
        File::create(&path).unwrap().write_all(&data).unwrap();

        let mut last = 0;
        let record = build_record(&path, 4096, &mut |p| {
            last = p;
            true
        })
        .unwrap();

        let mut builder = FilePartsRecordBuilder::new(4096);
        builder.update(&data);
        assert_eq!(record, builder.finish());
        assert_eq!(last, 100);
    }

    #[test]
    fn test_build_record_missing_file() {
        let result = build_record(Path::new("/nonexistent/ref.bin"), 512, &mut |_| true);
        assert!(matches!(result, Err(DeltaError::NotFound { .. })));
    }

    #[test]
    fn test_build_record_cancelled() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ref.bin");
        File::create(&path).unwrap().write_all(&[1u8; 1000]).unwrap();

        let result = build_record(&path, 100, &mut |_| false);
        assert!(matches!(result, Err(DeltaError::Cancelled)));
    }

    #[test]
    fn test_default_part_length() {
        assert_eq!(default_part_length(0), MIN_PART_LENGTH);
        assert_eq!(default_part_length(1_000_000), 1000);
        assert_eq!(default_part_length(u64::MAX / 2), MAX_PART_LENGTH);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(300, 200), 100);
    }
}
