//! File-level delta-sync: record a reference, match a local copy, copy the
//! hits, fill the gaps and verify.

mod common;

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use swarmsync::delta::{
    build_record, copy_matches, file_digest, find_matches, verify_file_digest, FilePartsRecord,
};
use swarmsync::parts::PartState;
use tempfile::TempDir;

use common::{random_bytes, write_file};

/// Run the whole pipeline and patch the remaining NEEDED ranges from
/// `reference`. Returns the bytes that had to be "downloaded".
fn reconstruct(dir: &TempDir, reference: &[u8], local: &[u8], part_length: u64) -> u64 {
    let reference_path = write_file(dir.path(), "reference", reference);
    let local_path = write_file(dir.path(), "local", local);
    let temp_path = dir.path().join("(incomplete) local");

    let record = build_record(&reference_path, part_length, &mut |_| true).unwrap();
    let record = FilePartsRecord::decode(&record.encode().unwrap()).unwrap();

    let matches = find_matches(&local_path, &record, &mut |_| true).unwrap();
    let mut temp = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .unwrap();
    let state = copy_matches(&local_path, &mut temp, &temp_path, &record, &matches, &mut |_| true)
        .unwrap();

    let mut fetched = 0;
    let needed: Vec<_> = state
        .parts()
        .filter(|(_, s)| *s == PartState::Needed)
        .map(|(r, _)| r)
        .collect();
    for range in needed {
        temp.seek(SeekFrom::Start(range.start())).unwrap();
        temp.write_all(&reference[range.start() as usize..range.end() as usize])
            .unwrap();
        fetched += range.length();
    }
    temp.sync_all().unwrap();

    assert!(verify_file_digest(&temp_path, record.file_digest(), &mut |_| true).unwrap());
    assert_eq!(std::fs::read(&temp_path).unwrap(), reference);
    fetched
}

#[test]
fn test_identical_copy_reproduced_without_fetching() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(300_001, 1);
    assert_eq!(reconstruct(&dir, &data, &data, 2048), 0);
}

#[test]
fn test_one_byte_shift_reuses_most_blocks() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(256 * 1024, 2);
    let mut local = vec![0x5a];
    local.extend_from_slice(&data);

    let fetched = reconstruct(&dir, &data, &local, 4096);
    // only the short tail block, if any, may be missed
    assert!(fetched <= 4096, "fetched {} bytes", fetched);
}

#[test]
fn test_truncated_copy_fetches_the_missing_end() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(100_000, 3);
    let local = data[..60_000].to_vec();

    let fetched = reconstruct(&dir, &data, &local, 1024);
    assert!(fetched >= 40_000);
    assert!(fetched <= 41_024);
}

#[test]
fn test_unrelated_copy_fetches_everything() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(50_000, 4);
    let local = random_bytes(50_000, 5);

    assert_eq!(reconstruct(&dir, &data, &local, 1024), 50_000);
}

#[test]
fn test_digest_matches_record() {
    let dir = TempDir::new().unwrap();
    let data = random_bytes(70_000, 6);
    let path = write_file(dir.path(), "file", &data);

    let record = build_record(&path, 1024, &mut |_| true).unwrap();
    let digest = file_digest(&path, &mut |_| true).unwrap();
    assert_eq!(&digest, record.file_digest());
}
