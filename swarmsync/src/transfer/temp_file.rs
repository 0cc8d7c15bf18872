//! The on-disk file a transfer assembles into.
//!
//! It lives next to the target as `(incomplete) <name>` and takes the remote
//! file's modification time whenever the manager shuts down, so resume logic
//! can tell whether it is stale.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;

/// Prefix marking a file as still being assembled.
pub const INCOMPLETE_PREFIX: &str = "(incomplete) ";

/// Path of the temp file for a target at `disk_path`.
pub fn temp_file_path(disk_path: &Path) -> PathBuf {
    let mut name = OsString::from(INCOMPLETE_PREFIX);
    if let Some(file_name) = disk_path.file_name() {
        name.push(file_name);
    }
    disk_path.with_file_name(name)
}

/// Create or truncate the temp file, creating parent directories.
pub fn open_temp_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Set the last-modified time of `path`.
pub fn touch_modified(path: &Path, modified: SystemTime) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_system_time(modified))
}
