//! Configuration: engine tunables and the on-disk INI file.
//!
//! [`TransferConfig`] is what a download manager consumes. [`ConfigFile`]
//! persists it together with logging settings, and [`ConfigKey`] gives
//! `section.key` access for the CLI.

mod file;
mod keys;
mod transfer;

pub use file::{config_file_path, ConfigError, ConfigFile, LoggingSettings};
pub use keys::ConfigKey;
pub use transfer::{
    TransferConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_REQUESTS_PER_SOURCE,
    DEFAULT_MAX_VERIFICATION_FAILURES, DEFAULT_MIN_DELTA_SIZE,
};
