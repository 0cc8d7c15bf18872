//! Addressable configuration keys (`section.key`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};
use crate::delta::MAX_PART_LENGTH;
use crate::transfer::SourceSelection;

/// Every setting that can be read or written by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TransferMaxChunkSize,
    TransferMinDeltaSize,
    TransferMaxRequestsPerSource,
    TransferPartLength,
    TransferSourceSelection,
    TransferMaxVerificationFailures,
    TransferWorkerThreads,
    LoggingLevel,
    LoggingFile,
}

const ALL_KEYS: [ConfigKey; 9] = [
    ConfigKey::TransferMaxChunkSize,
    ConfigKey::TransferMinDeltaSize,
    ConfigKey::TransferMaxRequestsPerSource,
    ConfigKey::TransferPartLength,
    ConfigKey::TransferSourceSelection,
    ConfigKey::TransferMaxVerificationFailures,
    ConfigKey::TransferWorkerThreads,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingFile,
];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::LoggingLevel | ConfigKey::LoggingFile => "logging",
            _ => "transfer",
        }
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::TransferMaxChunkSize => "max_chunk_size",
            ConfigKey::TransferMinDeltaSize => "min_delta_size",
            ConfigKey::TransferMaxRequestsPerSource => "max_requests_per_source",
            ConfigKey::TransferPartLength => "part_length",
            ConfigKey::TransferSourceSelection => "source_selection",
            ConfigKey::TransferMaxVerificationFailures => "max_verification_failures",
            ConfigKey::TransferWorkerThreads => "worker_threads",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let t = &config.transfer;
        match self {
            ConfigKey::TransferMaxChunkSize => t.max_chunk_size.to_string(),
            ConfigKey::TransferMinDeltaSize => t.min_delta_size.to_string(),
            ConfigKey::TransferMaxRequestsPerSource => t.max_requests_per_source.to_string(),
            ConfigKey::TransferPartLength => {
                t.part_length.map(|v| v.to_string()).unwrap_or_default()
            }
            ConfigKey::TransferSourceSelection => t.source_selection.to_string(),
            ConfigKey::TransferMaxVerificationFailures => t.max_verification_failures.to_string(),
            ConfigKey::TransferWorkerThreads => t.worker_threads.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validate and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let t = &mut config.transfer;
        match self {
            ConfigKey::TransferMaxChunkSize => t.max_chunk_size = self.positive(value)?,
            ConfigKey::TransferMinDeltaSize => t.min_delta_size = self.number(value)?,
            ConfigKey::TransferMaxRequestsPerSource => {
                t.max_requests_per_source = self.positive(value)? as usize
            }
            ConfigKey::TransferPartLength => {
                t.part_length = if value.is_empty() {
                    None
                } else {
                    let length = self.positive(value)?;
                    if length > MAX_PART_LENGTH {
                        return Err(self.invalid(value, "larger than the maximum block size"));
                    }
                    Some(length)
                }
            }
            ConfigKey::TransferSourceSelection => {
                t.source_selection = value
                    .parse::<SourceSelection>()
                    .map_err(|reason| self.invalid(value, reason))?
            }
            ConfigKey::TransferMaxVerificationFailures => {
                t.max_verification_failures = u32::try_from(self.positive(value)?)
                    .map_err(|_| self.invalid(value, "too large"))?
            }
            ConfigKey::TransferWorkerThreads => t.worker_threads = self.number(value)? as usize,
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, "expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingFile => {
                config.logging.file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
        }
        Ok(())
    }

    fn number(&self, value: &str) -> Result<u64, ConfigError> {
        value
            .parse::<u64>()
            .map_err(|e| self.invalid(value, e.to_string()))
    }

    fn positive(&self, value: &str) -> Result<u64, ConfigError> {
        match self.number(value)? {
            0 => Err(self.invalid(value, "must be greater than zero")),
            n => Ok(n),
        }
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(
            "transfer.max_chunk_size".parse::<ConfigKey>().unwrap(),
            ConfigKey::TransferMaxChunkSize
        );
        assert_eq!(
            "Logging.Level".parse::<ConfigKey>().unwrap(),
            ConfigKey::LoggingLevel
        );
        assert!(matches!(
            "transfer.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_every_key_round_trips_its_default() {
        let config = ConfigFile::default();
        for key in ConfigKey::all() {
            let mut copy = ConfigFile::default();
            key.set(&mut copy, &key.get(&config)).unwrap();
            assert_eq!(copy, config, "key {}", key);
        }
    }

    #[test]
    fn test_set_validates() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::TransferMaxChunkSize.set(&mut config, "0").is_err());
        assert!(ConfigKey::TransferSourceSelection
            .set(&mut config, "fastest")
            .is_err());
        assert!(ConfigKey::LoggingLevel.set(&mut config, "loud").is_err());

        ConfigKey::TransferSourceSelection
            .set(&mut config, "least-loaded")
            .unwrap();
        assert_eq!(
            config.transfer.source_selection,
            SourceSelection::LeastLoaded
        );
    }

    #[test]
    fn test_part_length_unset() {
        let mut config = ConfigFile::default();
        ConfigKey::TransferPartLength.set(&mut config, "4096").unwrap();
        assert_eq!(config.transfer.part_length, Some(4096));
        ConfigKey::TransferPartLength.set(&mut config, "").unwrap();
        assert_eq!(config.transfer.part_length, None);
        assert_eq!(ConfigKey::TransferPartLength.get(&config), "");
    }

    #[test]
    fn test_part_length_above_maximum_rejected() {
        let mut config = ConfigFile::default();
        let result = ConfigKey::TransferPartLength.set(&mut config, "65537");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(config.transfer.part_length, None);
    }

    #[test]
    fn test_sections() {
        assert_eq!(ConfigKey::LoggingFile.section(), "logging");
        assert_eq!(ConfigKey::TransferWorkerThreads.section(), "transfer");
        assert_eq!(ConfigKey::TransferWorkerThreads.name(), "transfer.worker_threads");
    }
}
