//! Common types and utilities shared across CLI commands.

use std::time::Duration;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use swarmsync::config::{ConfigError, ConfigFile, TransferConfig};
use swarmsync::transfer::SourceSelection;

/// Use a loaded configuration, or the defaults plus a warning when loading
/// failed.
pub fn config_or_default(loaded: Result<ConfigFile, ConfigError>) -> (ConfigFile, Option<String>) {
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (
            ConfigFile::default(),
            Some(format!("Warning: {}; using default settings", e)),
        ),
    }
}

/// Load `config.ini`, falling back to defaults with a warning on stderr.
///
/// Runs before logging is set up, so the warning is printed directly.
pub fn load_config() -> ConfigFile {
    let (config, warning) = config_or_default(ConfigFile::load());
    if let Some(warning) = warning {
        eprintln!("{}", warning);
    }
    config
}

/// Source selection strategy for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum SelectionArg {
    /// Always offer the next range to the first peer with capacity
    FirstEligible,
    /// Rotate through peers
    RoundRobin,
    /// Prefer the peer with the fewest outstanding requests
    LeastLoaded,
}

impl From<SelectionArg> for SourceSelection {
    fn from(arg: SelectionArg) -> Self {
        match arg {
            SelectionArg::FirstEligible => SourceSelection::FirstEligible,
            SelectionArg::RoundRobin => SourceSelection::RoundRobin,
            SelectionArg::LeastLoaded => SourceSelection::LeastLoaded,
        }
    }
}

/// Transfer settings from config.ini with command-line overrides applied.
pub fn resolve_transfer_config(
    config: &ConfigFile,
    max_chunk_size: Option<u64>,
    max_requests: Option<usize>,
    selection: Option<SelectionArg>,
) -> TransferConfig {
    // CLI takes precedence, then config
    let mut transfer = config.transfer.clone();
    if let Some(bytes) = max_chunk_size {
        transfer = transfer.with_max_chunk_size(bytes);
    }
    if let Some(count) = max_requests {
        transfer = transfer.with_max_requests_per_source(count);
    }
    if let Some(selection) = selection {
        transfer = transfer.with_source_selection(selection.into());
    }
    transfer
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Percentage bar used while a file is scanned or transferred.
pub fn percent_bar(message: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
    {
        bar.set_style(style.progress_chars("█▓░"));
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message(message.to_string());
    bar
}
