//! SwarmSync CLI - command-line interface
//!
//! Thin front end over the `swarmsync` library: compute signature records,
//! preview how much of a local copy can be reused, and run a multi-peer
//! transfer against in-process loopback peers.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use swarmsync::config::ConfigFile;
use swarmsync::logging::{init_logging, LoggingGuard};

use commands::config::ConfigCommands;
use commands::signature::SignatureArgs;
use commands::sync::SyncArgs;
use commands::plan::PlanArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "swarmsync", version, about = "Multi-source, delta-sync file transfer")]
struct Cli {
    /// Log level or filter directives (overrides config.ini)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute the signature record of a file
    Signature(SignatureArgs),

    /// Show which blocks of a local copy match a reference file
    Plan(PlanArgs),

    /// Transfer a file from loopback peers, reusing a local copy
    Sync(SyncArgs),

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = commands::common::load_config();

    // config commands print to stdout only; skip the subscriber for them
    let _guard = match &cli.command {
        Commands::Config { .. } => None,
        _ => Some(setup_logging(&cli, &config)?),
    };

    match cli.command {
        Commands::Signature(args) => commands::signature::run(args, &config),
        Commands::Plan(args) => commands::plan::run(args, &config),
        Commands::Sync(args) => commands::sync::run(args, &config),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn setup_logging(cli: &Cli, config: &ConfigFile) -> Result<LoggingGuard, CliError> {
    let mut settings = config.logging.clone();
    if let Some(level) = &cli.log_level {
        settings.level = level.clone();
    }
    if let Some(file) = &cli.log_file {
        settings.file = Some(file.clone());
    }
    Ok(init_logging(&settings)?)
}
