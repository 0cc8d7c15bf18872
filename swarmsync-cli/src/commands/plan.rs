//! Plan command - preview how much of a local copy a transfer would reuse.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Args;
use swarmsync::config::ConfigFile;
use swarmsync::delta::{build_record, find_matches, FilePartsRecord, MatchInfo, MAX_PART_LENGTH};

use super::common::{format_size, percent_bar};
use crate::error::CliError;

/// Arguments for the plan command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// The up-to-date file
    pub reference: PathBuf,

    /// The stale local copy
    pub local: PathBuf,

    /// Block size in bytes (derived from the reference size when omitted)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_PART_LENGTH))]
    pub part_length: Option<u64>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Blocks of the reference a local copy can supply.
#[derive(Debug, Clone, PartialEq)]
struct Plan {
    blocks: usize,
    matched_blocks: usize,
    reusable_bytes: u64,
    fetch_bytes: u64,
}

impl Plan {
    fn new(record: &FilePartsRecord, matches: &[MatchInfo]) -> Self {
        let matched: BTreeSet<u64> = matches.iter().map(|m| m.part_index).collect();
        let reusable_bytes = matched
            .iter()
            .map(|&index| record.part_range(index).length())
            .sum();
        Self {
            blocks: record.parts().len(),
            matched_blocks: matched.len(),
            reusable_bytes,
            fetch_bytes: record.file_length() - reusable_bytes,
        }
    }
}

/// Run the plan command.
pub fn run(args: PlanArgs, config: &ConfigFile) -> Result<(), CliError> {
    let size = std::fs::metadata(&args.reference)
        .map_err(|e| CliError::io(&args.reference, e))?
        .len();
    let part_length = args
        .part_length
        .unwrap_or_else(|| config.transfer.part_length_for(size));

    let bar = (!args.json).then(|| percent_bar("Hashing reference..."));
    let record = build_record(&args.reference, part_length, &mut |percent| {
        if let Some(bar) = &bar {
            bar.set_position(u64::from(percent));
        }
        true
    })?;
    if let Some(bar) = &bar {
        bar.set_message("Scanning local copy...");
    }
    let matches = find_matches(&args.local, &record, &mut |percent| {
        if let Some(bar) = &bar {
            bar.set_position(u64::from(percent));
        }
        true
    });
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let plan = Plan::new(&record, &matches?);

    if args.json {
        let summary = serde_json::json!({
            "reference": args.reference.display().to_string(),
            "local": args.local.display().to_string(),
            "part_length": record.part_length(),
            "blocks": plan.blocks,
            "matched_blocks": plan.matched_blocks,
            "reusable_bytes": plan.reusable_bytes,
            "fetch_bytes": plan.fetch_bytes,
        });
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    let reuse = if record.file_length() == 0 {
        100.0
    } else {
        plan.reusable_bytes as f64 * 100.0 / record.file_length() as f64
    };
    println!("Reference:   {} ({})", args.reference.display(), format_size(record.file_length()));
    println!("Local copy:  {}", args.local.display());
    println!("Block size:  {}", format_size(record.part_length()));
    println!("Matched:     {} of {} blocks", plan.matched_blocks, plan.blocks);
    println!("Reusable:    {} ({:.1}%)", format_size(plan.reusable_bytes), reuse);
    println!("To fetch:    {}", format_size(plan.fetch_bytes));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmsync::delta::FilePartsRecordBuilder;
    use swarmsync::range::Range;

    fn record(len: usize, part_length: u64) -> FilePartsRecord {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
        let mut builder = FilePartsRecordBuilder::new(part_length);
        builder.update(&data);
        builder.finish()
    }

    #[test]
    fn test_plan_counts_each_block_once() {
        let record = record(2500, 1024);
        let matches = [
            MatchInfo {
                local_range: Range::by_length(0, 1024),
                part_index: 0,
            },
            MatchInfo {
                local_range: Range::by_length(4096, 1024),
                part_index: 0,
            },
            MatchInfo {
                local_range: Range::by_length(5000, 452),
                part_index: 2,
            },
        ];

        let plan = Plan::new(&record, &matches);
        assert_eq!(plan.blocks, 3);
        assert_eq!(plan.matched_blocks, 2);
        assert_eq!(plan.reusable_bytes, 1024 + 452);
        assert_eq!(plan.fetch_bytes, 2500 - 1024 - 452);
    }

    #[test]
    fn test_plan_without_matches() {
        let record = record(4096, 1024);
        let plan = Plan::new(&record, &[]);
        assert_eq!(plan.matched_blocks, 0);
        assert_eq!(plan.fetch_bytes, 4096);
    }
}
