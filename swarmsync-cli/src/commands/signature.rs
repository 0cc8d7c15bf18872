//! Signature command - compute the parts record of a file.

use std::path::PathBuf;

use clap::Args;
use swarmsync::config::ConfigFile;
use swarmsync::delta::{build_record, MAX_PART_LENGTH};

use super::common::{format_size, percent_bar};
use crate::error::CliError;

/// Arguments for the signature command.
#[derive(Debug, Args)]
pub struct SignatureArgs {
    /// File to describe
    pub file: PathBuf,

    /// Block size in bytes (derived from the file size when omitted)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_PART_LENGTH))]
    pub part_length: Option<u64>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the encoded record to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the signature command.
pub fn run(args: SignatureArgs, config: &ConfigFile) -> Result<(), CliError> {
    let size = std::fs::metadata(&args.file)
        .map_err(|e| CliError::io(&args.file, e))?
        .len();
    let part_length = args
        .part_length
        .unwrap_or_else(|| config.transfer.part_length_for(size));

    let bar = (!args.json).then(|| percent_bar("Hashing..."));
    let record = build_record(&args.file, part_length, &mut |percent| {
        if let Some(bar) = &bar {
            bar.set_position(u64::from(percent));
        }
        true
    });
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let record = record?;
    record.validate()?;

    if let Some(output) = &args.output {
        let encoded = record.encode()?;
        std::fs::write(output, &encoded).map_err(|e| CliError::io(output, e))?;
        tracing::info!(path = %output.display(), bytes = encoded.len(), "Record written");
    }

    if args.json {
        let summary = serde_json::json!({
            "file": args.file.display().to_string(),
            "file_length": record.file_length(),
            "part_length": record.part_length(),
            "blocks": record.parts().len(),
            "sha256": record.file_digest_hex(),
        });
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!("File:        {}", args.file.display());
    println!("Size:        {} ({} bytes)", format_size(record.file_length()), record.file_length());
    println!("Block size:  {}", format_size(record.part_length()));
    println!("Blocks:      {}", record.parts().len());
    println!("SHA-256:     {}", record.file_digest_hex());
    if let Some(output) = &args.output {
        println!("Record:      {}", output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use swarmsync::delta::FilePartsRecord;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: SignatureArgs,
    }

    fn parse(argv: &[&str]) -> Result<SignatureArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("signature").chain(argv.iter().copied()))
            .map(|cli| cli.args)
    }

    #[test]
    fn test_part_length_must_be_in_range() {
        assert!(parse(&["f.bin", "--part-length", "0"]).is_err());
        assert!(parse(&["f.bin", "--part-length", "18446744073709551615"]).is_err());
        let args = parse(&["f.bin", "--part-length", "65536"]).unwrap();
        assert_eq!(args.part_length, Some(MAX_PART_LENGTH));
    }

    #[test]
    fn test_writes_decodable_record() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("data.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
        std::fs::write(&file, &data).unwrap();
        let output = temp.path().join("data.rec");

        let args = SignatureArgs {
            file,
            part_length: Some(1024),
            json: true,
            output: Some(output.clone()),
        };
        run(args, &ConfigFile::default()).unwrap();

        let record = FilePartsRecord::decode(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(record.file_length(), 10_000);
        assert_eq!(record.part_length(), 1024);
        assert_eq!(record.parts().len(), 10);
    }
}
