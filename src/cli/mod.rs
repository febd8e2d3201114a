//! Command-line parsing for the `cri` price index tool.
//!
//! Argument parsing stays here; dispatch lives in `app`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "cri", version, about = "Compute Reference Index: GPU-hour price index engine")]
pub struct Cli {
    /// Root of the daily snapshot store (overrides CRI_DATA_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory for the published series and audit documents (overrides CRI_OUTPUT_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calculate the index for a window and publish it.
    Calculate(CalculateArgs),
    /// Reproduce one published value from stored observations.
    Verify(VerifyArgs),
    /// Reproduce every row of a published series.
    VerifySeries(VerifySeriesArgs),
    /// List configured markets.
    Markets,
    /// Store a day of observations with a content hash.
    Import(ImportArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CalculateArgs {
    /// Market id (see `cri markets`).
    #[arg(short, long, default_value = "h100-sxm-us")]
    pub market: String,

    /// Last day of the window (YYYY-MM-DD). Defaults to today (UTC).
    #[arg(long, value_name = "DATE")]
    pub end_date: Option<NaiveDate>,

    /// Window length in days.
    #[arg(long)]
    pub window: Option<u32>,

    /// Minimum valid days before the result is flagged low confidence.
    #[arg(long)]
    pub min_valid_days: Option<usize>,

    /// Supersede an existing row for the same end date instead of refusing.
    #[arg(long)]
    pub republish: bool,

    /// Print the result without writing the series or audit document.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full calculation record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct VerifyArgs {
    #[arg(short, long, default_value = "h100-sxm-us")]
    pub market: String,

    /// End date of the published value to reproduce.
    #[arg(long, value_name = "DATE")]
    pub end_date: NaiveDate,

    /// Compare against this value instead of the published series.
    #[arg(long)]
    pub value: Option<f64>,

    /// Also check stored days against their capture hashes.
    #[arg(long)]
    pub check_integrity: bool,

    /// Window length; defaults to the window recorded with the published row.
    #[arg(long)]
    pub window: Option<u32>,

    /// Print the verification report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct VerifySeriesArgs {
    #[arg(short, long, default_value = "h100-sxm-us")]
    pub market: String,

    #[arg(long)]
    pub check_integrity: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ImportArgs {
    #[arg(short, long, default_value = "h100-sxm-us")]
    pub market: String,

    /// Collection date of the observations.
    #[arg(long, value_name = "DATE")]
    pub date: NaiveDate,

    /// Snapshot CSV or a file with one price per line.
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Overwrite an existing day.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verify_requires_end_date() {
        assert!(Cli::try_parse_from(["cri", "verify"]).is_err());
        let cli = Cli::try_parse_from(["cri", "verify", "--end-date", "2026-03-07", "--value", "1.9"]).unwrap();
        match cli.command {
            Command::Verify(args) => {
                assert_eq!(args.market, "h100-sxm-us");
                assert_eq!(args.value, Some(1.9));
                assert!(!args.check_integrity);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_dirs_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["cri", "calculate", "--data-dir", "/tmp/d", "-vv", "--republish"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/d")));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Calculate(args) => {
                assert!(args.republish);
                assert!(args.end_date.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["cri", "verify", "--end-date", "2026-13-01"]).is_err());
    }
}
