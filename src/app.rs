//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging and resolves settings
//! - dispatches to the calculate/verify pipeline
//! - prints reports and maps outcomes to exit codes

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CalculateArgs, Cli, Command, ImportArgs, VerifyArgs, VerifySeriesArgs};
use crate::config::Settings;
use crate::domain::MarketRegistry;
use crate::error::{AppError, exit};
use crate::io::published::DuplicatePolicy;
use crate::report::SeriesTally;

pub mod pipeline;

/// Entry point for the `cri` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::from_env().with_overrides(cli.data_dir.as_deref(), cli.output_dir.as_deref());
    let registry = settings.registry()?;

    match cli.command {
        Command::Calculate(args) => handle_calculate(&settings, &registry, args),
        Command::Verify(args) => handle_verify(&settings, &registry, args),
        Command::VerifySeries(args) => handle_verify_series(&settings, &registry, args),
        Command::Markets => {
            println!("{}", crate::report::format_markets(&registry));
            Ok(())
        }
        Command::Import(args) => handle_import(&settings, &registry, args),
    }
}

/// Logs go to stderr so stdout stays clean for reports and JSON.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_calculate(settings: &Settings, registry: &MarketRegistry, args: CalculateArgs) -> Result<(), AppError> {
    let market = registry.get(&args.market)?;
    let options = pipeline::CalculateOptions {
        end_date: args.end_date.unwrap_or_else(|| Utc::now().date_naive()),
        window: args.window,
        min_valid_days: args.min_valid_days,
        policy: if args.republish {
            DuplicatePolicy::Supersede
        } else {
            DuplicatePolicy::Reject
        },
        dry_run: args.dry_run,
    };

    let run = pipeline::run_calculation(settings, market, &options)?;

    if args.json {
        println!("{}", to_json(&run.result)?);
    } else {
        println!(
            "{}",
            crate::report::format_calculation(&run.result, run.series_path.as_deref(), run.audit_path.as_deref())
        );
    }

    if run.result.index_value.is_none() {
        return Err(AppError::new(
            exit::NO_DATA,
            format!(
                "No valid observations for {} in the window ending {}; nothing published.",
                market.index_name, options.end_date
            ),
        ));
    }
    Ok(())
}

fn handle_verify(settings: &Settings, registry: &MarketRegistry, args: VerifyArgs) -> Result<(), AppError> {
    let market = registry.get(&args.market)?;
    let request = pipeline::VerifyRequest {
        end_date: args.end_date,
        value: args.value,
        window: args.window,
        check_integrity: args.check_integrity,
    };

    let report = pipeline::run_verification(settings, market, &request)?;

    if args.json {
        println!("{}", to_json(&report)?);
    } else {
        println!("{}", crate::report::format_verification(&report));
    }

    match report.exit_code() {
        0 => Ok(()),
        code => Err(AppError::new(
            code,
            format!("Verification of {} for {}: {}", market.index_name, args.end_date, outcome_label(&report)),
        )),
    }
}

fn handle_verify_series(
    settings: &Settings,
    registry: &MarketRegistry,
    args: VerifySeriesArgs,
) -> Result<(), AppError> {
    let market = registry.get(&args.market)?;
    let reports = pipeline::run_series_verification(settings, market, args.check_integrity)?;
    println!("{}", crate::report::format_series_verification(&market.index_name, &reports));

    let tally = SeriesTally::from_reports(&reports);
    match tally.exit_code() {
        0 => Ok(()),
        code => Err(AppError::new(
            code,
            format!(
                "{} of {} published rows did not verify cleanly.",
                tally.total() - tally.matched,
                tally.total()
            ),
        )),
    }
}

fn handle_import(settings: &Settings, registry: &MarketRegistry, args: ImportArgs) -> Result<(), AppError> {
    let market = registry.get(&args.market)?;
    let receipt = pipeline::run_import(settings, market, args.date, &args.input, args.force)?;
    println!(
        "Stored {} observations for {} on {}\n  {}\n  sha256 {}",
        receipt.n_observations,
        market.id,
        args.date,
        receipt.csv_path.display(),
        receipt.sha256
    );
    Ok(())
}

fn outcome_label(report: &crate::index::VerificationReport) -> &'static str {
    if report.is_suspicious() {
        "MATCH (SUSPICIOUS)"
    } else {
        report.outcome.label()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::input(format!("Failed to encode JSON: {e}")))
}
