//! Shared calculate/verify workflow used by the CLI handlers.
//!
//! store -> window aggregate -> index value -> publish (series row + audit)
//!
//! Handlers in `app` only translate arguments and print; everything that
//! touches the store or the published outputs lives here.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::domain::{CalculationResult, MAX_WINDOW_DAYS, MarketConfig, Methodology, PublishedRecord};
use crate::error::{AppError, exit};
use crate::index::{IndexCalculator, PublishedValue, VerificationReport, Verifier, VerifyOptions};
use crate::io::audit::write_audit;
use crate::io::published::{DuplicatePolicy, PublishedSeries, append_record};
use crate::io::snapshot::{SnapshotReceipt, read_price_file, write_snapshot};
use crate::io::store::FsObservationStore;

#[derive(Debug, Clone)]
pub struct CalculateOptions {
    pub end_date: NaiveDate,
    pub window: Option<u32>,
    pub min_valid_days: Option<usize>,
    pub policy: DuplicatePolicy,
    pub dry_run: bool,
}

/// Outputs of one `cri calculate` run.
#[derive(Debug, Clone)]
pub struct CalculationRun {
    pub result: CalculationResult,
    /// Set when a row was appended to the published series.
    pub series_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub end_date: NaiveDate,
    /// Compare against this value rather than the published series.
    pub value: Option<f64>,
    pub window: Option<u32>,
    pub check_integrity: bool,
}

/// Methodology v1.1 with the CLI's optional overrides applied.
pub fn methodology_for(window: Option<u32>, min_valid_days: Option<usize>) -> Methodology {
    let mut m = Methodology::v1_1();
    if let Some(w) = window {
        m = m.with_window(w);
    }
    if let Some(v) = min_valid_days {
        m = m.with_min_valid_days(v);
    }
    m
}

fn validate_window(window: Option<u32>) -> Result<(), AppError> {
    match window {
        Some(0) => Err(AppError::input("Window must be at least one day.")),
        Some(w) if w > MAX_WINDOW_DAYS => Err(AppError::input(format!(
            "Window of {w} days exceeds the maximum of {MAX_WINDOW_DAYS}."
        ))),
        _ => Ok(()),
    }
}

/// Calculate, then publish unless `dry_run` or the result has no value.
pub fn run_calculation(
    settings: &Settings,
    market: &MarketConfig,
    options: &CalculateOptions,
) -> Result<CalculationRun, AppError> {
    validate_window(options.window)?;
    let methodology = methodology_for(options.window, options.min_valid_days);
    let store = FsObservationStore::new(&settings.data_dir);

    let result = IndexCalculator::new(&store, &methodology).calculate(market, options.end_date)?;

    let mut run = CalculationRun {
        result,
        series_path: None,
        audit_path: None,
    };
    if options.dry_run {
        debug!(market = %market.id, "dry run; nothing written");
        return Ok(run);
    }

    let publication_date = run.result.calculated_utc.date_naive();
    let Some(record) = PublishedRecord::from_result(&run.result, publication_date) else {
        return Ok(run);
    };

    let series_path = settings.series_path(market);
    append_record(&series_path, &record, options.policy)?;
    let audit_path = write_audit(&settings.audit_dir(), &market.slug(), &run.result)?;
    info!(audit = %audit_path.display(), "audit document written");

    run.series_path = Some(series_path);
    run.audit_path = Some(audit_path);
    Ok(run)
}

/// Reproduce one end date and compare it with the published (or supplied) value.
pub fn run_verification(
    settings: &Settings,
    market: &MarketConfig,
    request: &VerifyRequest,
) -> Result<VerificationReport, AppError> {
    validate_window(request.window)?;
    let published = match request.value {
        Some(v) => Some(PublishedValue::bare(v)),
        None => {
            let series = open_series(settings, market)?;
            series
                .lookup(&market.index_name, request.end_date)
                .and_then(|l| PublishedValue::from_lookup(&l))
        }
    };

    let window = request.window.or(published.as_ref().and_then(|p| p.window_days));
    let methodology = methodology_for(window, None);
    let store = FsObservationStore::new(&settings.data_dir);

    Verifier::new(&store, &methodology).verify_with(
        market,
        request.end_date,
        published,
        VerifyOptions {
            check_integrity: request.check_integrity,
        },
    )
}

/// Reproduce every published end date for `market`, in date order.
pub fn run_series_verification(
    settings: &Settings,
    market: &MarketConfig,
    check_integrity: bool,
) -> Result<Vec<VerificationReport>, AppError> {
    let series = open_series(settings, market)?;
    let dates = series.end_dates(&market.index_name);
    if dates.is_empty() {
        return Err(AppError::new(
            exit::NOT_FOUND,
            format!(
                "No published {} rows in '{}'.",
                market.index_name,
                series.path().display()
            ),
        ));
    }

    let store = FsObservationStore::new(&settings.data_dir);
    let options = VerifyOptions { check_integrity };

    let mut reports = dates
        .par_iter()
        .map(|&end_date| {
            let published = series
                .lookup(&market.index_name, end_date)
                .and_then(|l| PublishedValue::from_lookup(&l));
            let methodology = methodology_for(published.as_ref().and_then(|p| p.window_days), None);
            Verifier::new(&store, &methodology).verify_with(market, end_date, published, options)
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    reports.sort_by_key(|r| r.end_date);

    info!(market = %market.id, rows = reports.len(), "series verified");
    Ok(reports)
}

/// Store a day of observations read from `input`.
pub fn run_import(
    settings: &Settings,
    market: &MarketConfig,
    date: NaiveDate,
    input: &Path,
    force: bool,
) -> Result<SnapshotReceipt, AppError> {
    let observations = read_price_file(input)?;
    if observations.is_empty() {
        return Err(AppError::input(format!(
            "No parseable prices in '{}'.",
            input.display()
        )));
    }
    let receipt = write_snapshot(&settings.data_dir, market, date, &observations, force)?;
    info!(
        market = %market.id,
        %date,
        n = receipt.n_observations,
        sha256 = %receipt.sha256,
        "snapshot stored"
    );
    Ok(receipt)
}

fn open_series(settings: &Settings, market: &MarketConfig) -> Result<PublishedSeries, AppError> {
    let path = settings.series_path(market);
    let series = PublishedSeries::open(&path, &market.index_name)?;
    if series.skipped_rows() > 0 {
        warn!(path = %path.display(), skipped = series.skipped_rows(), "malformed published rows ignored");
    }
    Ok(series)
}
