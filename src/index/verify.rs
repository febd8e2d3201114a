//! Independent verification of published values.
//!
//! The verifier reruns the exact calculation path against the current store
//! and compares the reproduced value with the published one at 4 dp. An
//! optional content-hash pass reports stored days whose bytes changed after
//! capture; that pass never alters the outcome but is always surfaced.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{CalculationResult, DayStatus, MarketConfig, Methodology};
use crate::error::{AppError, exit};
use crate::index::calculator::IndexCalculator;
use crate::io::published::PublishedLookup;
use crate::io::store::{IntegrityStatus, ObservationStore};
use crate::math::{round4, round_dp};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyOutcome {
    Match,
    Mismatch { difference: f64 },
    NotFound,
    NoData,
}

impl VerifyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            VerifyOutcome::Match => "MATCH",
            VerifyOutcome::Mismatch { .. } => "MISMATCH",
            VerifyOutcome::NotFound => "NOT_FOUND",
            VerifyOutcome::NoData => "NO_DATA",
        }
    }
}

/// A published value plus what the series says about it.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedValue {
    pub value: f64,
    pub window_days: Option<u32>,
    pub methodology_version: Option<String>,
    /// Rows found for this end date (1 in correct operation).
    pub rows: usize,
    pub conflicting: bool,
}

impl PublishedValue {
    /// A value supplied directly, without series context.
    pub fn bare(value: f64) -> Self {
        Self {
            value,
            window_days: None,
            methodology_version: None,
            rows: 1,
            conflicting: false,
        }
    }

    /// `None` when the authoritative row carries no value.
    pub fn from_lookup(lookup: &PublishedLookup<'_>) -> Option<Self> {
        Some(Self {
            value: lookup.record.index_value?,
            window_days: Some(lookup.record.window_days),
            methodology_version: lookup.record.methodology_version.clone(),
            rows: lookup.rows,
            conflicting: lookup.conflicting,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub check_integrity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayIntegrity {
    pub date: NaiveDate,
    pub integrity: IntegrityStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub market_id: String,
    pub index_name: String,
    pub end_date: NaiveDate,
    pub outcome: VerifyOutcome,
    pub reproduced: Option<f64>,
    pub published: Option<f64>,
    /// Empty unless the integrity check was requested.
    pub integrity: Vec<DayIntegrity>,
    pub suspect_days: usize,
    /// Reproduced confidence, escalated when any day failed the hash check.
    pub low_confidence: bool,
    pub warnings: Vec<String>,
    pub result: CalculationResult,
}

impl VerificationReport {
    pub fn integrity_checked(&self) -> bool {
        !self.integrity.is_empty()
    }

    /// Values matched although stored data changed since capture.
    pub fn is_suspicious(&self) -> bool {
        self.outcome == VerifyOutcome::Match && self.suspect_days > 0
    }

    pub fn is_success(&self) -> bool {
        self.outcome == VerifyOutcome::Match && self.suspect_days == 0
    }

    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            VerifyOutcome::Match if self.suspect_days > 0 => exit::SUSPECT,
            VerifyOutcome::Match => 0,
            VerifyOutcome::Mismatch { .. } => exit::MISMATCH,
            VerifyOutcome::NoData => exit::NO_DATA,
            VerifyOutcome::NotFound => exit::NOT_FOUND,
        }
    }
}

pub struct Verifier<'a, S: ObservationStore + ?Sized> {
    store: &'a S,
    methodology: &'a Methodology,
}

impl<'a, S: ObservationStore + ?Sized> Verifier<'a, S> {
    pub fn new(store: &'a S, methodology: &'a Methodology) -> Self {
        Self { store, methodology }
    }

    /// Verify a bare published value (or its absence) for `end_date`.
    pub fn verify(
        &self,
        market: &MarketConfig,
        end_date: NaiveDate,
        published: Option<f64>,
    ) -> Result<VerificationReport, AppError> {
        self.verify_with(market, end_date, published.map(PublishedValue::bare), VerifyOptions::default())
    }

    pub fn verify_with(
        &self,
        market: &MarketConfig,
        end_date: NaiveDate,
        published: Option<PublishedValue>,
        options: VerifyOptions,
    ) -> Result<VerificationReport, AppError> {
        let result = IndexCalculator::new(self.store, self.methodology).calculate(market, end_date)?;
        let reproduced = result.index_value;
        let published_value = published.as_ref().map(|p| round4(p.value));

        let outcome = match (reproduced, published_value) {
            (None, _) => VerifyOutcome::NoData,
            (Some(_), None) => VerifyOutcome::NotFound,
            (Some(r), Some(p)) if round4(r) == p => VerifyOutcome::Match,
            (Some(r), Some(p)) => VerifyOutcome::Mismatch {
                difference: round_dp((r - p).abs(), 6),
            },
        };

        let mut warnings = Vec::new();
        if let Some(p) = &published {
            self.collect_published_warnings(p, &mut warnings);
        }

        let integrity = if options.check_integrity {
            self.check_integrity(market, &result)?
        } else {
            Vec::new()
        };
        let suspect_days = integrity.iter().filter(|d| d.integrity.is_suspect()).count();
        if suspect_days > 0 {
            warnings.push(format!(
                "{suspect_days} stored day(s) no longer match their capture hash"
            ));
        }
        if outcome == VerifyOutcome::Match && suspect_days > 0 {
            warnings.push("value matched but underlying data changed; treat as suspicious".to_string());
        }

        match outcome {
            VerifyOutcome::Match if suspect_days == 0 => {
                info!(market = %market.id, %end_date, "verification match")
            }
            _ => warn!(
                market = %market.id,
                %end_date,
                outcome = outcome.label(),
                suspect_days,
                "verification did not cleanly match"
            ),
        }

        Ok(VerificationReport {
            market_id: market.id.clone(),
            index_name: market.index_name.clone(),
            end_date,
            outcome,
            reproduced,
            published: published_value,
            integrity,
            suspect_days,
            low_confidence: result.low_confidence || suspect_days > 0,
            warnings,
            result,
        })
    }

    fn collect_published_warnings(&self, p: &PublishedValue, warnings: &mut Vec<String>) {
        if let Some(version) = &p.methodology_version {
            if *version != self.methodology.version {
                warnings.push(format!(
                    "published under methodology v{version}, verifying with v{}",
                    self.methodology.version
                ));
            }
        }
        if let Some(window) = p.window_days {
            if window != self.methodology.window_days {
                warnings.push(format!(
                    "published with a {window}-day window, verifying with {} days",
                    self.methodology.window_days
                ));
            }
        }
        if p.rows > 1 {
            let detail = if p.conflicting { "with differing values" } else { "with equal values" };
            warnings.push(format!(
                "{} published rows for this end date {detail}; latest row used",
                p.rows
            ));
        }
    }

    fn check_integrity(&self, market: &MarketConfig, result: &CalculationResult) -> Result<Vec<DayIntegrity>, AppError> {
        let mut out = Vec::with_capacity(result.daily.len());
        for day in &result.daily {
            let integrity = if day.status == DayStatus::Missing {
                IntegrityStatus::Missing
            } else {
                self.store.integrity(market, day.date)?
            };
            if let IntegrityStatus::Tampered { recorded, actual } = &integrity {
                warn!(market = %market.id, date = %day.date, %recorded, %actual, "content hash mismatch");
            }
            out.push(DayIntegrity {
                date: day.date,
                integrity,
            });
        }
        Ok(out)
    }
}
