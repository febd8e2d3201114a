//! Shared domain types.
//!
//! These types are serializable so they can be:
//!
//! - carried through aggregation and calculation in memory
//! - written whole as the JSON audit document
//! - reloaded later by a verifier or an operator

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::methodology::MethodologyParams;

/// A single price-per-GPU-hour observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub price: f64,
    /// Provenance: the source listing identity, when recorded.
    pub source_id: Option<String>,
}

impl Observation {
    pub fn new(price: f64) -> Self {
        Self { price, source_id: None }
    }
}

/// All observations of one market for one calendar date.
#[derive(Debug, Clone)]
pub struct DailyObservationSet {
    pub market_id: String,
    pub date: NaiveDate,
    pub observations: Vec<Observation>,
    /// Data rows present in the stored file.
    pub rows_read: usize,
    /// Rows dropped while reading (unparseable price or ineligible listing).
    pub rows_skipped: usize,
}

impl DailyObservationSet {
    pub fn prices(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.price).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Admission outcome of one day in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// No observation set exists for the date.
    Missing,
    /// A set exists but is below the minimum sample size.
    LowConfidence,
    /// Every observation was removed by the outlier filter.
    EmptyAfterFilter,
    /// The day contributes to the pooled sample.
    Included,
}

impl DayStatus {
    pub fn label(self) -> &'static str {
        match self {
            DayStatus::Missing => "MISSING",
            DayStatus::LowConfidence => "LOW CONFIDENCE",
            DayStatus::EmptyAfterFilter => "EMPTY AFTER FILTER",
            DayStatus::Included => "INCLUDED",
        }
    }
}

/// Per-day line of the audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub status: DayStatus,
    pub n_raw: usize,
    pub n_removed: usize,
    pub n_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

impl DailySummary {
    pub fn missing(date: NaiveDate) -> Self {
        Self {
            date,
            status: DayStatus::Missing,
            n_raw: 0,
            n_removed: 0,
            n_used: 0,
            median: None,
            mean: None,
        }
    }

    pub fn excluded(date: NaiveDate, status: DayStatus, n_raw: usize, n_removed: usize) -> Self {
        Self {
            date,
            status,
            n_raw,
            n_removed,
            n_used: 0,
            median: None,
            mean: None,
        }
    }
}

/// Summary statistics of the pooled sample, rounded to 4 dp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// `None` when fewer than two observations were pooled.
    pub stdev: Option<f64>,
}

/// The audit record of one index calculation.
///
/// Produced only by the calculator; never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub methodology_version: String,
    pub index_name: String,
    pub market_id: String,
    pub end_date: NaiveDate,
    pub window_days: u32,
    pub parameters: MethodologyParams,
    /// `None` when no observation survived admission and filtering.
    pub index_value: Option<f64>,
    pub n_observations: usize,
    pub valid_days: usize,
    pub low_confidence: bool,
    pub low_confidence_reason: Option<String>,
    pub summary: Option<SummaryStats>,
    pub daily: Vec<DailySummary>,
    pub methodology: String,
    pub calculated_utc: DateTime<Utc>,
}

impl CalculationResult {
    /// A result without an index value must not be published.
    pub fn is_publishable(&self) -> bool {
        self.index_value.is_some()
    }

    pub fn days_with_status(&self, status: DayStatus) -> usize {
        self.daily.iter().filter(|d| d.status == status).count()
    }
}

/// One row of the append-only published series.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub publication_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window_days: u32,
    pub index_name: String,
    pub index_value: Option<f64>,
    pub n_observations: usize,
    pub valid_days: usize,
    pub low_confidence: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub methodology_version: Option<String>,
    pub calculated_utc: Option<String>,
}

impl PublishedRecord {
    /// Build the row to publish for a calculation.
    ///
    /// Returns `None` for a non-publishable result.
    pub fn from_result(result: &CalculationResult, publication_date: NaiveDate) -> Option<Self> {
        let index_value = result.index_value?;
        let summary = result.summary.as_ref();
        Some(Self {
            publication_date,
            end_date: result.end_date,
            window_days: result.window_days,
            index_name: result.index_name.clone(),
            index_value: Some(index_value),
            n_observations: result.n_observations,
            valid_days: result.valid_days,
            low_confidence: result.low_confidence,
            min: summary.map(|s| s.min),
            max: summary.map(|s| s.max),
            mean: summary.map(|s| s.mean),
            stdev: summary.and_then(|s| s.stdev),
            methodology_version: Some(result.methodology_version.clone()),
            calculated_utc: Some(result.calculated_utc.to_rfc3339()),
        })
    }
}
