//! Append-only published index series.
//!
//! One CSV per index. The header is written when the file is created; rows
//! are only ever appended. Readers build an in-memory index keyed by
//! `(index name, end date)` once per open, so lookups do not rescan the file.
//!
//! The format itself cannot prevent two rows for the same end date. When that
//! happens the most recently appended row is authoritative and lookups report
//! the duplication so it can be surfaced during verification.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{info, warn};

use crate::domain::PublishedRecord;
use crate::error::{AppError, exit};

pub const SERIES_COLUMNS: [&str; 14] = [
    "publication_date",
    "end_date",
    "window_days",
    "index_name",
    "index_value",
    "n_observations",
    "valid_days",
    "low_confidence",
    "min",
    "max",
    "mean",
    "stdev",
    "methodology_version",
    "calculated_utc",
];

/// What to do when appending a row for an end date that is already published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Reject,
    /// Append anyway; the new row supersedes the earlier ones.
    Supersede,
}

/// Lookup result for one `(index, end date)`.
#[derive(Debug, Clone)]
pub struct PublishedLookup<'a> {
    /// The authoritative (latest appended) row.
    pub record: &'a PublishedRecord,
    /// Total rows for this key, including the authoritative one.
    pub rows: usize,
    /// Whether the rows disagree on the index value.
    pub conflicting: bool,
}

impl PublishedLookup<'_> {
    pub fn has_duplicates(&self) -> bool {
        self.rows > 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishedSeries {
    path: PathBuf,
    records: Vec<PublishedRecord>,
    index: BTreeMap<(String, NaiveDate), Vec<usize>>,
    skipped_rows: usize,
}

impl PublishedSeries {
    /// Read the series at `path`. A missing file is an empty series.
    ///
    /// Rows without an `index_name` column value are attributed to
    /// `index_name` (older files carried one index per file and no name column).
    pub fn open(path: &Path, index_name: &str) -> Result<Self, AppError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Self {
                    path: path.to_path_buf(),
                    ..Self::default()
                });
            }
            Err(e) => {
                return Err(AppError::input(format!(
                    "Failed to read published series '{}': {e}",
                    path.display()
                )));
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());
        let headers = reader
            .headers()
            .map_err(|e| AppError::input(format!("Failed to read series header '{}': {e}", path.display())))?
            .clone();
        let header_map = build_header_map(&headers);

        let mut series = Self {
            path: path.to_path_buf(),
            ..Self::default()
        };

        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let parsed = result
                .map_err(|e| format!("CSV parse error: {e}"))
                .and_then(|record| parse_row(&record, &header_map, index_name));
            match parsed {
                Ok(record) => series.push(record),
                Err(message) => {
                    warn!(path = %path.display(), line, %message, "skipping malformed published row");
                    series.skipped_rows += 1;
                }
            }
        }

        Ok(series)
    }

    fn push(&mut self, record: PublishedRecord) {
        let key = (record.index_name.to_ascii_lowercase(), record.end_date);
        self.index.entry(key).or_default().push(self.records.len());
        self.records.push(record);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[PublishedRecord] {
        &self.records
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn lookup(&self, index_name: &str, end_date: NaiveDate) -> Option<PublishedLookup<'_>> {
        let rows = self.index.get(&(index_name.to_ascii_lowercase(), end_date))?;
        let last = *rows.last()?;
        let record = &self.records[last];
        let conflicting = rows
            .iter()
            .any(|&i| self.records[i].index_value != record.index_value);
        Some(PublishedLookup {
            record,
            rows: rows.len(),
            conflicting,
        })
    }

    pub fn contains(&self, index_name: &str, end_date: NaiveDate) -> bool {
        self.lookup(index_name, end_date).is_some()
    }

    /// Distinct end dates published for `index_name`, ascending.
    pub fn end_dates(&self, index_name: &str) -> Vec<NaiveDate> {
        let name = index_name.to_ascii_lowercase();
        self.index
            .keys()
            .filter(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .collect()
    }
}

/// Append one row to the series at `path`, creating it (with header) if needed.
pub fn append_record(path: &Path, record: &PublishedRecord, policy: DuplicatePolicy) -> Result<(), AppError> {
    let existing = PublishedSeries::open(path, &record.index_name)?;
    if let Some(found) = existing.lookup(&record.index_name, record.end_date) {
        match policy {
            DuplicatePolicy::Reject => {
                return Err(AppError::new(
                    exit::DUPLICATE,
                    format!(
                        "{} for {} is already published ({} row(s), value {}); refusing to append a duplicate.",
                        record.index_name,
                        record.end_date,
                        found.rows,
                        fmt_opt(found.record.index_value),
                    ),
                ));
            }
            DuplicatePolicy::Supersede => {
                warn!(
                    index = %record.index_name,
                    end_date = %record.end_date,
                    previous_rows = found.rows,
                    "appending superseding row for an already published end date"
                );
            }
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", parent.display())))?;
    }

    let write_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::input(format!("Failed to open published series '{}': {e}", path.display())))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if write_header {
        writer
            .write_record(SERIES_COLUMNS)
            .map_err(|e| AppError::input(format!("Failed to write series header: {e}")))?;
    }
    writer
        .write_record(to_row(record))
        .map_err(|e| AppError::input(format!("Failed to append series row: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush published series: {e}")))?;

    info!(path = %path.display(), index = %record.index_name, end_date = %record.end_date, "published");
    Ok(())
}

fn to_row(r: &PublishedRecord) -> Vec<String> {
    vec![
        r.publication_date.format("%Y-%m-%d").to_string(),
        r.end_date.format("%Y-%m-%d").to_string(),
        r.window_days.to_string(),
        r.index_name.clone(),
        fmt_opt(r.index_value),
        r.n_observations.to_string(),
        r.valid_days.to_string(),
        r.low_confidence.to_string(),
        fmt_opt(r.min),
        fmt_opt(r.max),
        fmt_opt(r.mean),
        fmt_opt(r.stdev),
        r.methodology_version.clone().unwrap_or_default(),
        r.calculated_utc.clone().unwrap_or_default(),
    ]
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    default_index: &str,
) -> Result<PublishedRecord, String> {
    let end_date = parse_date(get(record, header_map, "end_date").ok_or("Missing `end_date`.")?)?;
    let publication_date = get(record, header_map, "publication_date")
        .map(parse_date)
        .transpose()?
        .unwrap_or(end_date);

    // Older series files name the value column after the index.
    let index_value = get(record, header_map, "index_value")
        .or_else(|| get(record, header_map, "cri_h100"))
        .and_then(|s| parse_opt_f64(Some(s)));

    Ok(PublishedRecord {
        publication_date,
        end_date,
        window_days: get(record, header_map, "window_days")
            .and_then(|s| s.parse().ok())
            .unwrap_or(7),
        index_name: get(record, header_map, "index_name")
            .unwrap_or(default_index)
            .to_string(),
        index_value,
        n_observations: get(record, header_map, "n_observations")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        valid_days: get(record, header_map, "valid_days")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        low_confidence: get(record, header_map, "low_confidence").is_some_and(parse_bool),
        min: parse_opt_f64(get(record, header_map, "min")),
        max: parse_opt_f64(get(record, header_map, "max")),
        mean: parse_opt_f64(get(record, header_map, "mean")),
        stdev: parse_opt_f64(get(record, header_map, "stdev")),
        methodology_version: get(record, header_map, "methodology_version")
            .or_else(|| get(record, header_map, "ccir_version"))
            .map(str::to_string),
        calculated_utc: get(record, header_map, "calculated_utc").map(str::to_string),
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn get<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("Invalid date '{s}'. Expected YYYY-MM-DD."))
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
