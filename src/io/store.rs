//! Observation store: read access to daily snapshots.
//!
//! The engine only ever *reads* from a store. Two backends are provided:
//!
//! - `FsObservationStore`: one CSV (+ metadata JSON) per market and date on disk
//! - `MemoryStore`: in-process sets, handy for embedding and tests
//!
//! Row handling is deliberately forgiving: a row whose price does not parse is
//! skipped, and a file with zero usable rows is reported as absent.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{ByteRecord, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{DailyObservationSet, MarketConfig, Observation};
use crate::error::AppError;
use crate::io::snapshot::{csv_path, meta_path, read_meta, sha256_hex};

/// Price columns accepted, in order of preference.
const PRICE_COLUMNS: [&str; 2] = ["dph_per_gpu", "price"];

/// Outcome of the content-hash check for one stored day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum IntegrityStatus {
    /// Stored bytes hash to the value recorded at capture time.
    Verified,
    /// Stored bytes no longer match the recorded hash.
    Tampered { recorded: String, actual: String },
    /// The day exists but no usable hash was recorded for it.
    NoRecordedHash,
    /// Nothing is stored for the day.
    Missing,
}

impl IntegrityStatus {
    pub fn is_suspect(&self) -> bool {
        matches!(self, IntegrityStatus::Tampered { .. })
    }
}

/// Read-only access to daily observation sets.
pub trait ObservationStore {
    /// Load the set for `(market, date)`. `Ok(None)` when absent or empty.
    fn read(&self, market: &MarketConfig, date: NaiveDate) -> Result<Option<DailyObservationSet>, AppError>;

    /// Compare the stored content against its recorded capture-time hash.
    fn integrity(&self, market: &MarketConfig, date: NaiveDate) -> Result<IntegrityStatus, AppError>;

    /// Whether a non-empty set exists for `(market, date)`.
    fn has(&self, market: &MarketConfig, date: NaiveDate) -> Result<bool, AppError> {
        Ok(self.read(market, date)?.is_some())
    }
}

/// Snapshot files under `{root}/{market.data_subdir}/`.
#[derive(Debug, Clone)]
pub struct FsObservationStore {
    root: PathBuf,
}

impl FsObservationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn market_dir(&self, market: &MarketConfig) -> PathBuf {
        self.root.join(&market.data_subdir)
    }

    fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>, AppError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::input(format!("Failed to read '{}': {e}", path.display()))),
        }
    }
}

impl ObservationStore for FsObservationStore {
    fn read(&self, market: &MarketConfig, date: NaiveDate) -> Result<Option<DailyObservationSet>, AppError> {
        let path = csv_path(&self.market_dir(market), date);
        let Some(bytes) = self.read_bytes(&path)? else {
            return Ok(None);
        };

        let (observations, rows_read) = parse_snapshot_csv(&bytes, Some(market))?;
        let rows_skipped = rows_read - observations.len();
        if rows_skipped > 0 {
            warn!(path = %path.display(), rows_skipped, "skipped unusable snapshot rows");
        }
        if observations.is_empty() {
            debug!(path = %path.display(), "snapshot has no usable rows; treating as absent");
            return Ok(None);
        }

        Ok(Some(DailyObservationSet {
            market_id: market.id.clone(),
            date,
            observations,
            rows_read,
            rows_skipped,
        }))
    }

    fn integrity(&self, market: &MarketConfig, date: NaiveDate) -> Result<IntegrityStatus, AppError> {
        let dir = self.market_dir(market);
        let Some(bytes) = self.read_bytes(&csv_path(&dir, date))? else {
            return Ok(IntegrityStatus::Missing);
        };
        let Some(meta) = read_meta(&meta_path(&dir, date)) else {
            return Ok(IntegrityStatus::NoRecordedHash);
        };
        let Some(recorded) = meta.recorded_sha256() else {
            return Ok(IntegrityStatus::NoRecordedHash);
        };

        let actual = sha256_hex(&bytes);
        if actual.eq_ignore_ascii_case(recorded) {
            Ok(IntegrityStatus::Verified)
        } else {
            Ok(IntegrityStatus::Tampered {
                recorded: recorded.to_ascii_lowercase(),
                actual,
            })
        }
    }
}

/// Parse snapshot CSV bytes into observations.
///
/// Returns the usable observations and the number of data rows seen. When a
/// market is supplied, listings below its eligibility thresholds are dropped
/// (only if the corresponding column is present and parses).
pub fn parse_snapshot_csv(
    bytes: &[u8],
    market: Option<&MarketConfig>,
) -> Result<(Vec<Observation>, usize), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    // Header bytes are decoded lossily: a mangled column name only loses that column.
    let headers = match reader.byte_headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            warn!(error = %e, "unreadable snapshot header; no usable rows");
            return Ok((Vec::new(), 0));
        }
    };
    let header_map = build_header_map(&headers);

    let Some(price_idx) = PRICE_COLUMNS.iter().find_map(|c| header_map.get(*c).copied()) else {
        let rows = reader.records().count();
        warn!(rows, "snapshot has no price column");
        return Ok((Vec::new(), rows));
    };
    let id_idx = header_map.get("listing_id").copied();
    let reliability_idx = header_map.get("reliability").copied();
    let gpus_idx = header_map.get("num_gpus").copied();

    let mut observations = Vec::new();
    let mut rows = 0usize;

    for result in reader.records() {
        rows += 1;
        let Ok(record) = result else { continue };

        let Some(price) = parse_f64(record.get(price_idx)) else {
            continue;
        };

        if let Some(market) = market {
            if !is_eligible(&record, market, reliability_idx, gpus_idx) {
                continue;
            }
        }

        let source_id = id_idx
            .and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        observations.push(Observation { price, source_id });
    }

    Ok((observations, rows))
}

fn is_eligible(
    record: &StringRecord,
    market: &MarketConfig,
    reliability_idx: Option<usize>,
    gpus_idx: Option<usize>,
) -> bool {
    if let Some(r) = reliability_idx.and_then(|i| parse_f64(record.get(i))) {
        if r < market.min_reliability {
            return false;
        }
    }
    if let Some(g) = gpus_idx.and_then(|i| parse_f64(record.get(i))) {
        if g < f64::from(market.min_gpus) {
            return false;
        }
    }
    true
}

fn build_header_map(headers: &ByteRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = String::from_utf8_lossy(name);
            (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx)
        })
        .collect()
}

fn parse_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.trim().parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// In-memory store keyed by `(market id, date)`.
///
/// `insert` records a content hash at insertion time, mirroring the capture
/// hash of an on-disk snapshot. `replace_unrecorded` swaps content without
/// updating that hash, which is how a corrupted day looks to the verifier.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    days: BTreeMap<(String, NaiveDate), (Vec<Observation>, Option<String>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, market_id: &str, date: NaiveDate, prices: &[f64]) {
        let observations: Vec<Observation> = prices.iter().copied().map(Observation::new).collect();
        let hash = content_hash(&observations);
        self.days.insert((market_id.to_string(), date), (observations, Some(hash)));
    }

    pub fn replace_unrecorded(&mut self, market_id: &str, date: NaiveDate, prices: &[f64]) {
        let observations = prices.iter().copied().map(Observation::new).collect();
        let key = (market_id.to_string(), date);
        let recorded = self.days.get(&key).and_then(|(_, h)| h.clone());
        self.days.insert(key, (observations, recorded));
    }
}

impl ObservationStore for MemoryStore {
    fn read(&self, market: &MarketConfig, date: NaiveDate) -> Result<Option<DailyObservationSet>, AppError> {
        let Some((observations, _)) = self.days.get(&(market.id.clone(), date)) else {
            return Ok(None);
        };
        if observations.is_empty() {
            return Ok(None);
        }
        Ok(Some(DailyObservationSet {
            market_id: market.id.clone(),
            date,
            observations: observations.clone(),
            rows_read: observations.len(),
            rows_skipped: 0,
        }))
    }

    fn integrity(&self, market: &MarketConfig, date: NaiveDate) -> Result<IntegrityStatus, AppError> {
        let Some((observations, recorded)) = self.days.get(&(market.id.clone(), date)) else {
            return Ok(IntegrityStatus::Missing);
        };
        let Some(recorded) = recorded else {
            return Ok(IntegrityStatus::NoRecordedHash);
        };
        let actual = content_hash(observations);
        if &actual == recorded {
            Ok(IntegrityStatus::Verified)
        } else {
            Ok(IntegrityStatus::Tampered {
                recorded: recorded.clone(),
                actual,
            })
        }
    }
}

fn content_hash(observations: &[Observation]) -> String {
    let mut buf = String::new();
    for o in observations {
        buf.push_str(&o.price.to_string());
        buf.push('\n');
    }
    sha256_hex(buf.as_bytes())
}
