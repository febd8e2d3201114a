//! Daily snapshot files and their companion metadata.
//!
//! A snapshot is `{date}.csv` plus `{date}.meta.json` inside a market's data
//! directory. The metadata records a SHA-256 over the exact CSV bytes, which
//! is what the verifier's integrity check compares against.
//!
//! Snapshots are append-only: `write_snapshot` refuses to replace an existing
//! date unless explicitly forced.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::{MarketConfig, Observation, METHODOLOGY_VERSION};
use crate::error::{AppError, exit};
use crate::math::{self, round4};

/// Columns written by the snapshot writer, in order.
pub const SNAPSHOT_COLUMNS: [&str; 3] = ["listing_id", "dph_per_gpu", "collected_utc"];

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn csv_path(market_dir: &Path, date: NaiveDate) -> PathBuf {
    market_dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
}

pub fn meta_path(market_dir: &Path, date: NaiveDate) -> PathBuf {
    market_dir.join(format!("{}.meta.json", date.format("%Y-%m-%d")))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub archive_sha256: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub stdev: Option<f64>,
    pub n: usize,
}

/// Companion metadata of one daily snapshot.
///
/// Only `provenance.sha256` is required by the engine; every other field is
/// informational and tolerated when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default)]
    pub ccir_version: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub collection_date: Option<String>,
    #[serde(default)]
    pub collected_utc: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub price_summary: Option<PriceSummary>,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub low_confidence: Option<bool>,
}

impl SnapshotMeta {
    pub fn recorded_sha256(&self) -> Option<&str> {
        self.provenance.sha256.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Read a snapshot's metadata.
///
/// A missing or malformed document degrades to `None`; it never aborts the
/// caller.
pub fn read_meta(path: &Path) -> Option<SnapshotMeta> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open snapshot metadata");
            return None;
        }
    };
    match serde_json::from_reader(file) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed snapshot metadata ignored");
            None
        }
    }
}

/// Result of a successful snapshot write.
#[derive(Debug, Clone)]
pub struct SnapshotReceipt {
    pub csv_path: PathBuf,
    pub meta_path: PathBuf,
    pub sha256: String,
    pub n_observations: usize,
}

/// Materialize one day's observations for `market` under `data_dir`.
///
/// Fails with exit code 5 if the date already exists and `force` is false.
pub fn write_snapshot(
    data_dir: &Path,
    market: &MarketConfig,
    date: NaiveDate,
    observations: &[Observation],
    force: bool,
) -> Result<SnapshotReceipt, AppError> {
    let market_dir = data_dir.join(&market.data_subdir);
    fs::create_dir_all(&market_dir).map_err(|e| {
        AppError::input(format!("Failed to create data dir '{}': {e}", market_dir.display()))
    })?;

    let csv_file = csv_path(&market_dir, date);
    if csv_file.exists() && !force {
        return Err(AppError::new(
            exit::DUPLICATE,
            format!(
                "Snapshot '{}' already exists; refusing to overwrite (use --force).",
                csv_file.display()
            ),
        ));
    }
    if csv_file.exists() {
        warn!(path = %csv_file.display(), "overwriting existing snapshot");
    }

    let collected = Utc::now().to_rfc3339();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(SNAPSHOT_COLUMNS)
        .map_err(|e| AppError::input(format!("Failed to encode snapshot header: {e}")))?;
    for obs in observations {
        let price = obs.price.to_string();
        writer
            .write_record([obs.source_id.as_deref().unwrap_or(""), price.as_str(), collected.as_str()])
            .map_err(|e| AppError::input(format!("Failed to encode snapshot row: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::input(format!("Failed to encode snapshot: {e}")))?;

    fs::write(&csv_file, &bytes)
        .map_err(|e| AppError::input(format!("Failed to write snapshot '{}': {e}", csv_file.display())))?;
    let sha256 = sha256_hex(&bytes);

    let prices: Vec<f64> = observations.iter().map(|o| o.price).collect();
    let meta = SnapshotMeta {
        ccir_version: Some(METHODOLOGY_VERSION.to_string()),
        index_name: Some(market.index_name.clone()),
        model_id: Some(market.id.clone()),
        collection_date: Some(date.format("%Y-%m-%d").to_string()),
        collected_utc: Some(collected),
        source: Some("import".to_string()),
        price_summary: Some(PriceSummary {
            min: math::min(&prices).map(round4),
            max: math::max(&prices).map(round4),
            mean: math::mean(&prices).map(round4),
            median: math::median(&prices).map(round4),
            stdev: math::sample_stdev(&prices).map(round4),
            n: prices.len(),
        }),
        provenance: Provenance {
            output_file: Some(csv_file.display().to_string()),
            sha256: Some(sha256.clone()),
            archive_sha256: None,
        },
        low_confidence: Some(prices.len() < 10),
    };

    let meta_file = meta_path(&market_dir, date);
    let file = File::create(&meta_file)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", meta_file.display())))?;
    serde_json::to_writer_pretty(file, &meta)
        .map_err(|e| AppError::input(format!("Failed to write snapshot metadata: {e}")))?;

    debug!(path = %csv_file.display(), %sha256, "snapshot hashed");
    info!(market = %market.id, %date, n = observations.len(), "snapshot written");

    Ok(SnapshotReceipt {
        csv_path: csv_file,
        meta_path: meta_file,
        sha256,
        n_observations: observations.len(),
    })
}

/// Read observations from a plain price file for `cri import`.
///
/// Accepts either a CSV with a `dph_per_gpu`/`price` column (and optional
/// `listing_id`) or one number per line. Unparseable lines are skipped.
pub fn read_price_file(path: &Path) -> Result<Vec<Observation>, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read '{}': {e}", path.display())))?;

    let first = text.lines().next().unwrap_or("").trim();
    let has_header = first.parse::<f64>().is_err();
    if !has_header {
        return Ok(text
            .lines()
            .filter_map(|l| l.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map(Observation::new)
            .collect());
    }

    let (observations, _) = super::store::parse_snapshot_csv(text.as_bytes(), None)?;
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketRegistry;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn write_records_hash_of_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let obs: Vec<Observation> = [1.8, 1.9, 2.0].iter().copied().map(Observation::new).collect();

        let receipt = write_snapshot(dir.path(), market, date(1), &obs, false).unwrap();
        let bytes = fs::read(&receipt.csv_path).unwrap();
        assert_eq!(sha256_hex(&bytes), receipt.sha256);

        let meta = read_meta(&receipt.meta_path).unwrap();
        assert_eq!(meta.recorded_sha256(), Some(receipt.sha256.as_str()));
        assert_eq!(meta.price_summary.unwrap().n, 3);
    }

    #[test]
    fn refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let reg = MarketRegistry::builtin();
        let market = reg.get("h100-sxm-us").unwrap();
        let obs = vec![Observation::new(2.0)];

        write_snapshot(dir.path(), market, date(2), &obs, false).unwrap();
        let err = write_snapshot(dir.path(), market, date(2), &obs, false).unwrap_err();
        assert_eq!(err.exit_code(), exit::DUPLICATE);
        assert!(write_snapshot(dir.path(), market, date(2), &obs, true).is_ok());
    }

    #[test]
    fn malformed_meta_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.meta.json");
        fs::write(&path, "{not json").unwrap();
        assert!(read_meta(&path).is_none());
        assert!(read_meta(&dir.path().join("absent.meta.json")).is_none());
    }

    #[test]
    fn price_file_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.txt");
        fs::write(&path, "1.5\n2.0\nabc\n\n2.5\n").unwrap();
        let obs = read_price_file(&path).unwrap();
        let prices: Vec<f64> = obs.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![1.5, 2.0, 2.5]);
    }
}
