//! JSON audit documents.
//!
//! One document per `(index, end date)` holding the complete
//! `CalculationResult`. Documents are never edited: a re-run for the same end
//! date is written next to the original as `...{end_date}.r{N}.audit.json`.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::CalculationResult;
use crate::error::AppError;

/// Path of the first audit document for `(slug, end_date)`.
pub fn audit_path(audit_dir: &Path, slug: &str, end_date: NaiveDate) -> PathBuf {
    audit_dir.join(format!("{slug}-{}.audit.json", end_date.format("%Y-%m-%d")))
}

fn revision_path(audit_dir: &Path, slug: &str, end_date: NaiveDate, revision: u32) -> PathBuf {
    if revision <= 1 {
        return audit_path(audit_dir, slug, end_date);
    }
    audit_dir.join(format!(
        "{slug}-{}.r{revision}.audit.json",
        end_date.format("%Y-%m-%d")
    ))
}

/// Write `result` as a new audit document and return its path.
pub fn write_audit(audit_dir: &Path, slug: &str, result: &CalculationResult) -> Result<PathBuf, AppError> {
    fs::create_dir_all(audit_dir)
        .map_err(|e| AppError::input(format!("Failed to create audit dir '{}': {e}", audit_dir.display())))?;

    let mut revision = 1u32;
    loop {
        let path = revision_path(audit_dir, slug, result.end_date, revision);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                serde_json::to_writer_pretty(file, result)
                    .map_err(|e| AppError::input(format!("Failed to write audit '{}': {e}", path.display())))?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => revision += 1,
            Err(e) => {
                return Err(AppError::input(format!(
                    "Failed to create audit '{}': {e}",
                    path.display()
                )));
            }
        }
    }
}

pub fn read_audit(path: &Path) -> Result<CalculationResult, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open audit '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::input(format!("Invalid audit JSON '{}': {e}", path.display())))
}
