//! Runtime settings resolved from the environment (`.env` supported).
//!
//! | variable         | default   | meaning                                 |
//! |------------------|-----------|-----------------------------------------|
//! | `CRI_DATA_DIR`   | `data`    | root of the daily snapshot store        |
//! | `CRI_OUTPUT_DIR` | `outputs` | published series and audit documents    |
//! | `CRI_MARKETS`    | (unset)   | JSON market registry replacing builtins |
//!
//! CLI flags take precedence over every variable.

use std::path::{Path, PathBuf};

use crate::domain::{MarketConfig, MarketRegistry};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub markets_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
            markets_file: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            data_dir: non_empty("CRI_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            output_dir: non_empty("CRI_OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            markets_file: non_empty("CRI_MARKETS").map(PathBuf::from),
        }
    }

    /// Apply CLI overrides.
    pub fn with_overrides(mut self, data_dir: Option<&Path>, output_dir: Option<&Path>) -> Self {
        if let Some(d) = data_dir {
            self.data_dir = d.to_path_buf();
        }
        if let Some(o) = output_dir {
            self.output_dir = o.to_path_buf();
        }
        self
    }

    pub fn registry(&self) -> Result<MarketRegistry, AppError> {
        match &self.markets_file {
            Some(path) => MarketRegistry::from_json_file(path),
            None => Ok(MarketRegistry::builtin()),
        }
    }

    /// `{output_dir}/{slug}-index.csv`
    pub fn series_path(&self, market: &MarketConfig) -> PathBuf {
        self.output_dir.join(format!("{}-index.csv", market.slug()))
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.output_dir.join("audits")
    }
}
