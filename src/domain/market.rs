//! Market configuration and registry.
//!
//! One `MarketConfig` describes a hardware-model market: which index it feeds,
//! where its daily snapshots live, and the eligibility thresholds applied to
//! individual listings. All markets share a single aggregation code path.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Stable identifier, e.g. `h100-sxm-us`.
    pub id: String,
    /// Published index name, e.g. `CRI-H100`.
    pub index_name: String,
    /// Sub-directory of the data dir holding this market's snapshots.
    pub data_subdir: String,
    #[serde(default)]
    pub gpu_name: String,
    #[serde(default)]
    pub geography: String,
    /// Listings with a recorded reliability below this are ignored.
    #[serde(default)]
    pub min_reliability: f64,
    /// Listings offering fewer GPUs than this are ignored.
    #[serde(default)]
    pub min_gpus: u32,
    #[serde(default)]
    pub primary: bool,
}

impl MarketConfig {
    fn us(id: &str, index_name: &str, gpu_name: &str, primary: bool) -> Self {
        Self {
            id: id.to_string(),
            index_name: index_name.to_string(),
            data_subdir: id.to_string(),
            gpu_name: gpu_name.to_string(),
            geography: "US".to_string(),
            min_reliability: 0.90,
            min_gpus: 1,
            primary,
        }
    }

    /// File-name stem for this index's outputs (`CRI-H100` -> `cri-h100`).
    pub fn slug(&self) -> String {
        self.index_name.to_lowercase().replace(' ', "-")
    }
}

#[derive(Debug, Clone)]
pub struct MarketRegistry {
    markets: BTreeMap<String, MarketConfig>,
}

impl MarketRegistry {
    /// The built-in US GPU markets.
    pub fn builtin() -> Self {
        Self::from_markets(vec![
            MarketConfig::us("h100-sxm-us", "CRI-H100", "H100 SXM", true),
            MarketConfig::us("a100-sxm-us", "CRI-A100", "A100 SXM", false),
            MarketConfig::us("a100-pcie-us", "CRI-A100-PCIe", "A100 PCIE", false),
            MarketConfig::us("h200-us", "CRI-H200", "H200", false),
            MarketConfig::us("h200-nvl-us", "CRI-H200-NVL", "H200 NVL", false),
            MarketConfig::us("h100-pcie-us", "CRI-H100-PCIe", "H100 PCIE", false),
            MarketConfig::us("v100-us", "CRI-V100", "Tesla V100", false),
            MarketConfig::us("l40s-us", "CRI-L40S", "L40S", false),
            MarketConfig::us("rtx4090-us", "CRI-4090", "RTX 4090", false),
        ])
    }

    pub fn from_markets(markets: Vec<MarketConfig>) -> Self {
        Self {
            markets: markets.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// Load a registry from a JSON array of market objects.
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::input(format!("Failed to open market registry '{}': {e}", path.display()))
        })?;
        let markets: Vec<MarketConfig> = serde_json::from_reader(file)
            .map_err(|e| AppError::input(format!("Invalid market registry '{}': {e}", path.display())))?;
        if markets.is_empty() {
            return Err(AppError::input(format!(
                "Market registry '{}' defines no markets.",
                path.display()
            )));
        }
        Ok(Self::from_markets(markets))
    }

    pub fn get(&self, id: &str) -> Result<&MarketConfig, AppError> {
        self.markets.get(id).ok_or_else(|| {
            let known: Vec<&str> = self.markets.keys().map(String::as_str).collect();
            AppError::input(format!("Unknown market '{id}'. Known markets: {}", known.join(", ")))
        })
    }

    /// The market flagged `primary`, falling back to the first by id.
    pub fn primary(&self) -> Option<&MarketConfig> {
        self.markets
            .values()
            .find(|m| m.primary)
            .or_else(|| self.markets.values().next())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketConfig> {
        self.markets.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_primary_h100() {
        let reg = MarketRegistry::builtin();
        let primary = reg.primary().unwrap();
        assert_eq!(primary.id, "h100-sxm-us");
        assert_eq!(primary.slug(), "cri-h100");
        assert_eq!(reg.iter().count(), 9);
    }

    #[test]
    fn unknown_market_lists_known_ids() {
        let reg = MarketRegistry::builtin();
        let err = reg.get("tpu-v5").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("h100-sxm-us"));
    }

    #[test]
    fn registry_from_json_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.json");
        std::fs::write(
            &path,
            r#"[{"id": "mi300x-eu", "index_name": "CRI-MI300X", "data_subdir": "mi300x"}]"#,
        )
        .unwrap();

        let reg = MarketRegistry::from_json_file(&path).unwrap();
        let m = reg.get("mi300x-eu").unwrap();
        assert_eq!(m.data_subdir, "mi300x");
        assert_eq!(m.min_gpus, 0);
        assert_eq!(m.min_reliability, 0.0);
    }
}
