//! Versioned methodology parameters.
//!
//! Calculation and verification both consume one `Methodology` value. Every
//! `CalculationResult` records the version and the parameters it was computed
//! with, so a verifier can detect that it is running a different methodology
//! than the one a value was published under.

use serde::{Deserialize, Serialize};

/// Current methodology version string.
pub const METHODOLOGY_VERSION: &str = "1.1.0";

/// Longest trailing window accepted for calculation or verification.
pub const MAX_WINDOW_DAYS: u32 = 366;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Methodology {
    pub version: String,
    /// Outlier threshold in units of the sample standard deviation.
    pub outlier_sigma: f64,
    /// Trailing window length in calendar days (inclusive of the end date).
    pub window_days: u32,
    /// A day with fewer raw observations than this is not admitted.
    pub min_observations_per_day: usize,
    /// Fewer valid days than this marks the result low-confidence.
    pub min_valid_days: usize,
    /// Fraction trimmed from each tail when computing the trimmed mean.
    pub trim_fraction: f64,
    /// Below this sample size the outlier filter is the identity.
    pub min_filter_sample: usize,
}

impl Methodology {
    /// Methodology v1.1: 2.5 sigma, 7-day window, 10 obs/day, 3 valid days.
    pub fn v1_1() -> Self {
        Self {
            version: METHODOLOGY_VERSION.to_string(),
            outlier_sigma: 2.5,
            window_days: 7,
            min_observations_per_day: 10,
            min_valid_days: 3,
            trim_fraction: 0.10,
            min_filter_sample: 4,
        }
    }

    pub fn with_window(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    pub fn with_min_valid_days(mut self, min_valid_days: usize) -> Self {
        self.min_valid_days = min_valid_days;
        self
    }

    pub fn with_min_observations_per_day(mut self, min_obs: usize) -> Self {
        self.min_observations_per_day = min_obs;
        self
    }

    /// Human-readable one-liner stored in audit documents.
    pub fn describe(&self) -> String {
        format!(
            "Trailing {}-day median $/GPU-hour, outlier removal at {} sigma. Methodology v{}.",
            self.window_days, self.outlier_sigma, self.version
        )
    }

    /// The subset of parameters recorded on each result.
    pub fn parameters(&self) -> MethodologyParams {
        MethodologyParams {
            outlier_sigma: self.outlier_sigma,
            min_observations_per_day: self.min_observations_per_day,
            min_valid_days: self.min_valid_days,
            trim_fraction: self.trim_fraction,
        }
    }
}

impl Default for Methodology {
    fn default() -> Self {
        Self::v1_1()
    }
}

/// Admission and outlier parameters as recorded in an audit document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyParams {
    pub outlier_sigma: f64,
    pub min_observations_per_day: usize,
    pub min_valid_days: usize,
    pub trim_fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_1_defaults() {
        let m = Methodology::default();
        assert_eq!(m.version, "1.1.0");
        assert_eq!(m.window_days, 7);
        assert_eq!(m.min_observations_per_day, 10);
        assert_eq!(m.min_valid_days, 3);
        assert_eq!(m.outlier_sigma, 2.5);
    }

    #[test]
    fn describe_mentions_window_and_sigma() {
        let d = Methodology::v1_1().with_window(14).describe();
        assert!(d.contains("14-day"));
        assert!(d.contains("2.5 sigma"));
        assert!(d.contains("v1.1.0"));
    }
}
