//! Trimmed-mean / sigma outlier filter.
//!
//! One pass, non-iterative:
//!
//! 1. below `min_sample` observations the input is returned unchanged
//! 2. trimmed mean after dropping `max(1, floor(trim_fraction * n))` values per tail
//! 3. sample standard deviation of the *untrimmed* set
//! 4. zero dispersion returns the input unchanged
//! 5. keep `|x - trimmed_mean| <= sigma * stdev`
//!
//! The outcome depends only on the multiset of inputs and the parameters.

use crate::domain::Methodology;
use crate::math;

/// Filter parameters, usually taken from a `Methodology`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilter {
    pub sigma: f64,
    pub trim_fraction: f64,
    pub min_sample: usize,
}

/// Survivors (in input order) plus the number removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub kept: Vec<f64>,
    pub removed: usize,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            sigma: 2.5,
            trim_fraction: 0.10,
            min_sample: 4,
        }
    }
}

impl OutlierFilter {
    pub fn from_methodology(m: &Methodology) -> Self {
        Self {
            sigma: m.outlier_sigma,
            trim_fraction: m.trim_fraction,
            min_sample: m.min_filter_sample,
        }
    }

    pub fn clean(&self, observations: &[f64]) -> Cleaned {
        let n = observations.len();
        let unchanged = || Cleaned {
            kept: observations.to_vec(),
            removed: 0,
        };

        if n < self.min_sample.max(3) {
            return unchanged();
        }

        let sorted = math::sorted(observations);
        let trim_n = ((self.trim_fraction * n as f64).floor() as usize).max(1);
        if 2 * trim_n >= n {
            return unchanged();
        }
        let Some(trimmed_mean) = math::mean(&sorted[trim_n..n - trim_n]) else {
            return unchanged();
        };
        let Some(stdev) = math::sample_stdev(observations) else {
            return unchanged();
        };
        if stdev == 0.0 {
            return unchanged();
        }

        let threshold = self.sigma * stdev;
        let kept: Vec<f64> = observations
            .iter()
            .copied()
            .filter(|x| (x - trimmed_mean).abs() <= threshold)
            .collect();
        let removed = n - kept.len();
        Cleaned { kept, removed }
    }
}

/// `clean` with the default trim fraction and minimum sample.
pub fn clean(observations: &[f64], sigma: f64) -> Cleaned {
    OutlierFilter {
        sigma,
        ..OutlierFilter::default()
    }
    .clean(observations)
}
