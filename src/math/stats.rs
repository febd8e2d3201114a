//! Descriptive statistics over price samples.
//!
//! All helpers are deterministic with respect to the *multiset* of inputs:
//! sums are accumulated over an ascending sort so that permuting the input
//! cannot change the floating point result. Verification relies on this.

use std::cmp::Ordering;

/// Sort a copy of `values` ascending using IEEE total ordering.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = sorted(values).iter().sum();
    Some(sum / values.len() as f64)
}

/// Sample standard deviation (Bessel-corrected, divisor `n - 1`).
///
/// `None` when fewer than two values are supplied.
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let mut sq: Vec<f64> = values.iter().map(|v| (v - m) * (v - m)).collect();
    sq.sort_by(f64::total_cmp);
    let ss: f64 = sq.iter().sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

/// Median; the mean of the two central values for even-length input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let s = sorted(values);
    let mid = s.len() / 2;
    if s.len() % 2 == 1 {
        Some(s[mid])
    } else {
        Some((s[mid - 1] + s[mid]) / 2.0)
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

/// Round to `dp` decimal places, half away from zero.
///
/// This is the only rounding rule used for published and audited values, so a
/// verifier that recomputes a value always lands on the same representation.
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let scale = 10f64.powi(dp);
    (value * scale).round() / scale
}

/// `round_dp(value, 4)`; the precision of every published figure.
pub fn round4(value: f64) -> f64 {
    round_dp(value, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_stdev_basic() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v).unwrap() - 5.0).abs() < 1e-12);
        // Population stdev is 2.0; sample stdev is sqrt(32/7).
        let s = sample_stdev(&v).unwrap();
        assert!((s - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn stdev_needs_two_values() {
        assert!(sample_stdev(&[]).is_none());
        assert!(sample_stdev(&[1.0]).is_none());
        assert_eq!(sample_stdev(&[3.0, 3.0]), Some(0.0));
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn mean_is_order_independent_bitwise() {
        let a = [0.1, 0.2, 0.3, 1e16, -1e16, 0.7];
        let b = [1e16, 0.7, 0.3, -1e16, 0.1, 0.2];
        assert_eq!(mean(&a).unwrap().to_bits(), mean(&b).unwrap().to_bits());
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_dp(2.5, 0), 3.0);
        assert_eq!(round_dp(-2.5, 0), -3.0);
        assert_eq!(round4(1.83404), 1.834);
        assert_eq!(round4(2.1), 2.1);
        assert_eq!(round_dp(0.00009999999999998899, 6), 0.0001);
    }

    #[test]
    fn min_max() {
        assert_eq!(min(&[3.0, -1.0, 2.0]), Some(-1.0));
        assert_eq!(max(&[3.0, -1.0, 2.0]), Some(3.0));
        assert_eq!(min(&[]), None);
    }
}
