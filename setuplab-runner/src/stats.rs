//! Small-sample statistics used by the metrics aggregator.
//!
//! Pure functions over slices. Empty input always yields a neutral value,
//! never NaN.

use serde::{Deserialize, Serialize};
use setuplab_core::round_dp;

/// Two-sided 95% normal quantile.
pub const Z_95: f64 = 1.96;

/// Confidence interval for a proportion, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilsonInterval {
    pub sample_size: usize,
    pub point_pct: f64,
    pub lower_pct: f64,
    pub upper_pct: f64,
}

impl WilsonInterval {
    /// No information: the whole `[0, 100]` range.
    pub fn empty() -> Self {
        Self {
            sample_size: 0,
            point_pct: 0.0,
            lower_pct: 0.0,
            upper_pct: 100.0,
        }
    }
}

/// Wilson score interval for `successes / sample_size` at 95% confidence.
pub fn wilson_interval(successes: usize, sample_size: usize) -> WilsonInterval {
    if sample_size == 0 {
        return WilsonInterval::empty();
    }
    let n = sample_size as f64;
    let p = successes as f64 / n;
    let z2 = Z_95 * Z_95;
    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = Z_95 * ((p * (1.0 - p) / n) + z2 / (4.0 * n * n)).sqrt() / denominator;

    WilsonInterval {
        sample_size,
        point_pct: round_dp(p * 100.0, 2),
        lower_pct: round_dp(((center - margin) * 100.0).max(0.0), 2),
        upper_pct: round_dp(((center + margin) * 100.0).min(100.0), 2),
    }
}

/// `part / total` as a percentage rounded to 2 places; 0 when `total` is 0.
pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_dp(part as f64 / total as f64 * 100.0, 2)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). 0 for fewer than 2 values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.max(0.0).sqrt()
}

/// One-sided normal lower bound on the mean: `mean - 1.96 * sd / sqrt(n)`.
///
/// A single value is its own bound; an empty sample is 0.
pub fn mean_lower_bound(values: &[f64]) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        n => mean(values) - Z_95 * sample_std_dev(values) / (n as f64).sqrt(),
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
