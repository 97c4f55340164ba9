//! Probability normalization for sibling cohorts.
//!
//! Synthesis models return weights that rarely sum to exactly 1; every
//! sibling cohort is rescaled before children are installed in the tree.

/// Tolerance on sibling probability sums, after normalization.
pub const SIBLING_SUM_TOLERANCE: f64 = 1e-3;

/// Scale `weights` so they sum to 1.
///
/// All-zero input is distributed equally (`1/k` each); otherwise each weight
/// is divided by the total. Empty input is left untouched.
pub fn normalize(weights: &mut [f64]) {
    if weights.is_empty() {
        return;
    }
    let sum: f64 = weights.iter().sum();
    if sum == 0.0 {
        let equal = 1.0 / weights.len() as f64;
        for w in weights.iter_mut() {
            *w = equal;
        }
    } else {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

/// Whether `weights` sum to 1 within `tolerance`.
pub fn is_normalized(weights: &[f64], tolerance: f64) -> bool {
    let sum: f64 = weights.iter().sum();
    (sum - 1.0).abs() <= tolerance
}
