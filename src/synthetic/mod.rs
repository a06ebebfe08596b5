//! Class rebalancing by resampling
//!
//! - SMOTE (Synthetic Minority Over-sampling Technique)
//! - Random oversampling
//! - Random undersampling
//! - [`ClassBalancer`], the pipeline stage choosing between them

mod balancer;
mod random_sampling;
mod smote;

pub use balancer::ClassBalancer;
pub use random_sampling::{RandomOverSampler, RandomUnderSampler};
pub use smote::SMOTE;

use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Resampled features
    pub x: Array2<f64>,
    /// Resampled labels
    pub y: Array1<i64>,
    /// Rows added (positive) or removed (negative) per class, in class order
    pub n_changed: BTreeMap<i64, isize>,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Compute the per-class target counts for `y`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    /// Resample data towards the fitted targets
    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult>;

    /// Fit and resample in one step
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Get class distribution, sorted by label
pub fn class_counts(y: &Array1<i64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Get row indices for each class, sorted by label
pub fn class_indices(y: &Array1<i64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_insert_with(Vec::new).push(i);
    }
    indices
}

/// Minority/majority count ratio of a label vector (0 for fewer than two classes)
pub fn imbalance_ratio(y: &Array1<i64>) -> f64 {
    let counts = class_counts(y);
    match (counts.values().min(), counts.values().max()) {
        (Some(&min), Some(&max)) if counts.len() > 1 && max > 0 => min as f64 / max as f64,
        _ => 0.0,
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

pub(crate) fn check_aligned(x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AstroturfError::Shape {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }
    Ok(())
}

/// Original rows followed by `extra` rows
pub(crate) fn append_rows(
    x: &Array2<f64>,
    y: &Array1<i64>,
    extra: Vec<(Array1<f64>, i64)>,
) -> Result<(Array2<f64>, Array1<i64>)> {
    let mut all_x = x.clone();
    let mut all_y = y.to_vec();
    for (row, label) in extra {
        all_x.push_row(row.view())?;
        all_y.push(label);
    }
    Ok((all_x, Array1::from_vec(all_y)))
}

/// Keep only `rows` (in the given order)
pub(crate) fn select_rows(x: &Array2<f64>, y: &Array1<i64>, rows: &[usize]) -> (Array2<f64>, Array1<i64>) {
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

pub(crate) fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi) * (ai - bi)).sum()
}
