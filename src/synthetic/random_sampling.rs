//! Random sampling methods

use super::smote::oversampling_targets;
use crate::error::{AstroturfError, Result};
use crate::synthetic::{
    append_rows, check_aligned, class_counts, class_indices, seeded_rng, select_rows,
    ResampleResult, Sampler,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Random oversampler (duplicates minority samples)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomOverSampler {
    /// Target minority/majority ratio
    sampling_strategy: f64,
    seed: Option<u64>,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl RandomOverSampler {
    pub fn new() -> Self {
        Self {
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for RandomOverSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomOverSampler {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_aligned(x, y)?;
        let counts = class_counts(y);
        if counts.len() < 2 {
            let class = counts.keys().next().copied().unwrap_or_default();
            return Err(AstroturfError::SingleClass { class });
        }
        self.target_counts = Some(oversampling_targets(&counts, self.sampling_strategy)?);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or(AstroturfError::ModelNotFitted)?;
        check_aligned(x, y)?;

        let mut rng = seeded_rng(self.seed);
        let indices = class_indices(y);
        let mut duplicates = Vec::new();
        let mut n_changed = BTreeMap::new();

        for (&class, &target_count) in targets {
            let rows = match indices.get(&class) {
                Some(rows) => rows,
                None => continue,
            };
            let n_to_add = target_count.saturating_sub(rows.len());
            n_changed.insert(class, n_to_add as isize);

            for _ in 0..n_to_add {
                let idx = rows[rng.gen_range(0..rows.len())];
                duplicates.push((x.row(idx).to_owned(), class));
            }
        }

        let (x_out, y_out) = append_rows(x, y, duplicates)?;
        Ok(ResampleResult {
            x: x_out,
            y: y_out,
            n_changed,
        })
    }
}

/// Random undersampler (removes majority samples)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomUnderSampler {
    /// Target minority/majority ratio after sampling
    sampling_strategy: f64,
    seed: Option<u64>,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl RandomUnderSampler {
    pub fn new() -> Self {
        Self {
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for RandomUnderSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomUnderSampler {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_aligned(x, y)?;
        let ratio = self.sampling_strategy;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(AstroturfError::Config(format!(
                "undersampling ratio must be in (0, 1], got {}",
                ratio
            )));
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            let class = counts.keys().next().copied().unwrap_or_default();
            return Err(AstroturfError::SingleClass { class });
        }

        let min_count = counts.values().copied().min().unwrap_or(0);
        let target = (min_count as f64 / ratio).floor() as usize;
        self.target_counts = Some(
            counts
                .iter()
                .map(|(&class, &count)| (class, target.min(count)))
                .collect(),
        );
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or(AstroturfError::ModelNotFitted)?;
        check_aligned(x, y)?;

        let mut rng = seeded_rng(self.seed);
        let mut keep: Vec<usize> = Vec::with_capacity(y.len());
        let mut n_changed = BTreeMap::new();

        for (class, rows) in class_indices(y) {
            let target = targets.get(&class).copied().unwrap_or(rows.len());
            n_changed.insert(class, target as isize - rows.len() as isize);
            if target >= rows.len() {
                keep.extend(rows);
            } else {
                keep.extend(rows.choose_multiple(&mut rng, target).copied());
            }
        }

        // Survivors keep their original relative order.
        keep.sort_unstable();
        let (x_out, y_out) = select_rows(x, y, &keep);
        Ok(ResampleResult {
            x: x_out,
            y: y_out,
            n_changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<i64>) {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [10.0]];
        let y = array![0, 0, 0, 0, 0, 1];
        (x, y)
    }

    #[test]
    fn test_random_oversampler() {
        let (x, y) = data();
        let result = RandomOverSampler::new().with_seed(42).fit_resample(&x, &y).unwrap();

        assert_eq!(result.y.len(), 10);
        assert_eq!(class_counts(&result.y)[&1], 5);
        for row in result.x.rows().into_iter().skip(6) {
            assert_eq!(row[0], 10.0);
        }
    }

    #[test]
    fn test_random_undersampler_keeps_order() {
        let (x, y) = data();
        let result = RandomUnderSampler::new().with_seed(42).fit_resample(&x, &y).unwrap();

        assert_eq!(result.y.to_vec(), vec![0, 1]);
        assert_eq!(result.x[[1, 0]], 10.0);
        assert_eq!(result.n_changed[&0], -4);
    }

    #[test]
    fn test_partial_ratio() {
        let (x, y) = data();
        let result = RandomUnderSampler::new()
            .with_sampling_strategy(0.5)
            .with_seed(1)
            .fit_resample(&x, &y)
            .unwrap();
        assert_eq!(class_counts(&result.y)[&0], 2);

        let result = RandomOverSampler::new()
            .with_sampling_strategy(0.5)
            .with_seed(1)
            .fit_resample(&x, &y)
            .unwrap();
        assert_eq!(class_counts(&result.y)[&1], 3);
    }

    #[test]
    fn test_invalid_ratio() {
        let (x, y) = data();
        assert!(matches!(
            RandomUnderSampler::new().with_sampling_strategy(0.0).fit(&x, &y),
            Err(AstroturfError::Config(_))
        ));
    }
}
