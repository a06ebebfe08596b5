//! SMOTE oversampling in the reduced feature space

use crate::error::{AstroturfError, Result};
use crate::synthetic::{
    append_rows, check_aligned, class_counts, class_indices, seeded_rng, squared_distance,
    ResampleResult, Sampler,
};
use ndarray::{Array1, Array2};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Each synthetic row lies on the segment between a minority row and one of
/// its `k` nearest same-class neighbours. A class with a single row has no
/// neighbours, so that row is duplicated instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Target minority/majority ratio
    sampling_strategy: f64,
    seed: Option<u64>,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Indices (into `rows`) of the `k` nearest neighbours of `rows[target]`, nearest first
    fn find_neighbors(x: &Array2<f64>, rows: &[usize], target: usize, k: usize) -> Vec<usize> {
        let point = x.row(rows[target]);
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, &row) in rows.iter().enumerate() {
            if i == target {
                continue;
            }
            let candidate = DistIdx(squared_distance(point, x.row(row)), i);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

/// Oversampling targets: every class is raised to `ceil(ratio × majority)` rows
pub(crate) fn oversampling_targets(
    counts: &BTreeMap<i64, usize>,
    ratio: f64,
) -> Result<BTreeMap<i64, usize>> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(AstroturfError::Config(format!(
            "oversampling ratio must be in (0, 1], got {}",
            ratio
        )));
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    let target = (max_count as f64 * ratio).ceil() as usize;

    Ok(counts
        .iter()
        .map(|(&class, &count)| (class, target.max(count)))
        .collect())
}

impl Sampler for SMOTE {
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
        let mut synthetic: Vec<(Array1<f64>, i64)> = Vec::new();
        let mut n_changed = BTreeMap::new();

        for (&class, &target_count) in targets {
            let rows = match indices.get(&class) {
                Some(rows) => rows,
                None => continue,
            };
            let n_to_generate = target_count.saturating_sub(rows.len());
            n_changed.insert(class, n_to_generate as isize);
            if n_to_generate == 0 {
                continue;
            }

            let k = self.k_neighbors.min(rows.len() - 1);
            if k == 0 {
                let row = x.row(rows[0]).to_owned();
                synthetic.extend(std::iter::repeat((row, class)).take(n_to_generate));
                continue;
            }

            let neighbors: Vec<Vec<usize>> = (0..rows.len())
                .into_par_iter()
                .map(|i| Self::find_neighbors(x, rows, i, k))
                .collect();

            for _ in 0..n_to_generate {
                let i = rng.gen_range(0..rows.len());
                let nn = neighbors[i][rng.gen_range(0..neighbors[i].len())];
                let gap: f64 = rng.gen();

                let base = x.row(rows[i]);
                let neighbor = x.row(rows[nn]);
                let sample = &base + &((&neighbor - &base) * gap);
                synthetic.push((sample, class));
            }
        }

        let (x_out, y_out) = append_rows(x, y, synthetic)?;
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

    fn imbalanced() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.2, 0.1],
            [0.1, 0.2],
            [0.3, 0.3],
            [5.0, 5.0],
            [5.5, 5.0],
        ];
        let y = array![0, 0, 0, 0, 0, 0, 1, 1];
        (x, y)
    }

    #[test]
    fn test_smote_balances_and_keeps_originals_first() {
        let (x, y) = imbalanced();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        assert_eq!(result.x.nrows(), 12);
        assert_eq!(class_counts(&result.y)[&1], 6);
        assert_eq!(result.x.slice(ndarray::s![..8, ..]), x);
        assert_eq!(result.n_changed[&1], 4);
    }

    #[test]
    fn test_synthetic_rows_lie_between_neighbours() {
        let (x, y) = imbalanced();
        let result = SMOTE::new().with_seed(1).fit_resample(&x, &y).unwrap();

        for row in result.x.rows().into_iter().skip(8) {
            assert!((5.0..=5.5).contains(&row[0]));
            assert!((row[1] - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_row_class_is_duplicated() {
        let x = array![[0.0], [1.0], [2.0], [9.0]];
        let y = array![0, 0, 0, 1];
        let result = SMOTE::new().with_seed(3).fit_resample(&x, &y).unwrap();

        assert_eq!(result.y.to_vec(), vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(result.x[[4, 0]], 9.0);
        assert_eq!(result.x[[5, 0]], 9.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = imbalanced();
        let a = SMOTE::new().with_seed(7).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(7).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_single_class() {
        let x = array![[0.0], [1.0]];
        let y = array![4, 4];
        assert!(matches!(
            SMOTE::new().fit(&x, &y),
            Err(AstroturfError::SingleClass { class: 4 })
        ));
    }

    #[test]
    fn test_duplicate_rows_are_still_neighbours() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [2.0, 2.0]];
        let rows = vec![0, 1, 2];
        assert_eq!(SMOTE::find_neighbors(&x, &rows, 0, 1), vec![1]);
    }
}
