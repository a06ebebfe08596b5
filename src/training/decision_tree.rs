//! Decision tree classifier (Gini impurity)

use super::config::ModelType;
use super::models::{check_fit_input, check_predict_input, unique_classes, Estimator};
use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf with per-class training counts
    Leaf {
        class_idx: usize,
        counts: Vec<usize>,
    },
    /// Internal node; rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features sampled at each split; `None` scans every feature
    pub max_features: Option<usize>,
    pub random_state: u64,
    n_features: usize,
    classes: Vec<i64>,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoded training view shared by the recursive builder
struct Encoded<'a> {
    x: &'a Array2<f64>,
    labels: &'a [usize],
    n_classes: usize,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Most frequent class; ties go to the lowest index
fn majority(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
        .0
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 42,
            n_features: 0,
            classes: Vec::new(),
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Grow the tree on `rows` of `x`, whose labels are indices into `classes`.
    ///
    /// `rows` may repeat indices (bootstrap samples).
    pub(crate) fn fit_encoded(
        &mut self,
        x: &Array2<f64>,
        labels: &[usize],
        classes: Vec<i64>,
        rows: Vec<usize>,
    ) -> Result<()> {
        if rows.is_empty() {
            return Err(AstroturfError::EmptyInput("no rows to grow a tree on".to_string()));
        }

        let data = Encoded {
            x,
            labels,
            n_classes: classes.len(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut importances = vec![0.0; x.ncols()];

        let root = self.build(&data, rows, 0, &mut rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|imp| *imp /= total);
        }

        self.n_features = x.ncols();
        self.classes = classes;
        self.feature_importances = Some(Array1::from_vec(importances));
        self.root = Some(root);
        Ok(())
    }

    fn class_counts(data: &Encoded<'_>, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; data.n_classes];
        for &r in rows {
            counts[data.labels[r]] += 1;
        }
        counts
    }

    fn build(
        &self,
        data: &Encoded<'_>,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = rows.len();
        let counts = Self::class_counts(data, &rows);
        let impurity = gini(&counts, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity == 0.0;

        let leaf = |counts: Vec<usize>| TreeNode::Leaf {
            class_idx: majority(&counts),
            counts,
        };
        if should_stop {
            return leaf(counts);
        }

        let features = self.candidate_features(data.x.ncols(), rng);
        let Some((feature_idx, threshold, gain)) = self.best_split(data, &rows, &features, impurity)
        else {
            return leaf(counts);
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| data.x[[r, feature_idx]] <= threshold);

        importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build(data, left_rows, depth + 1, rng, importances));
        let right = Box::new(self.build(data, right_rows, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..n_features).collect();
        match self.max_features {
            Some(m) if m < n_features => {
                features.shuffle(rng);
                features.truncate(m.max(1));
                features.sort_unstable();
                features
            }
            _ => features,
        }
    }

    /// Sort each candidate feature once and sweep the thresholds, keeping
    /// running class counts on each side.
    fn best_split(
        &self,
        data: &Encoded<'_>,
        rows: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, f64)> {
        let n = rows.len();
        let total_counts = Self::class_counts(data, rows);

        features
            .par_iter()
            .filter_map(|&feature_idx| {
                let mut column: Vec<(f64, usize)> = rows
                    .iter()
                    .map(|&r| (data.x[[r, feature_idx]], data.labels[r]))
                    .collect();
                column.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = vec![0usize; data.n_classes];
                let mut best: Option<(f64, f64)> = None;

                for i in 0..n - 1 {
                    left[column[i].1] += 1;
                    let n_left = i + 1;
                    let n_right = n - n_left;

                    if column[i].0 == column[i + 1].0
                        || n_left < self.min_samples_leaf
                        || n_right < self.min_samples_leaf
                    {
                        continue;
                    }

                    let right: Vec<usize> = total_counts
                        .iter()
                        .zip(left.iter())
                        .map(|(t, l)| t - l)
                        .collect();
                    let weighted = (n_left as f64 * gini(&left, n_left)
                        + n_right as f64 * gini(&right, n_right))
                        / n as f64;
                    let gain = parent_impurity - weighted;

                    if gain > best.map_or(1e-12, |b| b.1) {
                        best = Some(((column[i].0 + column[i + 1].0) / 2.0, gain));
                    }
                }

                best.map(|(threshold, gain)| (feature_idx, threshold, gain))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .max_by(|a, b| a.2.total_cmp(&b.2).then(b.0.cmp(&a.0)))
    }

    fn leaf_for<'a>(&'a self, sample: ArrayView1<'_, f64>) -> Option<&'a TreeNode> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                TreeNode::Leaf { .. } => return Some(node),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    /// Predicted class index per row, into the class list the tree was grown with
    pub(crate) fn predict_encoded(&self, x: &Array2<f64>) -> Result<Vec<usize>> {
        if self.root.is_none() {
            return Err(AstroturfError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| match self.leaf_for(row) {
                Some(TreeNode::Leaf { class_idx, .. }) => *class_idx,
                _ => 0,
            })
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

/// Map labels onto indices into the sorted class list
pub(crate) fn encode_labels(y: &Array1<i64>) -> (Vec<i64>, Vec<usize>) {
    let classes = unique_classes(y);
    let labels = y
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or(0))
        .collect();
    (classes, labels)
}

impl Estimator for DecisionTree {
    fn name(&self) -> String {
        ModelType::DecisionTree.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (classes, labels) = encode_labels(y);
        self.fit_encoded(x, &labels, classes, (0..x.nrows()).collect())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let encoded = self.predict_encoded(x)?;
        Ok(encoded.into_iter().map(|c| self.classes[c]).collect())
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[1.0, 1.0], [1.5, 1.2], [2.0, 1.1], [6.0, 5.0], [7.0, 6.0], [8.0, 5.5]];
        let y = array![0, 0, 0, 1, 1, 1];

        let mut tree = DecisionTree::new().with_max_depth(3);
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.get_depth(), 2);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let x = array![[1.0], [2.0], [4.0], [5.0]];
        let y = array![3, 3, 9, 9];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[2.9], [3.1]]).unwrap(), array![3, 9]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        // XOR needs depth 2
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0, 1, 1, 0];

        let mut stump = DecisionTree::new().with_max_depth(1);
        stump.fit(&x, &y).unwrap();
        assert!(stump.get_depth() <= 2);

        let mut deep = DecisionTree::new();
        deep.fit(&x, &y).unwrap();
        assert!(deep.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances_sum_to_one() {
        let x = array![[1.0, 9.0], [2.0, 3.0], [3.0, 7.0], [10.0, 2.0], [11.0, 8.0], [12.0, 1.0]];
        let y = array![0, 0, 0, 1, 1, 1];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_predict_wrong_width() {
        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0], [1.0]], &array![0, 1]).unwrap();
        assert!(matches!(
            tree.predict(&array![[0.0, 1.0]]),
            Err(AstroturfError::Shape { .. })
        ));
    }
}
