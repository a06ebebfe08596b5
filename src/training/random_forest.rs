//! Random Forest classifier

use super::config::ModelType;
use super::decision_tree::{encode_labels, DecisionTree};
use super::models::{check_fit_input, check_predict_input, Estimator};
use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Features sampled per split (sqrt by default)
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    n_features: usize,
    classes: Vec<i64>,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
            n_features: 0,
            classes: Vec::new(),
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    /// Share of trees voting for each class, `n_samples × n_classes`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(AstroturfError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let votes: Vec<Vec<usize>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_encoded(x))
            .collect::<Result<_>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for tree_votes in &votes {
            for (i, &c) in tree_votes.iter().enumerate() {
                proba[[i, c]] += 1.0;
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> String {
        ModelType::RandomForest.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(AstroturfError::Config("n_estimators must be positive".to_string()));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = self.compute_max_features(n_features);
        let (classes, labels) = encode_labels(y);

        // Each tree gets its own seed so results do not depend on thread scheduling
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| {
                let seed = self.random_state.wrapping_add(i as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let rows: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = DecisionTree::new()
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(rng.gen());
                if let Some(depth) = self.max_depth {
                    tree = tree.with_max_depth(depth);
                }
                tree.fit_encoded(x, &labels, classes.clone(), rows)?;
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        let mut importances = Array1::<f64>::zeros(n_features);
        for tree in &trees {
            if let Some(imp) = tree.feature_importances() {
                importances += imp;
            }
        }
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }

        self.trees = trees;
        self.n_features = n_features;
        self.classes = classes;
        self.feature_importances = Some(importances);
        Ok(())
    }

    /// Majority vote; ties go to the smaller label
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
                self.classes[best.0]
            })
            .collect())
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [1.0, 2.0, 0.5],
            [1.5, 1.8, 0.4],
            [1.2, 2.2, 0.6],
            [0.9, 1.9, 0.5],
            [8.0, 8.0, 5.0],
            [8.5, 7.5, 5.2],
            [7.8, 8.2, 4.9],
            [8.1, 7.9, 5.1],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_classifier() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(15).with_random_state(7);
        forest.fit(&x, &y).unwrap();

        assert_eq!(forest.n_trees(), 15);
        assert_eq!(forest.predict(&array![[1.1, 2.0, 0.5], [8.2, 8.0, 5.0]]).unwrap(), array![0, 1]);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(10);
        forest.fit(&x, &y).unwrap();

        let proba = forest.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (8, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = blobs();
        let mut a = RandomForest::new(8).with_random_state(3);
        let mut b = RandomForest::new(8).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }
}
