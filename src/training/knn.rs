//! K-Nearest Neighbors classifier

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::config::ModelType;
use super::models::{check_fit_input, check_predict_input, unique_classes, Estimator};
use crate::error::{AstroturfError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// One minus cosine similarity
    Cosine,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    #[default]
    Uniform,
    /// Inverse distance
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Classifier
///
/// Stores the training rows; every prediction scans them with a bounded
/// max-heap, one query row per rayon task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    /// Training labels as indices into `classes`
    y_train: Vec<usize>,
    classes: Vec<i64>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    pub fn with_weights(mut self, weights: WeightScheme) -> Self {
        self.config.weights = weights;
        self
    }

    /// Weighted class shares of the nearest neighbors, `n_samples × n_classes`
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(AstroturfError::ModelNotFitted)?;
        check_predict_input(x, x_train.ncols())?;

        let k = self.config.n_neighbors.min(x_train.nrows());
        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, k, self.config.metric);
                self.class_shares(&neighbors)
            })
            .collect();

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, shares) in rows.into_iter().enumerate() {
            for (c, share) in shares.into_iter().enumerate() {
                proba[[i, c]] = share;
            }
        }
        Ok(proba)
    }

    fn class_shares(&self, neighbors: &[DistIdx]) -> Vec<f64> {
        let mut votes = vec![0.0; self.classes.len()];
        for neighbor in neighbors {
            let weight = match self.config.weights {
                WeightScheme::Uniform => 1.0,
                WeightScheme::Distance => 1.0 / (neighbor.0 + 1e-10),
            };
            votes[self.y_train[neighbor.1]] += weight;
        }
        let total: f64 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        votes
    }
}

impl Estimator for KNNClassifier {
    fn name(&self) -> String {
        ModelType::KNearestNeighbors.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_neighbors == 0 {
            return Err(AstroturfError::Config("n_neighbors must be positive".to_string()));
        }

        self.classes = unique_classes(y);
        self.y_train = y
            .iter()
            .map(|label| self.classes.binary_search(label).unwrap_or(0))
            .collect();
        self.x_train = Some(x.clone());
        Ok(())
    }

    /// Class with the largest vote; ties go to the smaller label
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

/// Max-heap entry: distance, then training row index
#[derive(PartialEq)]
struct DistIdx(f64, usize);

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

/// Keep the k smallest distances, O(n log k)
fn find_k_nearest(
    point: ArrayView1<'_, f64>,
    x_train: &Array2<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<DistIdx> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let candidate = DistIdx(compute_distance(point, row, metric), i);
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec()
}

fn compute_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Cosine => {
            let dot = a.dot(&b);
            let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
            if denom > 0.0 {
                1.0 - dot / denom
            } else {
                1.0
            }
        }
    }
}
