//! Estimator trait and evaluation metrics

use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metrics for a classifier scored on held-out rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    /// Precision of the positive class (binary) or macro average (multi-class)
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Training time in seconds
    pub training_time_secs: f64,
    /// Number of features
    pub n_features: usize,
    /// Number of scored samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute classification metrics.
    ///
    /// With two classes the larger label is the positive class; with more,
    /// precision/recall/F1 are macro-averaged over every observed label.
    pub fn compute_classification(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(AstroturfError::Shape {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(AstroturfError::EmptyInput("no rows to score".to_string()));
        }

        let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
        let accuracy = correct as f64 / y_true.len() as f64;

        let labels: BTreeSet<i64> = y_true.iter().chain(y_pred.iter()).copied().collect();
        let (precision, recall, f1_score) = if labels.len() <= 2 {
            let positive = labels.iter().next_back().copied().unwrap_or(1);
            Self::per_class(y_true, y_pred, positive)
        } else {
            let scores: Vec<(f64, f64, f64)> = labels
                .iter()
                .map(|&label| Self::per_class(y_true, y_pred, label))
                .collect();
            let n = scores.len() as f64;
            (
                scores.iter().map(|s| s.0).sum::<f64>() / n,
                scores.iter().map(|s| s.1).sum::<f64>() / n,
                scores.iter().map(|s| s.2).sum::<f64>() / n,
            )
        };

        Ok(Self {
            accuracy,
            precision,
            recall,
            f1_score,
            training_time_secs: 0.0,
            n_features: 0,
            n_samples: y_true.len(),
        })
    }

    fn per_class(y_true: &Array1<i64>, y_pred: &Array1<i64>, positive: i64) -> (f64, f64, f64) {
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == positive, p == positive) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }

        let precision = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
        let recall = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        (precision, recall, f1)
    }

    pub fn is_finite(&self) -> bool {
        [self.accuracy, self.precision, self.recall, self.f1_score]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// A pluggable classifier trained by the model harness
pub trait Estimator: EstimatorClone + Send + Sync {
    /// Name used in score reports and artifact paths
    fn name(&self) -> String;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>>;

    /// Score predictions on `(x, y)`
    fn score(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ModelMetrics> {
        let y_pred = self.predict(x)?;
        let mut metrics = ModelMetrics::compute_classification(y, &y_pred)?;
        metrics.n_features = x.ncols();
        Ok(metrics)
    }

    /// Serialized fitted state
    fn to_json(&self) -> Result<serde_json::Value>;
}

/// Object-safe cloning for boxed estimators
pub trait EstimatorClone {
    fn clone_box(&self) -> Box<dyn Estimator>;
}

impl<T> EstimatorClone for T
where
    T: 'static + Estimator + Clone,
{
    fn clone_box(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Estimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for dyn Estimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Estimator({})", self.name())
    }
}

/// Check `(x, y)` shapes before fitting
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AstroturfError::Shape {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(AstroturfError::EmptyInput("no training rows".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(AstroturfError::Validation(
            "training matrix contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Check the column count at prediction time
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(AstroturfError::Shape {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Sorted distinct labels
pub(crate) fn unique_classes(y: &Array1<i64>) -> Vec<i64> {
    y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binary_metrics() {
        let y_true = array![1, 0, 1, 1, 0, 1, 0, 0];
        let y_pred = array![1, 0, 1, 0, 0, 1, 1, 0];

        let metrics = ModelMetrics::compute_classification(&y_true, &y_pred).unwrap();
        assert_eq!(metrics.accuracy, 0.75);
        assert_eq!(metrics.precision, 0.75);
        assert_eq!(metrics.recall, 0.75);
        assert!((metrics.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_multiclass_macro_average() {
        let y_true = array![0, 1, 2, 2];
        let y_pred = array![0, 1, 2, 1];
        let metrics = ModelMetrics::compute_classification(&y_true, &y_pred).unwrap();
        // precision: 1, 0.5, 1 → 2.5 / 3
        assert!((metrics.precision - 2.5 / 3.0).abs() < 1e-12);
        // recall: 1, 1, 0.5 → 2.5 / 3
        assert!((metrics.recall - 2.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ModelMetrics::compute_classification(&array![0, 1], &array![0]).is_err());
    }

    #[test]
    fn test_check_fit_input_rejects_nan() {
        let x = array![[1.0, f64::NAN]];
        assert!(matches!(
            check_fit_input(&x, &array![0]),
            Err(AstroturfError::Validation(_))
        ));
    }
}
