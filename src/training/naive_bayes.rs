//! Gaussian Naive Bayes for continuous features.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::config::ModelType;
use super::models::{check_fit_input, check_predict_input, unique_classes, Estimator};
use crate::error::{AstroturfError, Result};

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Sorted class labels; row `i` of `means`/`variances` belongs to `classes[i]`
    classes: Vec<i64>,
    means: Array2<f64>,
    variances: Array2<f64>,
    log_priors: Vec<f64>,
    /// Fraction of the largest feature variance added to every variance
    var_smoothing: f64,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            log_priors: Vec::new(),
            var_smoothing: 1e-9,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Joint log likelihood, normalized per row with log-sum-exp
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(AstroturfError::ModelNotFitted);
        }
        check_predict_input(x, self.means.ncols())?;

        let mut log_probs = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            for c in 0..self.classes.len() {
                let log_likelihood: f64 = row
                    .iter()
                    .zip(self.means.row(c).iter())
                    .zip(self.variances.row(c).iter())
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                log_probs[[i, c]] = self.log_priors[c] + log_likelihood;
            }
        }

        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - max_val - log_sum);
        }

        Ok(log_probs)
    }
}

impl Estimator for GaussianNaiveBayes {
    fn name(&self) -> String {
        ModelType::GaussianNaiveBayes.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_features = x.ncols();
        let classes = unique_classes(y);

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0)
                .iter()
                .cloned()
                .fold(0.0_f64, f64::max)
                .max(f64::MIN_POSITIVE);

        let mut means = Array2::zeros((classes.len(), n_features));
        let mut variances = Array2::zeros((classes.len(), n_features));
        let mut log_priors = Vec::with_capacity(classes.len());

        for (c, &class) in classes.iter().enumerate() {
            // Welford, one pass over the class rows
            let mut count = 0usize;
            let mut mean = Array1::<f64>::zeros(n_features);
            let mut m2 = Array1::<f64>::zeros(n_features);
            for (row, _) in x
                .axis_iter(Axis(0))
                .zip(y.iter())
                .filter(|(_, &label)| label == class)
            {
                count += 1;
                for (j, &val) in row.iter().enumerate() {
                    let delta = val - mean[j];
                    mean[j] += delta / count as f64;
                    m2[j] += delta * (val - mean[j]);
                }
            }

            means.row_mut(c).assign(&mean);
            variances
                .row_mut(c)
                .assign(&m2.mapv(|v| v / count as f64 + epsilon));
            log_priors.push((count as f64 / x.nrows() as f64).ln());
        }

        self.classes = classes;
        self.means = means;
        self.variances = variances;
        self.log_priors = log_priors;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let log_probs = self.predict_log_proba(x)?;
        Ok(log_probs
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.classes[best]
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

    #[test]
    fn test_gaussian_nb_two_blobs() {
        let x = array![
            [1.0, 2.0],
            [1.2, 1.8],
            [0.8, 2.1],
            [6.0, 7.0],
            [6.2, 7.1],
            [5.9, 6.8],
        ];
        let y = array![0, 0, 0, 1, 1, 1];

        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        assert_eq!(nb.predict(&x).unwrap(), y);

        let proba = nb.predict_log_proba(&x).unwrap().mapv(f64::exp);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_feature_does_not_produce_nan() {
        let x = array![[1.0, 0.0], [1.1, 0.0], [5.0, 0.0], [5.2, 0.0]];
        let y = array![0, 0, 1, 1];

        let mut nb = GaussianNaiveBayes::new();
        nb.fit(&x, &y).unwrap();
        assert_eq!(nb.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_predict_before_fit() {
        let nb = GaussianNaiveBayes::new();
        assert!(matches!(
            nb.predict(&array![[0.0]]),
            Err(AstroturfError::ModelNotFitted)
        ));
    }
}
