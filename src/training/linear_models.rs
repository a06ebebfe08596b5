//! Linear classifiers
//!
//! Both classifiers here share [`LinearDecision`]: binary problems fit one
//! weight vector, multi-class problems fit one-vs-rest.

use super::config::ModelType;
use super::models::{check_fit_input, check_predict_input, unique_classes, Estimator};
use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted linear decision functions, one row per one-vs-rest problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDecision {
    pub classes: Vec<i64>,
    /// `m × n_features`, with `m = 1` for binary problems
    pub weights: Array2<f64>,
    pub intercepts: Array1<f64>,
}

impl LinearDecision {
    /// Fit every one-vs-rest problem with `fit_binary`, which receives 0/1 targets
    pub fn fit_with<F>(model: &str, x: &Array2<f64>, y: &Array1<i64>, fit_binary: F) -> Result<Self>
    where
        F: Fn(&Array1<f64>) -> Result<(Array1<f64>, f64)>,
    {
        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(AstroturfError::ModelTraining {
                model: model.to_string(),
                reason: "need at least two classes".to_string(),
            });
        }

        let positives: Vec<i64> = if classes.len() == 2 {
            vec![classes[1]]
        } else {
            classes.clone()
        };

        let mut weights = Array2::zeros((positives.len(), x.ncols()));
        let mut intercepts = Array1::zeros(positives.len());
        for (row, &positive) in positives.iter().enumerate() {
            let targets = y.mapv(|label| if label == positive { 1.0 } else { 0.0 });
            let (w, b) = fit_binary(&targets)?;
            weights.row_mut(row).assign(&w);
            intercepts[row] = b;
        }

        if weights.iter().chain(intercepts.iter()).any(|v| !v.is_finite()) {
            return Err(AstroturfError::ModelTraining {
                model: model.to_string(),
                reason: "optimization diverged to non-finite weights".to_string(),
            });
        }

        Ok(Self {
            classes,
            weights,
            intercepts,
        })
    }

    pub fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Raw decision values, `n_samples × m`
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_predict_input(x, self.n_features())?;
        let scores = x.dot(&self.weights.t()) + &self.intercepts;
        if scores.iter().any(|v| !v.is_finite()) {
            return Err(AstroturfError::Validation(
                "non-finite decision values".to_string(),
            ));
        }
        Ok(scores)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let scores = self.decision_function(x)?;
        if scores.ncols() == 1 {
            return Ok(scores
                .column(0)
                .mapv(|z| if z >= 0.0 { self.classes[1] } else { self.classes[0] }));
        }

        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
                self.classes[best.0]
            })
            .collect())
    }
}

/// Logistic regression trained by full-batch gradient descent with an L2 penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Regularization strength (L2)
    pub alpha: f64,
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    pub learning_rate: f64,
    decision: Option<LinearDecision>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            decision: None,
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn fit_binary(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array1<f64>, f64)> {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let predictions = Self::sigmoid(&(x.dot(&weights) + bias));

            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples) + (self.alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }

        Ok((weights, bias))
    }

    /// Probability of the positive class (binary models only)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let decision = self.decision.as_ref().ok_or(AstroturfError::ModelNotFitted)?;
        let scores = decision.decision_function(x)?;
        if scores.ncols() != 1 {
            return Err(AstroturfError::Validation(
                "predict_proba is only defined for binary models".to_string(),
            ));
        }
        Ok(Self::sigmoid(&scores.column(0).to_owned()))
    }

    pub fn is_fitted(&self) -> bool {
        self.decision.is_some()
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> String {
        ModelType::LogisticRegression.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        let name = self.name();
        self.decision = Some(LinearDecision::fit_with(&name, x, y, |targets| {
            self.fit_binary(x, targets)
        })?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.decision
            .as_ref()
            .ok_or(AstroturfError::ModelNotFitted)?
            .predict(x)
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [-2.0, -1.0],
            [-1.5, -2.0],
            [-1.0, -1.5],
            [1.0, 1.5],
            [1.5, 2.0],
            [2.0, 1.0],
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_logistic_regression_separable() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[5] > 0.5);
    }

    #[test]
    fn test_arbitrary_labels() {
        let (x, _) = separable();
        let y = array![-3, -3, -3, 7, 7, 7];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_multiclass_one_vs_rest() {
        let x = array![[0.0, 5.0], [0.2, 5.1], [5.0, 0.0], [5.1, 0.3], [-5.0, -5.0], [-5.2, -4.9]];
        let y = array![0, 0, 1, 1, 2, 2];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_not_fitted() {
        let model = LogisticRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(AstroturfError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_single_class_fails() {
        let mut model = LogisticRegression::new();
        let result = model.fit(&array![[1.0], [2.0]], &array![1, 1]);
        assert!(matches!(result, Err(AstroturfError::ModelTraining { .. })));
    }
}
