//! Linear SVM trained by stochastic gradient descent on the hinge loss.
//!
//! Processes one shuffled sample at a time with an L2 penalty; the step size
//! follows `1 / (alpha * (t + t0))`.

use super::config::ModelType;
use super::linear_models::LinearDecision;
use super::models::{check_fit_input, Estimator};
use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    /// L2 regularization
    pub alpha: f64,
    /// Initial step size
    pub eta0: f64,
    /// Maximum epochs
    pub max_iter: usize,
    /// Stop once the epoch loss changes by less than this
    pub tol: f64,
    pub random_state: u64,
    decision: Option<LinearDecision>,
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSvm {
    pub fn new() -> Self {
        Self {
            alpha: 1e-4,
            eta0: 0.01,
            max_iter: 1000,
            tol: 1e-4,
            random_state: 42,
            decision: None,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_eta0(mut self, eta0: f64) -> Self {
        self.eta0 = eta0;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn learning_rate(&self, t: usize) -> f64 {
        let t0 = 1.0 / (self.alpha * self.eta0);
        1.0 / (self.alpha * (t as f64 + t0))
    }

    fn fit_binary(&self, x: &Array2<f64>, targets: &Array1<f64>) -> Result<(Array1<f64>, f64)> {
        let n = x.nrows();
        // 0/1 → -1/+1
        let y_signed: Vec<f64> = targets.iter().map(|&v| if v > 0.5 { 1.0 } else { -1.0 }).collect();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut prev_loss = f64::MAX;
        let mut t = 1usize;

        for epoch in 0..self.max_iter {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for &i in &indices {
                let xi = x.row(i);
                let yi = y_signed[i];
                let margin = yi * (xi.dot(&w) + b);
                let lr = self.learning_rate(t);

                w *= 1.0 - lr * self.alpha;
                if margin < 1.0 {
                    epoch_loss += 1.0 - margin;
                    w.scaled_add(lr * yi, &xi);
                    b += lr * yi;
                }
                t += 1;
            }

            epoch_loss /= n as f64;
            if !epoch_loss.is_finite() {
                return Err(AstroturfError::ModelTraining {
                    model: self.name(),
                    reason: format!("hinge loss diverged at epoch {}", epoch),
                });
            }
            if epoch > 0 && (prev_loss - epoch_loss).abs() < self.tol {
                break;
            }
            prev_loss = epoch_loss;
        }

        Ok((w, b))
    }

    /// Signed distances to the separating hyperplanes
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.decision
            .as_ref()
            .ok_or(AstroturfError::ModelNotFitted)?
            .decision_function(x)
    }
}

impl Estimator for LinearSvm {
    fn name(&self) -> String {
        ModelType::LinearSvm.name().to_string()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.alpha <= 0.0 {
            return Err(AstroturfError::Config("alpha must be positive".to_string()));
        }
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
