//! Dimensionality reduction of sparse term matrices

pub mod linalg;
mod truncated_svd;

pub use truncated_svd::TruncatedSvd;

use crate::error::Result;
use crate::feature_engineering::CsrMatrix;
use crate::preprocessing::config::SvdConfig;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Pipeline stage reducing a sparse matrix to a dense rank-k matrix.
///
/// The first [`truncate`](Self::truncate) fits the latent projection; later
/// calls reuse it, so test data lands in the training feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionalityReducer {
    svd: TruncatedSvd,
}

impl DimensionalityReducer {
    pub fn new(config: SvdConfig) -> Self {
        Self {
            svd: TruncatedSvd::new(config),
        }
    }

    pub fn truncate(&mut self, x: &CsrMatrix) -> Result<Array2<f64>> {
        if self.svd.is_fitted() {
            self.svd.transform(x)
        } else {
            self.svd.fit_transform(x)
        }
    }

    /// Refit the projection on `x`, then project it
    pub fn fit_transform(&mut self, x: &CsrMatrix) -> Result<Array2<f64>> {
        self.svd.fit_transform(x)
    }

    /// Project with the already fitted components
    pub fn transform(&self, x: &CsrMatrix) -> Result<Array2<f64>> {
        self.svd.transform(x)
    }

    pub fn is_fitted(&self) -> bool {
        self.svd.is_fitted()
    }

    pub fn svd(&self) -> &TruncatedSvd {
        &self.svd
    }
}
