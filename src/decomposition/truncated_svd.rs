//! Randomized truncated SVD for sparse term matrices

use super::linalg::{
    column_variances, flip_rows_by_max_abs, gaussian_matrix, orthonormalize, symmetric_eigen,
};
use crate::error::{AstroturfError, Result};
use crate::feature_engineering::CsrMatrix;
use crate::preprocessing::config::SvdConfig;
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fitted truncated SVD.
///
/// `components` is `k × n_features`; projecting `X` yields `X · componentsᵀ`.
/// No centering is applied, so sparse input stays sparse until projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncatedSvd {
    config: SvdConfig,
    components: Option<Array2<f64>>,
    singular_values: Option<Array1<f64>>,
    explained_variance: Option<Array1<f64>>,
    explained_variance_ratio: Option<Array1<f64>>,
}

impl TruncatedSvd {
    pub fn new(config: SvdConfig) -> Self {
        Self {
            config,
            components: None,
            singular_values: None,
            explained_variance: None,
            explained_variance_ratio: None,
        }
    }

    pub fn n_components(&self) -> usize {
        self.config.n_components
    }

    fn check_dimensions(&self, x: &CsrMatrix) -> Result<()> {
        let k = self.config.n_components;
        if k == 0 {
            return Err(AstroturfError::Dimension {
                requested: 0,
                available: x.ncols(),
            });
        }
        if x.ncols() <= k {
            return Err(AstroturfError::Dimension {
                requested: k,
                available: x.ncols(),
            });
        }
        if x.nrows() < k {
            return Err(AstroturfError::Dimension {
                requested: k,
                available: x.nrows(),
            });
        }
        Ok(())
    }

    /// Fit the projection on `x`
    pub fn fit(&mut self, x: &CsrMatrix) -> Result<()> {
        self.check_dimensions(x)?;

        let (n, d) = x.shape();
        let k = self.config.n_components;
        let l = (k + self.config.n_oversamples).min(n).min(d);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_state);

        // Range finder: Q spans the dominant column space of X.
        let omega = gaussian_matrix(d, l, &mut rng);
        let mut q = x.dot_dense(&omega)?;
        orthonormalize(&mut q);

        for _ in 0..self.config.n_iter {
            let mut z = x.t_dot_dense(&q)?;
            orthonormalize(&mut z);
            q = x.dot_dense(&z)?;
            orthonormalize(&mut q);
        }

        // B = Qᵀ X, stored transposed as Xᵀ Q (d × l).
        let bt = x.t_dot_dense(&q)?;
        let gram = bt.t().dot(&bt);
        let (eigenvalues, eigenvectors) = symmetric_eigen(&gram);

        let mut components = Array2::zeros((k, d));
        let mut singular_values = Array1::zeros(k);
        for i in 0..k {
            let sigma = eigenvalues[i].max(0.0).sqrt();
            singular_values[i] = sigma;
            if sigma > 1e-12 {
                let v = bt.dot(&eigenvectors.column(i)) / sigma;
                components.row_mut(i).assign(&v);
            }
        }

        let degenerate = singular_values.iter().filter(|&&s| s <= 1e-12).count();
        if degenerate > 0 {
            warn!(
                degenerate,
                requested = k,
                "input rank is below the requested rank; trailing components are zero"
            );
        }

        flip_rows_by_max_abs(&mut components);

        let projected = x.dot_dense(&components.t().to_owned())?;
        let explained_variance = column_variances(&projected);
        let total_variance = x.column_variances().sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            Array1::zeros(k)
        };

        debug!(
            rank = k,
            sampled = l,
            explained = explained_variance_ratio.sum(),
            "truncated SVD fitted"
        );

        self.components = Some(components);
        self.singular_values = Some(singular_values);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        Ok(())
    }

    /// Project `x` onto the fitted components
    pub fn transform(&self, x: &CsrMatrix) -> Result<Array2<f64>> {
        let components = self.components.as_ref().ok_or(AstroturfError::ModelNotFitted)?;
        if x.ncols() != components.ncols() {
            return Err(AstroturfError::Dimension {
                requested: components.ncols(),
                available: x.ncols(),
            });
        }
        x.dot_dense(&components.t().to_owned())
    }

    pub fn fit_transform(&mut self, x: &CsrMatrix) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn is_fitted(&self) -> bool {
        self.components.is_some()
    }

    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.singular_values.as_ref()
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    /// Number of input columns the projection was fitted on
    pub fn n_features_in(&self) -> Option<usize> {
        self.components.as_ref().map(|c| c.len_of(Axis(1)))
    }
}
