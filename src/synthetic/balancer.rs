//! Balancing stage of the preparation pipeline

use super::{check_aligned, class_counts, imbalance_ratio, RandomOverSampler, RandomUnderSampler, Sampler, SMOTE};
use crate::error::{AstroturfError, Result};
use crate::preprocessing::config::{BalanceConfig, BalanceStrategy};
use ndarray::{Array1, Array2};
use tracing::{debug, info};

/// Resamples a reduced matrix so its class distribution meets the configured ratio
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    config: BalanceConfig,
}

impl ClassBalancer {
    pub fn new(config: BalanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    fn sampler(&self) -> Box<dyn Sampler> {
        let ratio = self.config.ratio;
        match self.config.strategy {
            BalanceStrategy::Smote => {
                let mut smote = SMOTE::new()
                    .with_k_neighbors(self.config.k_neighbors)
                    .with_sampling_strategy(ratio);
                if let Some(seed) = self.config.random_state {
                    smote = smote.with_seed(seed);
                }
                Box::new(smote)
            }
            BalanceStrategy::RandomOver => {
                let mut sampler = RandomOverSampler::new().with_sampling_strategy(ratio);
                if let Some(seed) = self.config.random_state {
                    sampler = sampler.with_seed(seed);
                }
                Box::new(sampler)
            }
            BalanceStrategy::RandomUnder => {
                let mut sampler = RandomUnderSampler::new().with_sampling_strategy(ratio);
                if let Some(seed) = self.config.random_state {
                    sampler = sampler.with_seed(seed);
                }
                Box::new(sampler)
            }
        }
    }

    /// Whether `y` already satisfies the target ratio within tolerance
    pub fn is_balanced(&self, y: &Array1<i64>) -> bool {
        imbalance_ratio(y) >= self.config.ratio * (1.0 - self.config.tolerance)
    }

    /// Rebalance `(x, y)`; input that is already balanced is returned unchanged
    pub fn balance(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<(Array2<f64>, Array1<i64>)> {
        check_aligned(x, y)?;

        let counts = class_counts(y);
        match counts.len() {
            0 => return Err(AstroturfError::EmptyInput("no rows to balance".to_string())),
            1 => {
                let class = counts.keys().next().copied().unwrap_or_default();
                return Err(AstroturfError::SingleClass { class });
            }
            _ => {}
        }

        if self.is_balanced(y) {
            debug!(?counts, "class distribution already within tolerance");
            return Ok((x.clone(), y.clone()));
        }

        let result = self.sampler().fit_resample(x, y)?;
        info!(
            strategy = ?self.config.strategy,
            before = ?counts,
            after = ?class_counts(&result.y),
            "classes rebalanced"
        );
        Ok((result.x, result.y))
    }
}

impl Default for ClassBalancer {
    fn default() -> Self {
        Self::new(BalanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn skewed() -> (Array2<f64>, Array1<i64>) {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let y = array![0, 0, 0, 0, 0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_balanced_input_is_identity() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0, 1, 0, 1];
        let (bx, by) = ClassBalancer::default().balance(&x, &y).unwrap();
        assert_eq!(bx, x);
        assert_eq!(by, y);
    }

    #[test]
    fn test_within_tolerance_is_identity() {
        let x = Array2::zeros((41, 1));
        let mut y = Array1::zeros(41);
        y.slice_mut(ndarray::s![21..]).fill(1);
        // 20 / 21 ≈ 0.952 → inside the default 5% tolerance
        let (bx, _) = ClassBalancer::default().balance(&x, &y).unwrap();
        assert_eq!(bx.nrows(), 41);
    }

    #[test]
    fn test_each_strategy_balances() {
        let (x, y) = skewed();
        for strategy in [
            BalanceStrategy::Smote,
            BalanceStrategy::RandomOver,
            BalanceStrategy::RandomUnder,
        ] {
            let balancer = ClassBalancer::new(BalanceConfig {
                strategy,
                ..BalanceConfig::default()
            });
            let (bx, by) = balancer.balance(&x, &y).unwrap();
            assert_eq!(bx.nrows(), by.len());
            let counts = class_counts(&by);
            assert_eq!(counts[&0], counts[&1], "{:?}", strategy);
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((3, 2));
        let y = array![1, 1, 1];
        assert!(matches!(
            ClassBalancer::default().balance(&x, &y),
            Err(AstroturfError::SingleClass { class: 1 })
        ));
    }

    #[test]
    fn test_misaligned_rows() {
        let x = Array2::zeros((3, 2));
        let y = array![0, 1];
        assert!(matches!(
            ClassBalancer::default().balance(&x, &y),
            Err(AstroturfError::Shape { .. })
        ));
    }
}
