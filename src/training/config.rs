//! Training configuration

use super::models::Estimator;
use super::{
    DecisionTree, GaussianNaiveBayes, KNNClassifier, LinearSvm, LogisticRegression, RandomForest,
};
use crate::error::{AstroturfError, Result};
use serde::{Deserialize, Serialize};

/// Classifiers available in the default roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    LogisticRegression,
    GaussianNaiveBayes,
    DecisionTree,
    RandomForest,
    KNearestNeighbors,
    LinearSvm,
}

impl ModelType {
    /// Every model type, in default roster order
    pub const ALL: [ModelType; 6] = [
        ModelType::LogisticRegression,
        ModelType::GaussianNaiveBayes,
        ModelType::DecisionTree,
        ModelType::RandomForest,
        ModelType::KNearestNeighbors,
        ModelType::LinearSvm,
    ];

    /// Artifact-safe name, e.g. `logistic-regression`
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::LogisticRegression => "logistic-regression",
            ModelType::GaussianNaiveBayes => "gaussian-naive-bayes",
            ModelType::DecisionTree => "decision-tree",
            ModelType::RandomForest => "random-forest",
            ModelType::KNearestNeighbors => "k-nearest-neighbors",
            ModelType::LinearSvm => "linear-svm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Unfitted estimator of this type configured from `config`
    pub fn build(&self, config: &TrainingConfig) -> Box<dyn Estimator> {
        match self {
            ModelType::LogisticRegression => Box::new(
                LogisticRegression::new()
                    .with_max_iter(config.max_iter)
                    .with_learning_rate(config.learning_rate),
            ),
            ModelType::GaussianNaiveBayes => Box::new(GaussianNaiveBayes::new()),
            ModelType::DecisionTree => {
                let mut tree = DecisionTree::new().with_random_state(config.random_seed);
                if let Some(depth) = config.max_depth {
                    tree = tree.with_max_depth(depth);
                }
                Box::new(tree)
            }
            ModelType::RandomForest => {
                let mut forest =
                    RandomForest::new(config.n_estimators).with_random_state(config.random_seed);
                if let Some(depth) = config.max_depth {
                    forest = forest.with_max_depth(depth);
                }
                Box::new(forest)
            }
            ModelType::KNearestNeighbors => Box::new(KNNClassifier::with_k(config.n_neighbors)),
            ModelType::LinearSvm => Box::new(
                LinearSvm::new()
                    .with_alpha(config.svm_alpha)
                    .with_max_iter(config.max_iter)
                    .with_random_state(config.random_seed),
            ),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for the model harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Models to train, in order
    pub roster: Vec<ModelType>,
    /// Fraction of rows held out (per class) for scoring
    pub validation_split: f64,
    pub random_seed: u64,
    /// Train models concurrently with rayon
    pub parallel: bool,
    /// Iteration cap for the gradient-based models
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Trees in the random forest
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub n_neighbors: usize,
    /// L2 penalty of the linear SVM
    pub svm_alpha: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            roster: ModelType::ALL.to_vec(),
            validation_split: 0.2,
            random_seed: 42,
            parallel: false,
            max_iter: 500,
            learning_rate: 0.1,
            n_estimators: 50,
            max_depth: Some(10),
            n_neighbors: 5,
            svm_alpha: 1e-4,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roster(mut self, roster: Vec<ModelType>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(AstroturfError::Config(format!(
                "validation_split must be in (0, 1), got {}",
                self.validation_split
            )));
        }
        if self.n_estimators == 0 || self.n_neighbors == 0 {
            return Err(AstroturfError::Config(
                "n_estimators and n_neighbors must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Unfitted prototypes for every model in the roster
    pub fn default_roster(&self) -> Vec<Box<dyn Estimator>> {
        self.roster.iter().map(|t| t.build(self)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for t in ModelType::ALL {
            assert_eq!(ModelType::from_name(t.name()), Some(t));
        }
        assert_eq!(ModelType::from_name("xgboost"), None);
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ModelType::KNearestNeighbors).unwrap();
        assert_eq!(json, "\"k-nearest-neighbors\"");
    }

    #[test]
    fn test_default_roster_order() {
        let config = TrainingConfig::default();
        let names: Vec<String> = config.default_roster().iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec![
                "logistic-regression",
                "gaussian-naive-bayes",
                "decision-tree",
                "random-forest",
                "k-nearest-neighbors",
                "linear-svm",
            ]
        );
    }

    #[test]
    fn test_validate() {
        assert!(TrainingConfig::default().validate().is_ok());
        assert!(TrainingConfig::default().with_validation_split(1.0).validate().is_err());
    }
}
