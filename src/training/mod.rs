//! Model training module
//!
//! Classifiers trained by the [`ModelHarness`]:
//! - Logistic regression
//! - Gaussian Naive Bayes
//! - Decision trees and Random Forests
//! - K-Nearest Neighbors
//! - Linear SVM (SGD on the hinge loss)

mod config;
mod harness;
mod models;
pub mod decision_tree;
pub mod knn;
pub mod linear_models;
pub mod naive_bayes;
pub mod random_forest;
pub mod sgd;

pub use config::{ModelType, TrainingConfig};
pub use decision_tree::{DecisionTree, TreeNode};
pub use harness::{
    load_model, model_path, ModelFailure, ModelHarness, ModelRecord, ModelScore, SaveReport,
    ScoreTable,
};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use linear_models::{LinearDecision, LogisticRegression};
pub use models::{Estimator, EstimatorClone, ModelMetrics};
pub use naive_bayes::GaussianNaiveBayes;
pub use random_forest::{MaxFeatures, RandomForest};
pub use sgd::LinearSvm;
