//! Feature preparation
//!
//! Turns a labeled [`DocumentTable`](crate::data::DocumentTable) into a
//! balanced, dimensionality-reduced numeric dataset:
//! - term weighting ([`FeatureTransformer`](crate::feature_engineering::FeatureTransformer))
//! - truncated SVD ([`DimensionalityReducer`](crate::decomposition::DimensionalityReducer))
//! - class balancing ([`ClassBalancer`](crate::synthetic::ClassBalancer))

pub mod config;
mod pipeline;

pub use config::{BalanceConfig, BalanceStrategy, PreprocessingConfig, SvdConfig, TfidfConfig};
pub use pipeline::{describe_dense, PreparationPipeline, PreparationState, StageReport};
