//! astroturf-detect - feature preparation and model comparison for detecting
//! coordinated inauthentic social-media text
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Labeled document tables and the file-backed collection store
//! - [`checkpoint`] - Atomic `.npz` persistence of stage artifacts
//!
//! ## Preparation
//! - [`feature_engineering`] - Tokenization, TF-IDF and sparse matrices
//! - [`decomposition`] - Randomized truncated SVD
//! - [`synthetic`] - Class balancing (SMOTE, random over/under sampling)
//! - [`preprocessing`] - The staged preparation pipeline and its configuration
//!
//! ## Training
//! - [`training`] - Classifiers and the multi-model harness
//!
//! ## Operations
//! - [`config`] - Run configuration
//! - [`monitoring`] - Environment report
//! - [`cli`] - Command-line interface

pub mod error;

pub mod checkpoint;
pub mod data;

pub mod decomposition;
pub mod feature_engineering;
pub mod preprocessing;
pub mod synthetic;

pub mod training;

pub mod cli;
pub mod config;
pub mod monitoring;

pub use error::{AstroturfError, Result};

/// Crate version, recorded in saved state and the environment report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{AstroturfError, Result};

    // Data
    pub use crate::checkpoint::{CheckpointKind, CheckpointStore};
    pub use crate::data::{
        CollectionStore, DocumentImporter, DocumentTable, ImportOptions, LabelSource, RecordFormat,
        TableLoader,
    };

    // Preparation
    pub use crate::decomposition::{DimensionalityReducer, TruncatedSvd};
    pub use crate::feature_engineering::{CsrMatrix, FeatureTransformer, TfidfVectorizer};
    pub use crate::preprocessing::{
        BalanceConfig, BalanceStrategy, PreparationPipeline, PreprocessingConfig, SvdConfig,
        TfidfConfig,
    };
    pub use crate::synthetic::{ClassBalancer, Sampler};

    // Training
    pub use crate::training::{
        Estimator, ModelHarness, ModelMetrics, ModelType, ScoreTable, TrainingConfig,
    };

    pub use crate::config::RunConfig;
    pub use crate::monitoring::report_environment;
}
