//! Error types for the astroturf detection pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AstroturfError>;

/// Main error type
#[derive(Error, Debug)]
pub enum AstroturfError {
    /// A stage received zero usable rows or produced no usable features
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Requested reduction rank cannot be satisfied by the input
    #[error("Dimension error: requested rank {requested}, available {available}")]
    Dimension { requested: usize, available: usize },

    /// Resampling needs at least two classes
    #[error("Single class: only label {class} present, cannot rebalance")]
    SingleClass { class: i64 },

    /// One estimator failed to fit or score
    #[error("Training of {model} failed: {reason}")]
    ModelTraining { model: String, reason: String },

    /// Checkpoint or model write/read failed
    #[error("Persistence failure at {path}: {reason}")]
    Persistence { path: String, reason: String },

    /// A preparation stage failed; carries the stage and the offending artifact's shape
    #[error("Stage '{stage}' failed on {shape}: {source}")]
    Stage {
        stage: String,
        shape: String,
        #[source]
        source: Box<AstroturfError>,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AstroturfError {
    /// Wrap an error with the name of the stage and the shape of its input
    pub fn in_stage(self, stage: impl Into<String>, shape: impl Into<String>) -> Self {
        AstroturfError::Stage {
            stage: stage.into(),
            shape: shape.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through stage wrappers
    pub fn root(&self) -> &AstroturfError {
        match self {
            AstroturfError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn persistence(path: &std::path::Path, reason: impl ToString) -> Self {
        AstroturfError::Persistence {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for AstroturfError {
    fn from(err: polars::error::PolarsError) -> Self {
        AstroturfError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for AstroturfError {
    fn from(err: serde_json::Error) -> Self {
        AstroturfError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AstroturfError {
    fn from(err: ndarray::ShapeError) -> Self {
        AstroturfError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
