//! Run configuration
//!
//! Everything the `run` command needs in one JSON document: where data and
//! artifacts live, which sources to import, and the preprocessing and
//! training settings. Unspecified fields take their defaults.

use crate::data::{ImportOptions, LabelSource, RecordFormat};
use crate::error::{AstroturfError, Result};
use crate::preprocessing::PreprocessingConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One source file to load into a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub collection: String,
    pub file: PathBuf,
    pub format: RecordFormat,
    pub text_field: String,
    pub label: LabelSource,
}

impl ImportSpec {
    pub fn options(&self) -> ImportOptions {
        ImportOptions::new(self.format, self.text_field.clone(), self.label.clone())
    }
}

/// `target` ← `first` ++ `second`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub target: String,
    pub first: String,
    pub second: String,
}

/// Stages of a run that can be switched off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSteps {
    pub report_environment: bool,
    /// Run `imports` and `merges` before loading
    pub import: bool,
    pub prepare: bool,
    pub train: bool,
}

impl Default for RunSteps {
    fn default() -> Self {
        Self {
            report_environment: true,
            import: false,
            prepare: true,
            train: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Root of the collection store
    pub store_dir: PathBuf,
    /// Directory for `.npz` checkpoints
    pub checkpoint_dir: PathBuf,
    /// Saved models are written to `{models_prefix}-{model-name}`
    pub models_prefix: PathBuf,
    /// Fitted vocabulary and projection
    pub state_path: PathBuf,
    pub imports: Vec<ImportSpec>,
    pub merges: Vec<MergeSpec>,
    pub train_collection: String,
    /// Prepared with the train-fitted state after training data
    pub test_collection: Option<String>,
    pub steps: RunSteps,
    pub preprocessing: PreprocessingConfig,
    pub training: TrainingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/store"),
            checkpoint_dir: PathBuf::from("."),
            models_prefix: PathBuf::from("models/sk-models"),
            state_path: PathBuf::from("preparation-state.json"),
            imports: Vec::new(),
            merges: Vec::new(),
            train_collection: "merged_tweets".to_string(),
            test_collection: None,
            steps: RunSteps::default(),
            preprocessing: PreprocessingConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Read a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            AstroturfError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: RunConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_collection.is_empty() {
            return Err(AstroturfError::Config("train_collection is empty".to_string()));
        }
        self.training.validate()
    }
}
