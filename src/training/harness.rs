//! Multi-model training harness
//!
//! Trains every estimator in an ordered roster on a stratified split, scores
//! it on the held-out rows, and persists each fitted model on its own. A model
//! that errors or panics is recorded as a failure and the run continues.

use super::config::{ModelType, TrainingConfig};
use super::models::{Estimator, ModelMetrics};
use super::{
    DecisionTree, GaussianNaiveBayes, KNNClassifier, LinearSvm, LogisticRegression, RandomForest,
};
use crate::checkpoint::write_atomic;
use crate::error::{AstroturfError, Result};
use crate::synthetic::class_indices;
use colored::*;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// A fitted model with its validation metrics, owned until saved
#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub name: String,
    pub model: Box<dyn Estimator>,
    pub metrics: ModelMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub name: String,
    pub metrics: ModelMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub name: String,
    pub reason: String,
}

/// Scores of one harness run, in roster order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub entries: Vec<ModelScore>,
    pub failures: Vec<ModelFailure>,
}

impl ScoreTable {
    /// Number of models that trained successfully
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ModelMetrics> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.metrics)
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "  {:<24} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            "model".bold(),
            "accuracy",
            "precision",
            "recall",
            "f1",
            "fit (s)"
        ));
        for entry in &self.entries {
            let m = &entry.metrics;
            out.push_str(&format!(
                "  {:<24} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.3}\n",
                entry.name.green(),
                m.accuracy,
                m.precision,
                m.recall,
                m.f1_score,
                m.training_time_secs
            ));
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "  {:<24} {} {}\n",
                failure.name.red(),
                "failed:".red().bold(),
                failure.reason
            ));
        }
        out
    }
}

/// Outcome of [`ModelHarness::save_models`]
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<ModelFailure>,
}

/// On-disk form of a saved model
#[derive(Debug, Serialize, Deserialize)]
struct ModelEnvelope {
    model_type: String,
    metrics: ModelMetrics,
    model: serde_json::Value,
}

/// Trains, scores and persists a roster of classifiers
pub struct ModelHarness {
    config: TrainingConfig,
    roster: Vec<Box<dyn Estimator>>,
    records: Vec<ModelRecord>,
}

impl ModelHarness {
    /// Harness over the roster named in `config`
    pub fn new(config: TrainingConfig) -> Self {
        let roster = config.default_roster();
        Self {
            config,
            roster,
            records: Vec::new(),
        }
    }

    /// Replace the roster with custom prototypes
    pub fn with_roster(mut self, roster: Vec<Box<dyn Estimator>>) -> Self {
        self.roster = roster;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn roster_names(&self) -> Vec<String> {
        self.roster.iter().map(|m| m.name()).collect()
    }

    /// Fitted models not yet saved
    pub fn records(&self) -> &[ModelRecord] {
        &self.records
    }

    /// Train and score every roster model on a stratified split of `(x, y)`.
    ///
    /// Replaces any unsaved models from a previous run.
    pub fn run_models(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ScoreTable> {
        self.config.validate()?;
        if x.nrows() != y.len() {
            return Err(AstroturfError::Shape {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(AstroturfError::EmptyInput("no rows to train on".to_string()));
        }

        let (train_idx, val_idx) =
            stratified_split(y, self.config.validation_split, self.config.random_seed)?;
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_val = x.select(Axis(0), &val_idx);
        let y_val = y.select(Axis(0), &val_idx);

        info!(
            models = self.roster.len(),
            train_rows = train_idx.len(),
            validation_rows = val_idx.len(),
            parallel = self.config.parallel,
            "training roster"
        );

        let train = |proto: &Box<dyn Estimator>| {
            train_one(proto.as_ref(), &x_train, &y_train, &x_val, &y_val)
        };
        let outcomes: Vec<std::result::Result<ModelRecord, ModelFailure>> = if self.config.parallel {
            self.roster.par_iter().map(train).collect()
        } else {
            self.roster.iter().map(train).collect()
        };

        let mut table = ScoreTable::default();
        self.records.clear();
        for outcome in outcomes {
            match outcome {
                Ok(record) => {
                    info!(
                        model = %record.name,
                        accuracy = record.metrics.accuracy,
                        f1 = record.metrics.f1_score,
                        secs = record.metrics.training_time_secs,
                        "model trained"
                    );
                    table.entries.push(ModelScore {
                        name: record.name.clone(),
                        metrics: record.metrics.clone(),
                    });
                    self.records.push(record);
                }
                Err(failure) => {
                    warn!(model = %failure.name, reason = %failure.reason, "model failed");
                    table.failures.push(failure);
                }
            }
        }

        Ok(table)
    }

    /// Persist every fitted model as `{prefix}-{name}` and release it
    pub fn save_models(&mut self, prefix: impl AsRef<Path>) -> Result<SaveReport> {
        let prefix = prefix.as_ref();
        let mut report = SaveReport::default();

        for record in self.records.drain(..) {
            let path = model_path(prefix, &record.name);
            match save_record(&path, &record) {
                Ok(()) => {
                    info!(model = %record.name, path = %path.display(), "model saved");
                    report.saved.push(path);
                }
                Err(e) => {
                    warn!(model = %record.name, error = %e, "model not saved");
                    report.failures.push(ModelFailure {
                        name: record.name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

/// `{prefix}-{name}`, e.g. `models/sk-models-decision-tree`
pub fn model_path(prefix: &Path, name: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push("-");
    path.push(name);
    PathBuf::from(path)
}

/// Rebuild a saved model from its envelope
pub fn load_model(path: &Path) -> Result<Box<dyn Estimator>> {
    let json = fs::read_to_string(path).map_err(|e| AstroturfError::persistence(path, e))?;
    let envelope: ModelEnvelope = serde_json::from_str(&json)?;

    let model_type = ModelType::from_name(&envelope.model_type).ok_or_else(|| {
        AstroturfError::persistence(path, format!("unknown model type '{}'", envelope.model_type))
    })?;

    let model: Box<dyn Estimator> = match model_type {
        ModelType::LogisticRegression => {
            Box::new(serde_json::from_value::<LogisticRegression>(envelope.model)?)
        }
        ModelType::GaussianNaiveBayes => {
            Box::new(serde_json::from_value::<GaussianNaiveBayes>(envelope.model)?)
        }
        ModelType::DecisionTree => Box::new(serde_json::from_value::<DecisionTree>(envelope.model)?),
        ModelType::RandomForest => Box::new(serde_json::from_value::<RandomForest>(envelope.model)?),
        ModelType::KNearestNeighbors => {
            Box::new(serde_json::from_value::<KNNClassifier>(envelope.model)?)
        }
        ModelType::LinearSvm => Box::new(serde_json::from_value::<LinearSvm>(envelope.model)?),
    };
    Ok(model)
}

fn save_record(path: &Path, record: &ModelRecord) -> Result<()> {
    let envelope = ModelEnvelope {
        model_type: record.name.clone(),
        metrics: record.metrics.clone(),
        model: record.model.to_json()?,
    };
    write_atomic(path, |file| {
        serde_json::to_writer(file, &envelope)?;
        Ok(())
    })
}

fn train_one(
    proto: &dyn Estimator,
    x_train: &Array2<f64>,
    y_train: &Array1<i64>,
    x_val: &Array2<f64>,
    y_val: &Array1<i64>,
) -> std::result::Result<ModelRecord, ModelFailure> {
    let name = proto.name();
    let failure = |reason: String| ModelFailure {
        name: name.clone(),
        reason,
    };

    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<_> {
        let mut model = proto.clone_box();
        model.fit(x_train, y_train)?;
        let elapsed = start.elapsed().as_secs_f64();
        let mut metrics = model.score(x_val, y_val)?;
        metrics.training_time_secs = elapsed;
        Ok((model, metrics))
    }));

    match outcome {
        Ok(Ok((model, metrics))) if metrics.is_finite() => Ok(ModelRecord {
            name: name.clone(),
            model,
            metrics,
        }),
        Ok(Ok(_)) => Err(failure("non-finite metrics".to_string())),
        Ok(Err(e)) => Err(failure(e.to_string())),
        Err(payload) => Err(failure(format!("panicked: {}", panic_message(payload.as_ref())))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Seeded per-class split; every class with at least two rows lands on both sides
pub(crate) fn stratified_split(
    y: &Array1<i64>,
    validation_split: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_idx = Vec::new();
    let mut val_idx = Vec::new();

    for (_, mut indices) in class_indices(y) {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_val = if n < 2 {
            0
        } else {
            ((n as f64 * validation_split).round() as usize).clamp(1, n - 1)
        };
        val_idx.extend_from_slice(&indices[..n_val]);
        train_idx.extend_from_slice(&indices[n_val..]);
    }

    if val_idx.is_empty() {
        return Err(AstroturfError::Validation(
            "validation split is empty; need a class with at least two rows".to_string(),
        ));
    }

    train_idx.sort_unstable();
    val_idx.sort_unstable();
    Ok((train_idx, val_idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stratified_split_keeps_class_shares() {
        let y = Array1::from_iter((0..100).map(|i| if i < 30 { 1 } else { 0 }));
        let (train, val) = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(train.len() + val.len(), 100);
        let val_pos = val.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(val_pos, 6);
        assert_eq!(val.len(), 20);
    }

    #[test]
    fn test_stratified_split_is_seeded() {
        let y = Array1::from_iter((0..40).map(|i| i % 2));
        assert_eq!(stratified_split(&y, 0.25, 1).unwrap(), stratified_split(&y, 0.25, 1).unwrap());
        assert_ne!(stratified_split(&y, 0.25, 1).unwrap(), stratified_split(&y, 0.25, 2).unwrap());
    }

    #[test]
    fn test_model_path() {
        let path = model_path(Path::new("models/sk-models"), "linear-svm");
        assert_eq!(path, PathBuf::from("models/sk-models-linear-svm"));
    }

    #[test]
    fn test_render_lists_failures() {
        let table = ScoreTable {
            entries: vec![],
            failures: vec![ModelFailure {
                name: "decision-tree".to_string(),
                reason: "boom".to_string(),
            }],
        };
        let text = table.render();
        assert!(text.contains("decision-tree"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_mismatched_rows() {
        let mut harness = ModelHarness::new(TrainingConfig::default());
        let result = harness.run_models(&array![[0.0], [1.0]], &array![0]);
        assert!(matches!(result, Err(AstroturfError::Shape { .. })));
    }
}
