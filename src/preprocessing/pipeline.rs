//! Feature preparation pipeline: transform → checkpoint → reduce → balance → checkpoint

use super::config::PreprocessingConfig;
use crate::checkpoint::{write_atomic, CheckpointKind, CheckpointStore};
use crate::data::DocumentTable;
use crate::decomposition::DimensionalityReducer;
use crate::error::{AstroturfError, Result};
use crate::feature_engineering::{CsrMatrix, FeatureTransformer};
use crate::synthetic::ClassBalancer;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Artifact type and shape observed at one stage boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub type_str: String,
    pub stage: String,
    pub artifact: String,
    pub rows: usize,
    pub cols: usize,
    pub elapsed_secs: f64,
}

/// Fitted feature space shared between the "train" and "test" runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationState {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub config: PreprocessingConfig,
    pub transformer: FeatureTransformer,
    pub reducer: DimensionalityReducer,
}

/// Sequences term weighting, dimensionality reduction and class balancing.
///
/// The first [`process`](Self::process) call of the fitting run (by default
/// `"train"`) fits the vocabulary and the projection; later calls on the same
/// instance reuse them. Any other run on an unfitted pipeline fails with
/// [`AstroturfError::ModelNotFitted`]. Every stage artifact is checkpointed
/// before the next stage starts.
#[derive(Debug)]
pub struct PreparationPipeline {
    config: PreprocessingConfig,
    transformer: FeatureTransformer,
    reducer: DimensionalityReducer,
    balancer: ClassBalancer,
    checkpoints: CheckpointStore,
    reports: Vec<StageReport>,
}

impl PreparationPipeline {
    pub fn new(config: PreprocessingConfig, checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            transformer: FeatureTransformer::new(&config.tfidf),
            reducer: DimensionalityReducer::new(config.svd.clone()),
            balancer: ClassBalancer::new(config.balance.clone()),
            checkpoints: CheckpointStore::new(checkpoint_dir),
            reports: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn transformer(&self) -> &FeatureTransformer {
        &self.transformer
    }

    pub fn reducer(&self) -> &DimensionalityReducer {
        &self.reducer
    }

    /// Stage reports of every run on this instance, in order
    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    pub fn is_fitted(&self) -> bool {
        self.transformer.is_fitted() && self.reducer.is_fitted()
    }

    /// Turn a labeled document table into a balanced, reduced training pair
    pub fn process(
        &mut self,
        table: &DocumentTable,
        type_str: &str,
    ) -> Result<(Array2<f64>, Array1<i64>)> {
        validate_type_str(type_str)?;
        if !self.is_fitted() && !self.config.is_fit_run(type_str) {
            return Err(AstroturfError::ModelNotFitted.in_stage("transform", table.describe()));
        }
        info!(type_str, rows = table.len(), "preparing {}", table.describe());

        let start = Instant::now();
        let (x_tf, y_tf) = self
            .transformer
            .transform(table)
            .map_err(|e| e.in_stage("transform", table.describe()))?;
        check_aligned("transform", x_tf.nrows(), y_tf.len(), &x_tf.describe())?;
        self.record(type_str, "transform", x_tf.describe(), x_tf.shape(), start);

        self.checkpoints.save_transformed(type_str, &x_tf, &y_tf)?;

        self.reduce_and_balance(type_str, &x_tf, &y_tf)
    }

    /// Continue a run from its checkpoints.
    ///
    /// Returns the `-rs` pair when it exists; otherwise reruns reduction and
    /// balancing on the `-tf` pair. Only the fitting run may fit a missing
    /// projection there.
    pub fn resume(&mut self, type_str: &str) -> Result<(Array2<f64>, Array1<i64>)> {
        validate_type_str(type_str)?;

        let has = |kind| self.checkpoints.exists(type_str, kind);
        if has(CheckpointKind::DataRs) && has(CheckpointKind::LabelRs) {
            let start = Instant::now();
            let (x, y) = self.checkpoints.load_resampled(type_str)?;
            let artifact = describe_dense(&x);
            check_aligned("resume", x.nrows(), y.len(), &artifact)?;
            self.record(type_str, "resume", artifact, x.dim(), start);
            return Ok((x, y));
        }

        if has(CheckpointKind::DataTf) && has(CheckpointKind::LabelTf) {
            let (x_tf, y_tf) = self.checkpoints.load_transformed(type_str)?;
            check_aligned("resume", x_tf.nrows(), y_tf.len(), &x_tf.describe())?;
            if !self.reducer.is_fitted() {
                if !self.config.is_fit_run(type_str) {
                    return Err(AstroturfError::ModelNotFitted.in_stage("truncate", x_tf.describe()));
                }
                info!(type_str, "no fitted projection; fitting on resumed features");
            }
            return self.reduce_and_balance(type_str, &x_tf, &y_tf);
        }

        Err(AstroturfError::persistence(
            &self.checkpoints.path(type_str, CheckpointKind::DataTf),
            format!("no checkpoints for '{}'", type_str),
        ))
    }

    fn reduce_and_balance(
        &mut self,
        type_str: &str,
        x_tf: &CsrMatrix,
        y_tf: &Array1<i64>,
    ) -> Result<(Array2<f64>, Array1<i64>)> {
        let start = Instant::now();
        let x_reduced = self
            .reducer
            .truncate(x_tf)
            .map_err(|e| e.in_stage("truncate", x_tf.describe()))?;
        let artifact = describe_dense(&x_reduced);
        check_aligned("truncate", x_reduced.nrows(), y_tf.len(), &artifact)?;
        self.record(type_str, "truncate", artifact.clone(), x_reduced.dim(), start);

        let start = Instant::now();
        let (x_bal, y_bal) = self
            .balancer
            .balance(&x_reduced, y_tf)
            .map_err(|e| e.in_stage("balance", artifact))?;
        let artifact = describe_dense(&x_bal);
        check_aligned("balance", x_bal.nrows(), y_bal.len(), &artifact)?;
        self.record(type_str, "balance", artifact, x_bal.dim(), start);

        self.checkpoints.save_resampled(type_str, &x_bal, &y_bal)?;
        Ok((x_bal, y_bal))
    }

    fn record(
        &mut self,
        type_str: &str,
        stage: &str,
        artifact: String,
        (rows, cols): (usize, usize),
        start: Instant,
    ) {
        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(type_str, stage, rows, cols, elapsed_secs, "{}", artifact);
        self.reports.push(StageReport {
            type_str: type_str.to_string(),
            stage: stage.to_string(),
            artifact,
            rows,
            cols,
            elapsed_secs,
        });
    }

    /// Persist the fitted vocabulary and projection as JSON
    pub fn save_state(&self, path: &Path) -> Result<()> {
        if !self.is_fitted() {
            return Err(AstroturfError::ModelNotFitted);
        }

        let state = PreparationState {
            version: crate::VERSION.to_string(),
            created_at: Utc::now(),
            config: self.config.clone(),
            transformer: self.transformer.clone(),
            reducer: self.reducer.clone(),
        };
        write_atomic(path, |file| {
            serde_json::to_writer(file, &state)?;
            Ok(())
        })?;

        info!(path = %path.display(), "preparation state saved");
        Ok(())
    }

    /// Replace the fitted vocabulary, projection and settings with a saved state
    pub fn load_state(&mut self, path: &Path) -> Result<()> {
        let json = fs::read_to_string(path).map_err(|e| AstroturfError::persistence(path, e))?;
        let state: PreparationState = serde_json::from_str(&json)?;

        info!(
            path = %path.display(),
            saved_by = %state.version,
            created_at = %state.created_at,
            "preparation state loaded"
        );
        if state.config != self.config {
            warn!(
                path = %path.display(),
                "preparation settings differ from the saved state; using the saved settings"
            );
        }
        self.balancer = ClassBalancer::new(state.config.balance.clone());
        self.config = state.config;
        self.transformer = state.transformer;
        self.reducer = state.reducer;
        Ok(())
    }
}

/// Type/shape description of a dense matrix used in stage reports
pub fn describe_dense(x: &Array2<f64>) -> String {
    format!("Array2<f64> {}x{}", x.nrows(), x.ncols())
}

fn check_aligned(stage: &str, rows: usize, labels: usize, artifact: &str) -> Result<()> {
    if rows != labels {
        return Err(AstroturfError::Shape {
            expected: format!("{} labels", rows),
            actual: format!("{} labels", labels),
        }
        .in_stage(stage, artifact));
    }
    Ok(())
}

fn validate_type_str(type_str: &str) -> Result<()> {
    let valid = !type_str.is_empty()
        && type_str
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AstroturfError::Config(format!(
            "run label '{}' must be non-empty ASCII letters, digits, '-' or '_'",
            type_str
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> DocumentTable {
        let mut texts = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            texts.push(format!("breaking vote fraud rigged election share now {}", i % 4));
            labels.push(1);
            texts.push(format!("lovely weather walk park coffee friends {}", i % 3));
            labels.push(0);
        }
        for i in 0..20 {
            texts.push(format!("coffee morning park dog walk topic{}", i));
            labels.push(0);
        }
        DocumentTable::new(texts, labels).unwrap()
    }

    fn config() -> PreprocessingConfig {
        PreprocessingConfig::new().with_rank(4).with_seed(11)
    }

    #[test]
    fn test_invalid_type_str() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        assert!(matches!(
            pipeline.process(&corpus(), "../train"),
            Err(AstroturfError::Config(_))
        ));
    }

    #[test]
    fn test_reports_cover_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        pipeline.process(&corpus(), "train").unwrap();

        let stages: Vec<&str> = pipeline.reports().iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(stages, vec!["transform", "truncate", "balance"]);
        assert_eq!(pipeline.reports()[1].cols, 4);
        assert_eq!(pipeline.reports()[2].rows, 100);
    }

    #[test]
    fn test_stage_error_carries_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline =
            PreparationPipeline::new(PreprocessingConfig::new().with_rank(10_000), dir.path());
        let err = pipeline.process(&corpus(), "train").unwrap_err();

        match &err {
            AstroturfError::Stage { stage, shape, .. } => {
                assert_eq!(stage, "truncate");
                assert!(shape.starts_with("CsrMatrix<f64> 80x"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(err.root(), AstroturfError::Dimension { .. }));
    }

    #[test]
    fn test_resume_from_transformed_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        let (x, y) = pipeline.process(&corpus(), "train").unwrap();

        fs::remove_file(pipeline.checkpoints().path("train", CheckpointKind::DataRs)).unwrap();

        let mut fresh = PreparationPipeline::new(config(), dir.path());
        let (x2, y2) = fresh.resume("train").unwrap();
        assert_eq!(y, y2);
        assert_eq!(x.dim(), x2.dim());
        for (a, b) in x.iter().zip(x2.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_resume_test_run_never_fits_projection() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        pipeline.process(&corpus(), "train").unwrap();
        pipeline.process(&corpus(), "test").unwrap();

        fs::remove_file(pipeline.checkpoints().path("test", CheckpointKind::DataRs)).unwrap();

        let mut fresh = PreparationPipeline::new(config(), dir.path());
        let err = fresh.resume("test").unwrap_err();
        assert!(matches!(err, AstroturfError::Stage { ref stage, .. } if stage == "truncate"));
        assert!(matches!(err.root(), AstroturfError::ModelNotFitted));
        assert!(!fresh.reducer().is_fitted());
    }

    #[test]
    fn test_resume_test_run_uses_loaded_projection() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        pipeline.process(&corpus(), "train").unwrap();
        pipeline.save_state(&state_path).unwrap();
        let (x, _) = pipeline.process(&corpus(), "test").unwrap();

        fs::remove_file(pipeline.checkpoints().path("test", CheckpointKind::DataRs)).unwrap();

        let mut fresh = PreparationPipeline::new(config(), dir.path());
        fresh.load_state(&state_path).unwrap();
        let (x2, _) = fresh.resume("test").unwrap();
        assert_eq!(x.dim(), x2.dim());
        for (a, b) in x.iter().zip(x2.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unfitted_pipeline_rejects_test_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());

        let err = pipeline.process(&corpus(), "test").unwrap_err();
        assert!(matches!(err, AstroturfError::Stage { ref stage, .. } if stage == "transform"));
        assert!(matches!(err.root(), AstroturfError::ModelNotFitted));
        assert!(!pipeline.transformer().is_fitted());
        assert!(!pipeline.checkpoints().exists("test", CheckpointKind::DataTf));
    }

    #[test]
    fn test_custom_fit_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline =
            PreparationPipeline::new(config().with_fit_type_str("fold0"), dir.path());

        assert!(pipeline.process(&corpus(), "train").is_err());
        pipeline.process(&corpus(), "fold0").unwrap();
        assert!(pipeline.process(&corpus(), "train").is_ok());
    }

    #[test]
    fn test_load_state_restores_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        pipeline.process(&corpus(), "train").unwrap();
        pipeline.save_state(&state_path).unwrap();

        let other = PreprocessingConfig::new()
            .with_rank(9)
            .with_balance_strategy(crate::preprocessing::BalanceStrategy::RandomUnder);
        let mut restored = PreparationPipeline::new(other, dir.path());
        restored.load_state(&state_path).unwrap();

        assert_eq!(restored.config(), &config());
        assert_eq!(restored.balancer.config(), &config().balance);
        let (x, _) = restored.process(&corpus(), "test").unwrap();
        assert_eq!(x.ncols(), 4);
    }

    #[test]
    fn test_resume_without_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        assert!(matches!(
            pipeline.resume("test"),
            Err(AstroturfError::Persistence { .. })
        ));
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");

        let mut pipeline = PreparationPipeline::new(config(), dir.path());
        assert!(matches!(
            pipeline.save_state(&state_path),
            Err(AstroturfError::ModelNotFitted)
        ));
        pipeline.process(&corpus(), "train").unwrap();
        pipeline.save_state(&state_path).unwrap();

        let mut restored = PreparationPipeline::new(config(), dir.path().join("other"));
        restored.load_state(&state_path).unwrap();
        assert!(restored.is_fitted());
        assert_eq!(
            restored.transformer().n_features(),
            pipeline.transformer().n_features()
        );
    }
}
