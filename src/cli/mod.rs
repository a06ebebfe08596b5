//! Astroturf detection CLI
//!
//! Import labeled text, prepare feature checkpoints, and train the model roster.

use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::checkpoint::CheckpointStore;
use crate::config::RunConfig;
use crate::data::{CollectionStore, DocumentImporter, ImportOptions, LabelSource, RecordFormat, TableLoader};
use crate::monitoring::report_environment;
use crate::preprocessing::{PreparationPipeline, PreprocessingConfig, StageReport};
use crate::training::{ModelHarness, SaveReport, ScoreTable, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn print_stage_reports(reports: &[StageReport]) {
    for report in reports {
        println!(
            "  {:<10} {:<10} {:<40} {}",
            muted(&report.type_str),
            report.stage,
            report.artifact,
            dim(&format!("{:.3}s", report.elapsed_secs))
        );
    }
}

fn print_scores(table: &ScoreTable) {
    println!();
    print!("{}", table.render());
    println!();
}

fn print_save_report(report: &SaveReport) {
    for path in &report.saved {
        println!("  {} {}", ok("✓"), path.display());
    }
    for failure in &report.failures {
        println!("  {} {} {}", "✗".red(), failure.name, dim(&failure.reason));
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "astroturf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Prepare social-media text and train astroturf classifiers")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a CSV/JSON/JSON-lines file into a collection
    Import {
        /// Collection store directory
        #[arg(long, default_value = "data/store")]
        store: PathBuf,

        #[arg(long)]
        collection: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// csv, json or jsonl
        #[arg(long, default_value = "csv")]
        format: String,

        /// Field holding the text
        #[arg(long, default_value = "text")]
        text_field: String,

        /// Field holding the label
        #[arg(long, conflicts_with = "label", required_unless_present = "label")]
        label_field: Option<String>,

        /// Constant label for every record of the file
        #[arg(long, allow_negative_numbers = true)]
        label: Option<i64>,
    },

    /// Write `first` followed by `second` into `target`
    Merge {
        #[arg(long, default_value = "data/store")]
        store: PathBuf,

        #[arg(long)]
        target: String,

        #[arg(long)]
        first: String,

        #[arg(long)]
        second: String,
    },

    /// Transform, reduce and balance a collection, writing checkpoints
    Prepare {
        #[arg(long, default_value = "data/store")]
        store: PathBuf,

        #[arg(long)]
        collection: String,

        /// Artifact tag, e.g. train or test
        #[arg(long, default_value = "train")]
        type_str: String,

        /// Preprocessing config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = ".")]
        checkpoint_dir: PathBuf,

        /// Fitted state: written after a train run, reused by other runs
        #[arg(long, default_value = "preparation-state.json")]
        state: PathBuf,
    },

    /// Train the model roster on a prepared checkpoint
    Train {
        #[arg(long, default_value = ".")]
        checkpoint_dir: PathBuf,

        #[arg(long, default_value = "train")]
        type_str: String,

        /// Training config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "models/sk-models")]
        models_prefix: PathBuf,
    },

    /// Run the configured sequence end to end
    Run {
        /// Run config (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the environment report
    Env,
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(T::default()),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_import(
    store: &Path,
    collection: &str,
    file: &Path,
    format: &str,
    text_field: &str,
    label_field: Option<&str>,
    label: Option<i64>,
) -> anyhow::Result<()> {
    section("Import");

    let label = match (label_field, label) {
        (Some(field), _) => LabelSource::Column(field.to_string()),
        (None, Some(value)) => LabelSource::Constant(value),
        (None, None) => anyhow::bail!("either --label-field or --label is required"),
    };
    let options = ImportOptions::new(RecordFormat::from_name(format)?, text_field, label);

    step_run(&format!("Importing {}", file.display()));
    let start = Instant::now();
    let n = CollectionStore::new(store).import_records(collection, file, &options)?;
    step_done(&format!("{} rows into {} in {:?}", n, collection.cyan(), start.elapsed()));
    Ok(())
}

pub fn cmd_merge(store: &Path, target: &str, first: &str, second: &str) -> anyhow::Result<()> {
    section("Merge");

    step_run(&format!("Merging {} + {}", first, second));
    let n = CollectionStore::new(store).merge_collections(target, first, second)?;
    step_done(&format!("{} rows in {}", n, target.cyan()));
    Ok(())
}

pub fn cmd_prepare(
    store: &Path,
    collection: &str,
    type_str: &str,
    config: Option<&Path>,
    checkpoint_dir: &Path,
    state: &Path,
) -> anyhow::Result<()> {
    section("Prepare");

    let config: PreprocessingConfig = read_json(config)?;
    let mut pipeline = PreparationPipeline::new(config, checkpoint_dir);
    prepare_collection(&CollectionStore::new(store), &mut pipeline, collection, type_str, state)?;
    print_stage_reports(pipeline.reports());
    println!();
    Ok(())
}

pub fn cmd_train(
    checkpoint_dir: &Path,
    type_str: &str,
    config: Option<&Path>,
    models_prefix: &Path,
) -> anyhow::Result<()> {
    section("Train");

    step_run(&format!("Loading {}-data-rs.npz", type_str));
    let (x, y) = CheckpointStore::new(checkpoint_dir).load_resampled(type_str)?;
    step_done(&format!("{} rows × {} cols", x.nrows(), x.ncols()));

    let config: TrainingConfig = read_json(config)?;
    train_roster(config, &x, &y, models_prefix)?;
    Ok(())
}

pub fn cmd_run(config_path: &Path) -> anyhow::Result<()> {
    let config = RunConfig::from_file(config_path)?;

    if config.steps.report_environment {
        cmd_env();
    }

    let store = CollectionStore::new(&config.store_dir);
    if config.steps.import {
        section("Import");
        for spec in &config.imports {
            step_run(&format!("Importing {}", spec.file.display()));
            let n = store.import_records(&spec.collection, &spec.file, &spec.options())?;
            step_done(&format!("{} rows into {}", n, spec.collection));
        }
        for merge in &config.merges {
            step_run(&format!("Merging {} + {}", merge.first, merge.second));
            let n = store.merge_collections(&merge.target, &merge.first, &merge.second)?;
            step_done(&format!("{} rows in {}", n, merge.target));
        }
    }

    let fit_label = config.preprocessing.fit_type_str.clone();
    let mut pipeline = PreparationPipeline::new(config.preprocessing.clone(), &config.checkpoint_dir);
    let (x, y) = if config.steps.prepare {
        section("Prepare");
        prepare_collection(&store, &mut pipeline, &config.train_collection, &fit_label, &config.state_path)?
    } else {
        section("Resume");
        pipeline.resume(&fit_label)?
    };

    if let Some(test_collection) = &config.test_collection {
        prepare_collection(&store, &mut pipeline, test_collection, "test", &config.state_path)?;
    }
    print_stage_reports(pipeline.reports());

    if config.steps.train {
        section("Train");
        train_roster(config.training.clone(), &x, &y, &config.models_prefix)?;
    }
    Ok(())
}

pub fn cmd_env() {
    section("Environment");
    let report = report_environment();
    for (key, value) in report.lines() {
        println!("  {:<18} {}", muted(key), value.white());
    }
}

/// Load `collection` and run it through `pipeline`; the fitting run writes
/// the fitted state, any other run starts from it when the pipeline is unfitted.
fn prepare_collection(
    store: &CollectionStore,
    pipeline: &mut PreparationPipeline,
    collection: &str,
    type_str: &str,
    state: &Path,
) -> anyhow::Result<(ndarray::Array2<f64>, ndarray::Array1<i64>)> {
    step_run(&format!("Loading {}", collection));
    let table = store.load_collection(collection)?;
    step_done(&table.describe());

    let fit_run = pipeline.config().is_fit_run(type_str);
    if !fit_run && !pipeline.is_fitted() {
        if !state.exists() {
            anyhow::bail!(
                "'{}' run needs the fitted state of the '{}' run, but {} does not exist",
                type_str,
                pipeline.config().fit_type_str,
                state.display()
            );
        }
        step_run(&format!("Loading fitted state {}", state.display()));
        pipeline.load_state(state)?;
        step_done("");
    }

    step_run(&format!("Preparing {}", type_str.cyan()));
    let start = Instant::now();
    let (x, y) = pipeline.process(&table, type_str)?;
    step_done(&format!("{} rows × {} cols in {:?}", x.nrows(), x.ncols(), start.elapsed()));

    if fit_run {
        pipeline.save_state(state)?;
    }
    Ok((x, y))
}

fn train_roster(
    config: TrainingConfig,
    x: &ndarray::Array2<f64>,
    y: &ndarray::Array1<i64>,
    models_prefix: &Path,
) -> anyhow::Result<()> {
    let mut harness = ModelHarness::new(config);

    step_run(&format!("Training {} models", harness.roster_names().len()));
    let start = Instant::now();
    let table = harness.run_models(x, y)?;
    step_done(&format!("{:?}", start.elapsed()));
    print_scores(&table);

    let report = harness.save_models(models_prefix)?;
    print_save_report(&report);
    Ok(())
}
