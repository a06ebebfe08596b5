//! Preprocessing configuration

use serde::{Deserialize, Serialize};

/// Term-weighting (TF-IDF) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    /// Keep only the most frequent terms (by document frequency)
    pub max_features: Option<usize>,
    /// Minimum number of documents a term must appear in
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in
    pub max_df: f64,
    /// Inclusive n-gram range
    pub ngram_range: (usize, usize),
    /// Use `1 + ln(tf)` instead of raw counts
    pub sublinear_tf: bool,
    /// L2-normalize every row
    pub normalize: bool,
    pub lowercase: bool,
    pub min_token_length: usize,
    /// Drop a built-in list of English stop words
    pub english_stop_words: bool,
    /// Drop URLs and @mentions before tokenizing
    pub strip_social_markup: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: None,
            min_df: 1,
            max_df: 1.0,
            ngram_range: (1, 1),
            sublinear_tf: false,
            normalize: true,
            lowercase: true,
            min_token_length: 2,
            english_stop_words: true,
            strip_social_markup: true,
        }
    }
}

/// Truncated SVD settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvdConfig {
    /// Target rank k
    pub n_components: usize,
    /// Power iterations of the randomized range finder
    pub n_iter: usize,
    /// Extra columns sampled beyond k
    pub n_oversamples: usize,
    pub random_state: u64,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            n_components: 100,
            n_iter: 5,
            n_oversamples: 10,
            random_state: 42,
        }
    }
}

/// Resampling strategy used to correct class imbalance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Synthetic minority oversampling (interpolation between neighbours)
    Smote,
    /// Duplicate random minority rows
    RandomOver,
    /// Drop random majority rows
    RandomUnder,
}

/// Class balancing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub strategy: BalanceStrategy,
    /// Desired minority/majority ratio after resampling
    pub ratio: f64,
    /// Datasets already within this relative distance of `ratio` are left untouched
    pub tolerance: f64,
    /// Neighbours considered by SMOTE
    pub k_neighbors: usize,
    pub random_state: Option<u64>,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::Smote,
            ratio: 1.0,
            tolerance: 0.05,
            k_neighbors: 5,
            random_state: Some(42),
        }
    }
}

/// Run label that fits the vocabulary and projection
pub const DEFAULT_FIT_TYPE_STR: &str = "train";

/// Configuration for the whole feature-preparation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub tfidf: TfidfConfig,
    pub svd: SvdConfig,
    pub balance: BalanceConfig,
    /// Only a run with this label may fit; every other run projects into its feature space
    pub fit_type_str: String,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            tfidf: TfidfConfig::default(),
            svd: SvdConfig::default(),
            balance: BalanceConfig::default(),
            fit_type_str: DEFAULT_FIT_TYPE_STR.to_string(),
        }
    }
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the reduction rank
    pub fn with_rank(mut self, k: usize) -> Self {
        self.svd.n_components = k;
        self
    }

    /// Builder method to set the vocabulary cap
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.tfidf.max_features = Some(n);
        self
    }

    /// Builder method to set the balancing strategy
    pub fn with_balance_strategy(mut self, strategy: BalanceStrategy) -> Self {
        self.balance.strategy = strategy;
        self
    }

    /// Builder method to set the target minority/majority ratio
    pub fn with_balance_ratio(mut self, ratio: f64) -> Self {
        self.balance.ratio = ratio;
        self
    }

    /// Builder method to set the run label that fits the feature space
    pub fn with_fit_type_str(mut self, type_str: impl Into<String>) -> Self {
        self.fit_type_str = type_str.into();
        self
    }

    /// Whether a run labelled `type_str` may fit the vocabulary and projection
    pub fn is_fit_run(&self, type_str: &str) -> bool {
        self.fit_type_str == type_str
    }

    /// Builder method to seed every randomized stage
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.svd.random_state = seed;
        self.balance.random_state = Some(seed);
        self
    }
}
