//! Text tokenization and TF-IDF term weighting

use super::CsrMatrix;
use crate::error::{AstroturfError, Result};
use crate::preprocessing::config::TfidfConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "just", "me", "my", "no", "not", "of", "on", "or", "our", "out", "rt", "she", "so", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "us",
    "was", "we", "were", "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

/// Word tokenizer with optional social-media normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextTokenizer {
    lowercase: bool,
    min_token_length: usize,
    stop_words: BTreeSet<String>,
    strip_social_markup: bool,
}

impl TextTokenizer {
    pub fn new() -> Self {
        Self {
            lowercase: true,
            min_token_length: 2,
            stop_words: BTreeSet::new(),
            strip_social_markup: false,
        }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn with_min_length(mut self, len: usize) -> Self {
        self.min_token_length = len;
        self
    }

    pub fn with_english_stop_words(mut self) -> Self {
        self.stop_words = ENGLISH_STOP_WORDS.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Drop URLs and `@mentions`; hashtags keep their word
    pub fn with_social_markup_stripped(mut self, strip: bool) -> Self {
        self.strip_social_markup = strip;
        self
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let processed = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        processed
            .split_whitespace()
            .filter(|word| !(self.strip_social_markup && is_social_markup(word)))
            .flat_map(|word| word.split(|c: char| !c.is_alphanumeric()))
            .filter(|s| !s.is_empty())
            .filter(|s| s.chars().count() >= self.min_token_length)
            .filter(|s| !self.stop_words.contains(*s))
            .map(|s| s.to_string())
            .collect()
    }
}

impl Default for TextTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_social_markup(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || lower.starts_with('@')
}

/// TF-IDF vectorizer producing sparse rows.
///
/// The vocabulary keeps the `max_features` terms with the highest document
/// frequency (ties broken lexicographically) and assigns columns in
/// alphabetical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    tokenizer: TextTokenizer,
    max_features: Option<usize>,
    min_df: usize,
    max_df: f64,
    ngram_range: (usize, usize),
    sublinear_tf: bool,
    normalize: bool,
    vocabulary: BTreeMap<String, usize>,
    idf: Option<Vec<f64>>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::from_config(&TfidfConfig::default())
    }

    pub fn from_config(config: &TfidfConfig) -> Self {
        let mut tokenizer = TextTokenizer::new()
            .with_lowercase(config.lowercase)
            .with_min_length(config.min_token_length)
            .with_social_markup_stripped(config.strip_social_markup);
        if config.english_stop_words {
            tokenizer = tokenizer.with_english_stop_words();
        }

        let (lo, hi) = config.ngram_range;
        Self {
            tokenizer,
            max_features: config.max_features,
            min_df: config.min_df.max(1),
            max_df: config.max_df,
            ngram_range: (lo.max(1), hi.max(lo.max(1))),
            sublinear_tf: config.sublinear_tf,
            normalize: config.normalize,
            vocabulary: BTreeMap::new(),
            idf: None,
        }
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n);
        self
    }

    pub fn with_ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = (min.max(1), max.max(min.max(1)));
        self
    }

    fn generate_ngrams(&self, tokens: &[String]) -> Vec<String> {
        let mut ngrams = Vec::new();

        for n in self.ngram_range.0..=self.ngram_range.1 {
            if tokens.len() >= n {
                for window in tokens.windows(n) {
                    ngrams.push(window.join(" "));
                }
            }
        }

        ngrams
    }

    fn analyze(&self, document: &str) -> Vec<String> {
        self.generate_ngrams(&self.tokenizer.tokenize(document))
    }

    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        let n_docs = documents.len();
        if n_docs == 0 {
            return Err(AstroturfError::EmptyInput(
                "cannot fit a vocabulary on zero documents".to_string(),
            ));
        }

        let analyzed: Vec<Vec<String>> = documents.par_iter().map(|d| self.analyze(d)).collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for ngrams in &analyzed {
            let unique: HashSet<&String> = ngrams.iter().collect();
            for ngram in unique {
                *doc_freq.entry(ngram.clone()).or_insert(0) += 1;
            }
        }

        let max_df_count = self.max_df * n_docs as f64;
        let mut filtered: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, count)| *count >= self.min_df && *count as f64 <= max_df_count)
            .collect();

        filtered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max_n) = self.max_features {
            filtered.truncate(max_n);
        }

        if filtered.is_empty() {
            return Err(AstroturfError::EmptyInput(format!(
                "vocabulary is empty after filtering {} documents",
                n_docs
            )));
        }

        // BTreeMap iteration is alphabetical, which fixes the column order.
        let terms: BTreeMap<String, usize> = filtered.into_iter().collect();
        let n = n_docs as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (idx, (term, df)) in terms.into_iter().enumerate() {
            idf.push(((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0);
            vocabulary.insert(term, idx);
        }

        self.vocabulary = vocabulary;
        self.idf = Some(idf);
        Ok(())
    }

    pub fn transform(&self, documents: &[String]) -> Result<CsrMatrix> {
        let idf = self.idf.as_ref().ok_or(AstroturfError::ModelNotFitted)?;

        let rows: Vec<Vec<(usize, f64)>> = documents
            .par_iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for ngram in self.analyze(doc) {
                    if let Some(&idx) = self.vocabulary.get(&ngram) {
                        *counts.entry(idx).or_insert(0.0) += 1.0;
                    }
                }

                let mut row: Vec<(usize, f64)> = counts
                    .into_iter()
                    .map(|(idx, tf)| {
                        let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
                        (idx, tf * idf[idx])
                    })
                    .collect();

                if self.normalize {
                    let norm = row.iter().map(|&(_, v)| v * v).sum::<f64>().sqrt();
                    if norm > 0.0 {
                        row.iter_mut().for_each(|(_, v)| *v /= norm);
                    }
                }
                row
            })
            .collect();

        CsrMatrix::from_rows(idf.len(), rows)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<CsrMatrix> {
        self.fit(documents)?;
        self.transform(documents)
    }

    pub fn is_fitted(&self) -> bool {
        self.idf.is_some()
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn idf(&self) -> Option<&[f64]> {
        self.idf.as_deref()
    }

    /// Column index of a term, if it is in the fitted vocabulary
    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    pub fn get_feature_names(&self) -> Vec<String> {
        // Columns are assigned alphabetically, so key order is column order.
        self.vocabulary.keys().cloned().collect()
    }
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenizer() {
        let tokenizer = TextTokenizer::new().with_lowercase(true).with_min_length(2);

        let tokens = tokenizer.tokenize("Hello World! TEST.");
        assert_eq!(tokens, vec!["hello", "world", "test"]);
    }

    #[test]
    fn test_tokenizer_strips_social_markup() {
        let tokenizer = TextTokenizer::new().with_social_markup_stripped(true);

        let tokens = tokenizer.tokenize("RT @someone Vote now https://t.co/xyz #Election2016 www.example.com");
        assert_eq!(tokens, vec!["rt", "vote", "now", "election2016"]);
    }

    #[test]
    fn test_stop_words() {
        let tokenizer = TextTokenizer::new().with_english_stop_words();
        assert_eq!(tokenizer.tokenize("this is the news"), vec!["news"]);
    }

    #[test]
    fn test_vocabulary_is_alphabetical_with_idf() {
        let mut vectorizer = TfidfVectorizer::new();
        vectorizer
            .fit(&docs(&["zebra apple", "apple mango", "apple"]))
            .unwrap();

        assert_eq!(vectorizer.get_feature_names(), vec!["apple", "mango", "zebra"]);
        let idf = vectorizer.idf().unwrap();
        // apple: df = 3 → ln(4/4) + 1
        assert!((idf[0] - 1.0).abs() < 1e-12);
        // mango: df = 1 → ln(4/2) + 1
        assert!((idf[1] - (2.0f64.ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_max_features_ties_are_lexicographic() {
        let mut vectorizer = TfidfVectorizer::new().with_max_features(2);
        vectorizer
            .fit(&docs(&["common delta", "common beta", "common alpha"]))
            .unwrap();

        assert_eq!(vectorizer.get_feature_names(), vec!["alpha", "common"]);
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let mut vectorizer = TfidfVectorizer::new();
        let m = vectorizer
            .fit_transform(&docs(&["machine learning great", "deep learning powerful", "zz"]))
            .unwrap();

        assert_eq!(m.nrows(), 3);
        for i in 0..2 {
            let norm: f64 = m.row(i).map(|(_, v)| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_empty_vocabulary() {
        let mut vectorizer = TfidfVectorizer::new();
        let result = vectorizer.fit(&docs(&["a", "the", "!!"]));
        assert!(matches!(result, Err(AstroturfError::EmptyInput(_))));
    }

    #[test]
    fn test_transform_before_fit() {
        let vectorizer = TfidfVectorizer::new();
        assert!(matches!(
            vectorizer.transform(&docs(&["hello"])),
            Err(AstroturfError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_bigrams() {
        let mut vectorizer = TfidfVectorizer::new().with_ngram_range(1, 2);
        vectorizer.fit(&docs(&["fake news spreads"])).unwrap();
        assert!(vectorizer.term_index("fake news").is_some());
        assert!(vectorizer.term_index("news spreads").is_some());
    }
}
