//! Document table → sparse term-weight matrix

use super::{CsrMatrix, TfidfVectorizer};
use crate::data::DocumentTable;
use crate::error::{AstroturfError, Result};
use crate::preprocessing::config::TfidfConfig;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Converts a [`DocumentTable`] into a TF-IDF matrix and its aligned labels.
///
/// The first [`transform`](Self::transform) fits the vocabulary; every later
/// call projects into that same feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTransformer {
    vectorizer: TfidfVectorizer,
}

impl FeatureTransformer {
    pub fn new(config: &TfidfConfig) -> Self {
        Self {
            vectorizer: TfidfVectorizer::from_config(config),
        }
    }

    /// Fit on first use, reuse the fitted vocabulary afterwards
    pub fn transform(&mut self, table: &DocumentTable) -> Result<(CsrMatrix, Array1<i64>)> {
        if self.is_fitted() {
            self.transform_only(table)
        } else {
            self.fit_transform(table)
        }
    }

    /// Refit the vocabulary on `table`, then transform it
    pub fn fit_transform(&mut self, table: &DocumentTable) -> Result<(CsrMatrix, Array1<i64>)> {
        let texts = non_empty_texts(table)?;
        self.vectorizer.fit(&texts)?;
        debug!(
            documents = texts.len(),
            vocabulary = self.vectorizer.n_features(),
            "vocabulary fitted"
        );
        self.project(table, &texts)
    }

    /// Transform with the already fitted vocabulary
    pub fn transform_only(&self, table: &DocumentTable) -> Result<(CsrMatrix, Array1<i64>)> {
        if !self.is_fitted() {
            return Err(AstroturfError::ModelNotFitted);
        }
        let texts = non_empty_texts(table)?;
        self.project(table, &texts)
    }

    fn project(&self, table: &DocumentTable, texts: &[String]) -> Result<(CsrMatrix, Array1<i64>)> {
        let matrix = self.vectorizer.transform(texts)?;
        let labels = table.labels()?;

        if matrix.nrows() != labels.len() {
            return Err(AstroturfError::Shape {
                expected: format!("{} label rows", matrix.nrows()),
                actual: format!("{} label rows", labels.len()),
            });
        }
        Ok((matrix, labels))
    }

    pub fn is_fitted(&self) -> bool {
        self.vectorizer.is_fitted()
    }

    pub fn n_features(&self) -> usize {
        self.vectorizer.n_features()
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }
}

fn non_empty_texts(table: &DocumentTable) -> Result<Vec<String>> {
    if table.is_empty() {
        return Err(AstroturfError::EmptyInput(
            "document table has no rows".to_string(),
        ));
    }
    table.texts()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(texts: &[&str], labels: &[i64]) -> DocumentTable {
        DocumentTable::new(texts.iter().map(|s| s.to_string()).collect(), labels.to_vec()).unwrap()
    }

    #[test]
    fn test_first_call_fits_then_reuses() {
        let mut transformer = FeatureTransformer::new(&TfidfConfig::default());
        let train = table(&["vote early vote often", "sunny weather today"], &[1, 0]);
        let (x, y) = transformer.transform(&train).unwrap();
        assert_eq!(x.nrows(), 2);
        assert_eq!(y.to_vec(), vec![1, 0]);

        let n_features = transformer.n_features();
        let test = table(&["completely unseen words", "vote weather", "sunny"], &[0, 1, 0]);
        let (x_test, y_test) = transformer.transform(&test).unwrap();
        assert_eq!(x_test.ncols(), n_features);
        assert_eq!(x_test.nrows(), y_test.len());
        assert_eq!(x_test.row(0).count(), 0);
    }

    #[test]
    fn test_empty_table() {
        let mut transformer = FeatureTransformer::new(&TfidfConfig::default());
        let empty = table(&[], &[]);
        assert!(matches!(
            transformer.transform(&empty),
            Err(AstroturfError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_transform_only_requires_fit() {
        let transformer = FeatureTransformer::new(&TfidfConfig::default());
        assert!(matches!(
            transformer.transform_only(&table(&["hello there"], &[0])),
            Err(AstroturfError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_fitted_state_serializes() {
        let mut transformer = FeatureTransformer::new(&TfidfConfig::default());
        let docs = table(&["fake news everywhere", "real news here"], &[1, 0]);
        let (x, _) = transformer.transform(&docs).unwrap();

        let json = serde_json::to_string(&transformer).unwrap();
        let restored: FeatureTransformer = serde_json::from_str(&json).unwrap();
        let (x2, _) = restored.transform_only(&docs).unwrap();
        assert_eq!(x.indices(), x2.indices());
        for (a, b) in x.data().iter().zip(x2.data()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
