//! Labeled document collections
//!
//! - [`DocumentTable`] - the text + label table consumed by the preparation pipeline
//! - [`store`] - file-backed collection store implementing the importer and loader traits

pub mod store;

pub use store::{
    CollectionStore, DocumentImporter, ImportOptions, LabelSource, RecordFormat, TableLoader,
};

use crate::error::{AstroturfError, Result};
use ndarray::Array1;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Name of the text column in every [`DocumentTable`]
pub const TEXT_COLUMN: &str = "text";
/// Name of the label column in every [`DocumentTable`]
pub const LABEL_COLUMN: &str = "label";

/// Ordered collection of `(text, label)` records backed by a polars frame.
///
/// The frame always holds exactly two columns, `text` (String) and `label`
/// (Int64), of equal length and without null labels.
#[derive(Debug, Clone)]
pub struct DocumentTable {
    frame: DataFrame,
}

impl DocumentTable {
    /// Build a table from parallel text and label vectors
    pub fn new(texts: Vec<String>, labels: Vec<i64>) -> Result<Self> {
        if texts.len() != labels.len() {
            return Err(AstroturfError::Shape {
                expected: format!("{} labels", texts.len()),
                actual: format!("{} labels", labels.len()),
            });
        }

        let frame = df!(
            TEXT_COLUMN => texts,
            LABEL_COLUMN => labels
        )?;

        Ok(Self { frame })
    }

    /// Project an arbitrary frame onto its text and label columns.
    ///
    /// Labels are cast to Int64; null text becomes the empty string; null
    /// labels are rejected.
    pub fn from_frame(df: &DataFrame, text_col: &str, label_col: &str) -> Result<Self> {
        let text = df
            .column(text_col)
            .map_err(|_| AstroturfError::Data(format!("missing text column '{}'", text_col)))?;
        let label = df
            .column(label_col)
            .map_err(|_| AstroturfError::Data(format!("missing label column '{}'", label_col)))?;

        let label = label.cast(&DataType::Int64)?;
        let null_labels = label.null_count();
        if null_labels > 0 {
            return Err(AstroturfError::Data(format!(
                "{} rows have a null '{}' label",
                null_labels, label_col
            )));
        }

        let text = text.cast(&DataType::String)?;
        let texts: Vec<String> = text
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect();
        let labels: Vec<i64> = label.i64()?.into_iter().flatten().collect();

        Self::new(texts, labels)
    }

    /// Underlying frame (`text`, `label`)
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text column as owned strings, in row order
    pub fn texts(&self) -> Result<Vec<String>> {
        Ok(self
            .frame
            .column(TEXT_COLUMN)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect())
    }

    /// Label column, in row order
    pub fn labels(&self) -> Result<Array1<i64>> {
        let labels: Vec<i64> = self
            .frame
            .column(LABEL_COLUMN)?
            .i64()?
            .into_iter()
            .flatten()
            .collect();

        if labels.len() != self.len() {
            return Err(AstroturfError::Data(
                "label column contains nulls".to_string(),
            ));
        }
        Ok(Array1::from_vec(labels))
    }

    /// Number of rows per label, sorted by label
    pub fn class_counts(&self) -> Result<BTreeMap<i64, usize>> {
        let mut counts = BTreeMap::new();
        for label in self.labels()? {
            *counts.entry(label).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Append the rows of `other` after the rows of `self`
    pub fn concat(&self, other: &DocumentTable) -> Result<Self> {
        let frame = self.frame.vstack(&other.frame)?;
        Ok(Self { frame })
    }

    /// Short type/shape description used in stage reports
    pub fn describe(&self) -> String {
        format!("DocumentTable {} rows", self.len())
    }
}
