//! File-backed document store
//!
//! Each collection is one Parquet file `<root>/<collection>.parquet` holding
//! the `text` and `label` columns of a [`DocumentTable`].

use super::{DocumentTable, LABEL_COLUMN};
use crate::checkpoint::write_atomic;
use crate::error::{AstroturfError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Layout of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Csv,
    /// A single JSON array of objects
    Json,
    /// One JSON object per line
    JsonLines,
}

impl RecordFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "csv" => Ok(RecordFormat::Csv),
            "json" => Ok(RecordFormat::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(RecordFormat::JsonLines),
            other => Err(AstroturfError::Config(format!("unknown record format '{}'", other))),
        }
    }
}

/// Where an imported record's label comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// Read the label from a column of the source
    Column(String),
    /// Every record of the source gets the same label
    Constant(i64),
}

/// How to project a source file onto `(text, label)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub format: RecordFormat,
    pub text_field: String,
    pub label: LabelSource,
}

impl ImportOptions {
    pub fn new(format: RecordFormat, text_field: impl Into<String>, label: LabelSource) -> Self {
        Self {
            format,
            text_field: text_field.into(),
            label,
        }
    }
}

/// Loads records from source files into named collections
pub trait DocumentImporter {
    /// Append the records of `source_file` to `collection`, returning the number imported
    fn import_records(
        &self,
        collection: &str,
        source_file: &Path,
        options: &ImportOptions,
    ) -> Result<usize>;

    /// Replace `target` with the rows of `a` followed by the rows of `b`
    fn merge_collections(&self, target: &str, a: &str, b: &str) -> Result<usize>;
}

/// Projects a stored collection into a [`DocumentTable`]
pub trait TableLoader {
    fn load_collection(&self, collection: &str) -> Result<DocumentTable>;
}

/// Directory of Parquet-backed collections
#[derive(Debug, Clone)]
pub struct CollectionStore {
    root: PathBuf,
}

impl CollectionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{}.parquet", collection))
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collection_path(collection).is_file()
    }

    /// Overwrite a collection with `table`
    pub fn write_collection(&self, collection: &str, table: &DocumentTable) -> Result<()> {
        validate_name(collection)?;
        let path = self.collection_path(collection);
        let mut frame = table.frame().clone();

        write_atomic(&path, |file| {
            ParquetWriter::new(file)
                .finish(&mut frame)
                .map_err(|e| AstroturfError::persistence(&path, e))?;
            Ok(())
        })
    }

    fn read_source(&self, source_file: &Path, options: &ImportOptions) -> Result<DataFrame> {
        let df = match options.format {
            RecordFormat::Csv => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(1000))
                .try_into_reader_with_file_path(Some(source_file.to_path_buf()))?
                .finish()?,
            RecordFormat::Json => JsonReader::new(open(source_file)?).finish()?,
            RecordFormat::JsonLines => JsonReader::new(open(source_file)?)
                .with_json_format(JsonFormat::JsonLines)
                .finish()?,
        };
        Ok(df)
    }
}

impl DocumentImporter for CollectionStore {
    fn import_records(
        &self,
        collection: &str,
        source_file: &Path,
        options: &ImportOptions,
    ) -> Result<usize> {
        validate_name(collection)?;
        let df = self.read_source(source_file, options)?;

        let projected = match &options.label {
            LabelSource::Column(label_field) => {
                DocumentTable::from_frame(&df, &options.text_field, label_field)?
            }
            LabelSource::Constant(label) => {
                let with_label = df
                    .clone()
                    .lazy()
                    .with_column(lit(*label).alias(LABEL_COLUMN))
                    .collect()?;
                DocumentTable::from_frame(&with_label, &options.text_field, LABEL_COLUMN)?
            }
        };

        let imported = drop_empty_text(&projected)?;
        let n_imported = imported.len();

        let merged = if self.contains(collection) {
            self.load_collection(collection)?.concat(&imported)?
        } else {
            imported
        };
        self.write_collection(collection, &merged)?;

        info!(
            collection,
            source = %source_file.display(),
            imported = n_imported,
            skipped = projected.len() - n_imported,
            total = merged.len(),
            "records imported"
        );
        Ok(n_imported)
    }

    fn merge_collections(&self, target: &str, a: &str, b: &str) -> Result<usize> {
        let merged = self.load_collection(a)?.concat(&self.load_collection(b)?)?;
        self.write_collection(target, &merged)?;

        info!(target, first = a, second = b, rows = merged.len(), "collections merged");
        Ok(merged.len())
    }
}

impl TableLoader for CollectionStore {
    fn load_collection(&self, collection: &str) -> Result<DocumentTable> {
        let path = self.collection_path(collection);
        if !path.is_file() {
            return Err(AstroturfError::Data(format!(
                "unknown collection '{}' (expected {})",
                collection,
                path.display()
            )));
        }

        let df = ParquetReader::new(open(&path)?).finish()?;
        DocumentTable::from_frame(&df, super::TEXT_COLUMN, LABEL_COLUMN)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| AstroturfError::Data(format!("{}: {}", path.display(), e)))
}

fn validate_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AstroturfError::Config(format!(
            "invalid collection name '{}'",
            collection
        )))
    }
}

fn drop_empty_text(table: &DocumentTable) -> Result<DocumentTable> {
    let (texts, labels): (Vec<String>, Vec<i64>) = table
        .texts()?
        .into_iter()
        .zip(table.labels()?)
        .filter(|(text, _)| !text.trim().is_empty())
        .unzip();
    DocumentTable::new(texts, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_record_format_names() {
        assert_eq!(RecordFormat::from_name("CSV").unwrap(), RecordFormat::Csv);
        assert_eq!(RecordFormat::from_name("jsonl").unwrap(), RecordFormat::JsonLines);
        assert!(RecordFormat::from_name("xml").is_err());
    }

    #[test]
    fn test_import_csv_with_label_column() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(
            dir.path(),
            "ira.csv",
            "tweet_text,is_troll\nfirst post,1\n,1\nsecond post,0\n",
        );
        let store = CollectionStore::new(dir.path().join("store"));
        let options = ImportOptions::new(
            RecordFormat::Csv,
            "tweet_text",
            LabelSource::Column("is_troll".into()),
        );

        let n = store.import_records("ira_tweets", &source, &options).unwrap();
        assert_eq!(n, 2);

        let table = store.load_collection("ira_tweets").unwrap();
        assert_eq!(table.texts().unwrap(), vec!["first post", "second post"]);
        assert_eq!(table.labels().unwrap().to_vec(), vec![1, 0]);
    }

    #[test]
    fn test_import_jsonl_with_constant_label_appends() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_file(
            dir.path(),
            "events.jsonl",
            "{\"text\": \"game day\", \"id\": 1}\n{\"text\": \"rain again\", \"id\": 2}\n",
        );
        let store = CollectionStore::new(dir.path());
        let options = ImportOptions::new(RecordFormat::JsonLines, "text", LabelSource::Constant(0));

        store.import_records("event_tweets", &source, &options).unwrap();
        store.import_records("event_tweets", &source, &options).unwrap();

        let table = store.load_collection("event_tweets").unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.class_counts().unwrap()[&0], 4);
    }

    #[test]
    fn test_unknown_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());
        let err = store.load_collection("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_invalid_collection_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = CollectionStore::new(dir.path());
        let table = DocumentTable::new(vec!["a".into()], vec![0]).unwrap();
        assert!(matches!(
            store.write_collection("../escape", &table),
            Err(AstroturfError::Config(_))
        ));
    }
}
