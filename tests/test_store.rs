//! Integration test: importing, merging and loading collections

use astroturf_detect::data::{
    CollectionStore, DocumentImporter, ImportOptions, LabelSource, RecordFormat, TableLoader,
};
use astroturf_detect::AstroturfError;
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_import_merge_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CollectionStore::new(dir.path().join("store"));

    let troll_csv = write(
        dir.path(),
        "ira.csv",
        "author,content\nacct1,Vote them out #rigged\nacct2,\nacct3,Share before deleted\n",
    );
    let event_jsonl = write(
        dir.path(),
        "events.jsonl",
        "{\"text\": \"Great game tonight\", \"id\": 1}\n{\"text\": \"Traffic on I-95 again\", \"id\": 2}\n",
    );

    let imported_a = store
        .import_records(
            "ira_tweets",
            &troll_csv,
            &ImportOptions::new(RecordFormat::Csv, "content", LabelSource::Constant(1)),
        )
        .unwrap();
    let imported_b = store
        .import_records(
            "event_tweets",
            &event_jsonl,
            &ImportOptions::new(RecordFormat::JsonLines, "text", LabelSource::Constant(0)),
        )
        .unwrap();

    // the row with empty content is dropped
    assert_eq!(imported_a, 2);
    assert_eq!(imported_b, 2);

    let merged = store
        .merge_collections("merged_tweets", "ira_tweets", "event_tweets")
        .unwrap();
    assert_eq!(merged, 4);

    let table = store.load_collection("merged_tweets").unwrap();
    assert_eq!(
        table.texts().unwrap(),
        vec![
            "Vote them out #rigged",
            "Share before deleted",
            "Great game tonight",
            "Traffic on I-95 again",
        ]
    );
    assert_eq!(table.labels().unwrap().to_vec(), vec![1, 1, 0, 0]);
}

#[test]
fn test_repeated_imports_append() {
    let dir = tempfile::tempdir().unwrap();
    let store = CollectionStore::new(dir.path());
    let options = ImportOptions::new(RecordFormat::Json, "body", LabelSource::Column("is_troll".into()));

    let first = write(
        dir.path(),
        "reddit-1.json",
        r#"[{"body": "first comment", "is_troll": 1}, {"body": "second", "is_troll": 0}]"#,
    );
    let second = write(dir.path(), "reddit-2.json", r#"[{"body": "third", "is_troll": 0}]"#);

    store.import_records("old_reddit", &first, &options).unwrap();
    store.import_records("old_reddit", &second, &options).unwrap();

    let table = store.load_collection("old_reddit").unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.class_counts().unwrap().get(&0), Some(&2));
}

#[test]
fn test_unknown_collection_names_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = CollectionStore::new(dir.path());

    match store.load_collection("recent_tweets") {
        Err(AstroturfError::Data(message)) => assert!(message.contains("recent_tweets")),
        other => panic!("expected a data error, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_merge_with_missing_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = CollectionStore::new(dir.path());
    let source = write(dir.path(), "a.csv", "text,label\nhello world,1\n");
    store
        .import_records(
            "a",
            &source,
            &ImportOptions::new(RecordFormat::Csv, "text", LabelSource::Column("label".into())),
        )
        .unwrap();

    assert!(store.merge_collections("ab", "a", "b").is_err());
    assert!(!store.contains("ab"));
}
