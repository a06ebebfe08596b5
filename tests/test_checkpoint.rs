//! Integration test: checkpoint persistence

use astroturf_detect::checkpoint::{
    load_array_npz, write_atomic, CheckpointKind, CheckpointStore, DEFAULT_ARRAY_KEY,
};
use astroturf_detect::feature_engineering::CsrMatrix;
use astroturf_detect::AstroturfError;
use ndarray::{array, Array1, Array2};
use ndarray_npy::NpzReader;
use std::fs::File;
use std::io::Write;

fn sparse() -> CsrMatrix {
    CsrMatrix::from_rows(
        4,
        vec![
            vec![(0, 0.5), (3, 0.25)],
            vec![],
            vec![(1, 1.0), (2, -2.0), (3, 0.125)],
        ],
    )
    .unwrap()
}

#[test]
fn test_checkpoint_names() {
    let store = CheckpointStore::new("/tmp/run");
    let names: Vec<String> = [
        CheckpointKind::DataTf,
        CheckpointKind::LabelTf,
        CheckpointKind::DataRs,
        CheckpointKind::LabelRs,
    ]
    .iter()
    .map(|kind| kind.file_name("train"))
    .collect();

    assert_eq!(
        names,
        vec!["train-data-tf.npz", "train-label-tf.npz", "train-data-rs.npz", "train-label-rs.npz"]
    );
    assert_eq!(
        store.path("test", CheckpointKind::DataRs),
        std::path::PathBuf::from("/tmp/run/test-data-rs.npz")
    );
}

#[test]
fn test_transformed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let labels: Array1<i64> = array![1, 0, 1];

    store.save_transformed("train", &sparse(), &labels).unwrap();
    let (matrix, loaded_labels) = store.load_transformed("train").unwrap();

    assert_eq!(matrix.shape(), (3, 4));
    assert_eq!(matrix.to_dense(), sparse().to_dense());
    assert_eq!(loaded_labels, labels);
}

#[test]
fn test_sparse_file_uses_csr_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    store.save_transformed("train", &sparse(), &array![1, 0, 1]).unwrap();

    let file = File::open(store.path("train", CheckpointKind::DataTf)).unwrap();
    let mut npz = NpzReader::new(file).unwrap();
    let mut names = npz.names().unwrap();
    names.sort();
    assert_eq!(
        names,
        vec!["data.npy", "format.npy", "indices.npy", "indptr.npy", "shape.npy"]
    );

    let shape: Array1<i64> = npz.by_name("shape.npy").unwrap();
    assert_eq!(shape, array![3, 4]);
    let indptr: Array1<i64> = npz.by_name("indptr.npy").unwrap();
    assert_eq!(indptr, array![0, 2, 2, 5]);
}

#[test]
fn test_sparse_file_is_tagged_csr() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    store.save_transformed("test", &sparse(), &array![1, 0, 1]).unwrap();

    // entries are stored uncompressed, so the scalar `|S3` tag is visible in the raw archive
    let bytes = std::fs::read(store.path("test", CheckpointKind::DataTf)).unwrap();
    assert!(bytes.windows(10).any(|w| w == b"format.npy"));
    assert!(bytes.windows(4).any(|w| w == b"|S3"));
    assert!(bytes.windows(4).any(|w| w == b"\ncsr"));

    let (matrix, _) = store.load_transformed("test").unwrap();
    assert_eq!(matrix, sparse());
}

#[test]
fn test_resampled_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    let x = Array2::from_shape_fn((6, 3), |(i, j)| i as f64 - 0.5 * j as f64);
    let y: Array1<i64> = array![0, 0, 0, 1, 1, 1];

    store.save_resampled("test", &x, &y).unwrap();
    let (x2, y2) = store.load_resampled("test").unwrap();
    assert_eq!(x2, x);
    assert_eq!(y2, y);

    let labels: Array1<i64> = load_array_npz(&store.path("test", CheckpointKind::LabelRs)).unwrap();
    assert_eq!(labels, y);
    let file = File::open(store.path("test", CheckpointKind::LabelRs)).unwrap();
    let names = NpzReader::new(file).unwrap().names().unwrap();
    assert_eq!(names, vec![format!("{}.npy", DEFAULT_ARRAY_KEY)]);
}

#[test]
fn test_failed_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train-data-rs.npz");

    let result = write_atomic(&path, |file| {
        file.write_all(b"partial")?;
        Err(AstroturfError::Serialization("encoder failed".to_string()))
    });

    assert!(matches!(result, Err(AstroturfError::Persistence { .. })));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_checkpoint_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());
    assert!(matches!(
        store.load_resampled("train"),
        Err(AstroturfError::Persistence { .. })
    ));
}
