//! Durable stage checkpoints
//!
//! Every artifact is written to a temporary file in the destination directory,
//! synced, and renamed into place, so a checkpoint file either holds a
//! complete artifact or does not exist.

use crate::error::{AstroturfError, Result};
use crate::feature_engineering::CsrMatrix;
use ndarray::{Array0, Array1, Array2};
use ndarray_npy::{NpzReader, NpzWriter, WritableElement, WriteDataError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Key used by `numpy.savez` for a single positional array
pub const DEFAULT_ARRAY_KEY: &str = "arr_0";

/// Sparse layout tag stored under the `format` key, as `scipy.sparse.save_npz` does
pub const SPARSE_FORMAT: &[u8; 3] = b"csr";

/// Fixed-width byte string, numpy dtype `|S{N}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteString<const N: usize>([u8; N]);

// SAFETY: `|S{N}` describes exactly N raw bytes per element, which is what
// `write` and `write_slice` emit.
unsafe impl<const N: usize> WritableElement for ByteString<N> {
    fn type_descriptor() -> py_literal::Value {
        py_literal::Value::String(format!("|S{}", N))
    }

    fn write<W: Write>(&self, mut writer: W) -> std::result::Result<(), WriteDataError> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    fn write_slice<W: Write>(slice: &[Self], mut writer: W) -> std::result::Result<(), WriteDataError> {
        for item in slice {
            writer.write_all(&item.0)?;
        }
        Ok(())
    }
}

/// Archive entry for `key`; numpy stores every array as `<key>.npy`
fn entry_name(key: &str) -> String {
    format!("{}.npy", key)
}

/// The four checkpoint artifacts written per pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// Sparse feature matrix after term weighting
    DataTf,
    /// Labels aligned with [`CheckpointKind::DataTf`]
    LabelTf,
    /// Reduced and rebalanced matrix
    DataRs,
    /// Labels aligned with [`CheckpointKind::DataRs`]
    LabelRs,
}

impl CheckpointKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            CheckpointKind::DataTf => "data-tf",
            CheckpointKind::LabelTf => "label-tf",
            CheckpointKind::DataRs => "data-rs",
            CheckpointKind::LabelRs => "label-rs",
        }
    }

    /// File name for a run label, e.g. `train-data-tf.npz`
    pub fn file_name(&self, type_str: &str) -> String {
        format!("{}-{}.npz", type_str, self.suffix())
    }
}

/// Directory holding the checkpoints of one or more pipeline runs
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, type_str: &str, kind: CheckpointKind) -> PathBuf {
        self.dir.join(kind.file_name(type_str))
    }

    pub fn exists(&self, type_str: &str, kind: CheckpointKind) -> bool {
        self.path(type_str, kind).is_file()
    }

    /// Persist the sparse matrix and labels produced by term weighting
    pub fn save_transformed(
        &self,
        type_str: &str,
        matrix: &CsrMatrix,
        labels: &Array1<i64>,
    ) -> Result<()> {
        save_sparse_npz(&self.path(type_str, CheckpointKind::DataTf), matrix)?;
        save_array_npz(&self.path(type_str, CheckpointKind::LabelTf), labels)
    }

    /// Persist the balanced, reduced matrix and its labels
    pub fn save_resampled(
        &self,
        type_str: &str,
        matrix: &Array2<f64>,
        labels: &Array1<i64>,
    ) -> Result<()> {
        save_array_npz(&self.path(type_str, CheckpointKind::DataRs), matrix)?;
        save_array_npz(&self.path(type_str, CheckpointKind::LabelRs), labels)
    }

    pub fn load_transformed(&self, type_str: &str) -> Result<(CsrMatrix, Array1<i64>)> {
        let matrix = load_sparse_npz(&self.path(type_str, CheckpointKind::DataTf))?;
        let labels = load_array_npz(&self.path(type_str, CheckpointKind::LabelTf))?;
        Ok((matrix, labels))
    }

    pub fn load_resampled(&self, type_str: &str) -> Result<(Array2<f64>, Array1<i64>)> {
        let matrix = load_array_npz(&self.path(type_str, CheckpointKind::DataRs))?;
        let labels = load_array_npz(&self.path(type_str, CheckpointKind::LabelRs))?;
        Ok((matrix, labels))
    }
}

/// Write a file atomically: temp file in the target directory, fsync, rename.
///
/// Any failure, including one raised by `write`, is reported as a
/// [`AstroturfError::Persistence`] for `path` and leaves no file behind.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| AstroturfError::persistence(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AstroturfError::persistence(path, e))?;

    write(tmp.as_file_mut()).map_err(|e| match e {
        err @ AstroturfError::Persistence { .. } => err,
        other => AstroturfError::persistence(path, other),
    })?;

    tmp.as_file()
        .sync_all()
        .map_err(|e| AstroturfError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| AstroturfError::persistence(path, e.error))?;

    debug!(path = %path.display(), "checkpoint written");
    Ok(())
}

/// Save a dense array under the `numpy.savez` default key
pub fn save_array_npz<A, D>(path: &Path, array: &ndarray::Array<A, D>) -> Result<()>
where
    A: ndarray_npy::WritableElement,
    D: ndarray::Dimension,
{
    write_atomic(path, |file| {
        let mut npz = NpzWriter::new(file);
        npz.add_array(entry_name(DEFAULT_ARRAY_KEY), array)
            .map_err(|e| AstroturfError::persistence(path, e))?;
        npz.finish().map_err(|e| AstroturfError::persistence(path, e))?;
        Ok(())
    })
}

/// Load a dense array stored under the `numpy.savez` default key
pub fn load_array_npz<A, D>(path: &Path) -> Result<ndarray::Array<A, D>>
where
    A: ndarray_npy::ReadableElement,
    D: ndarray::Dimension,
{
    let mut npz = open_npz(path)?;
    read_entry(&mut npz, path, DEFAULT_ARRAY_KEY)
}

/// Save a CSR matrix in the `scipy.sparse.save_npz` layout: `indices`,
/// `indptr`, `format`, `shape` and `data`
pub fn save_sparse_npz(path: &Path, matrix: &CsrMatrix) -> Result<()> {
    let data = Array1::from_vec(matrix.data().to_vec());
    let indices: Array1<i64> = matrix.indices().iter().map(|&i| i as i64).collect();
    let indptr: Array1<i64> = matrix.indptr().iter().map(|&i| i as i64).collect();
    let shape = Array1::from_vec(vec![matrix.nrows() as i64, matrix.ncols() as i64]);
    let format = Array0::from_elem((), ByteString(*SPARSE_FORMAT));

    write_atomic(path, |file| {
        let persist = |e: ndarray_npy::WriteNpzError| AstroturfError::persistence(path, e);
        let mut npz = NpzWriter::new(file);
        npz.add_array(entry_name("indices"), &indices).map_err(persist)?;
        npz.add_array(entry_name("indptr"), &indptr).map_err(persist)?;
        npz.add_array(entry_name("format"), &format).map_err(persist)?;
        npz.add_array(entry_name("shape"), &shape).map_err(persist)?;
        npz.add_array(entry_name("data"), &data).map_err(persist)?;
        npz.finish().map_err(persist)?;
        Ok(())
    })
}

pub fn load_sparse_npz(path: &Path) -> Result<CsrMatrix> {
    let mut npz = open_npz(path)?;
    let data: Array1<f64> = read_entry(&mut npz, path, "data")?;
    let indices: Array1<i64> = read_entry(&mut npz, path, "indices")?;
    let indptr: Array1<i64> = read_entry(&mut npz, path, "indptr")?;
    let shape: Array1<i64> = read_entry(&mut npz, path, "shape")?;

    if shape.len() != 2 {
        return Err(AstroturfError::persistence(path, "sparse shape must have two entries"));
    }
    let to_usize = |v: i64| {
        usize::try_from(v).map_err(|_| AstroturfError::persistence(path, "negative index"))
    };

    let indices = indices.iter().map(|&v| to_usize(v)).collect::<Result<Vec<_>>>()?;
    let indptr = indptr.iter().map(|&v| to_usize(v)).collect::<Result<Vec<_>>>()?;
    let shape = (to_usize(shape[0])?, to_usize(shape[1])?);

    CsrMatrix::new(shape, indptr, indices, data.to_vec())
}

fn open_npz(path: &Path) -> Result<NpzReader<File>> {
    let file = File::open(path).map_err(|e| AstroturfError::persistence(path, e))?;
    NpzReader::new(file).map_err(|e| AstroturfError::persistence(path, e))
}

/// Read one array, accepting the entry name with or without the `.npy` suffix
fn read_entry<A, D>(npz: &mut NpzReader<File>, path: &Path, key: &str) -> Result<ndarray::Array<A, D>>
where
    A: ndarray_npy::ReadableElement,
    D: ndarray::Dimension,
{
    let names = npz.names().map_err(|e| AstroturfError::persistence(path, e))?;
    let entry = names
        .into_iter()
        .find(|name| name == key || name.strip_suffix(".npy") == Some(key))
        .ok_or_else(|| AstroturfError::persistence(path, format!("missing array '{}'", key)))?;

    npz.by_name(&entry)
        .map_err(|e| AstroturfError::persistence(path, e))
}
