//! Compressed sparse row matrix used for bag-of-terms features

use crate::error::{AstroturfError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// CSR matrix of `f64` values.
///
/// Row `i` occupies `indices[indptr[i]..indptr[i + 1]]` (column ids, strictly
/// increasing) and the matching slice of `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Build from raw CSR arrays, validating their structure
    pub fn new(
        shape: (usize, usize),
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<Self> {
        let (n_rows, n_cols) = shape;

        if indptr.len() != n_rows + 1 {
            return Err(AstroturfError::Shape {
                expected: format!("indptr length = {}", n_rows + 1),
                actual: format!("indptr length = {}", indptr.len()),
            });
        }
        if indices.len() != data.len() {
            return Err(AstroturfError::Shape {
                expected: format!("data length = {}", indices.len()),
                actual: format!("data length = {}", data.len()),
            });
        }
        if indptr.first().copied() != Some(0) || indptr.last().copied() != Some(indices.len()) {
            return Err(AstroturfError::Validation(
                "indptr must start at 0 and end at nnz".to_string(),
            ));
        }

        for row in 0..n_rows {
            let (start, end) = (indptr[row], indptr[row + 1]);
            if start > end {
                return Err(AstroturfError::Validation(format!(
                    "indptr decreases at row {}",
                    row
                )));
            }
            let cols = &indices[start..end];
            if cols.iter().any(|&c| c >= n_cols) {
                return Err(AstroturfError::Validation(format!(
                    "column index out of bounds in row {}",
                    row
                )));
            }
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(AstroturfError::Validation(format!(
                    "column indices not strictly increasing in row {}",
                    row
                )));
            }
        }

        Ok(Self { n_rows, n_cols, indptr, indices, data })
    }

    /// Build from per-row `(column, value)` entries. Entries are sorted per row
    /// and explicit zeros are dropped.
    pub fn from_rows(n_cols: usize, rows: Vec<Vec<(usize, f64)>>) -> Result<Self> {
        let n_rows = rows.len();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);

        for mut row in rows {
            row.sort_by_key(|&(col, _)| col);
            for (col, value) in row {
                if value != 0.0 {
                    indices.push(col);
                    data.push(value);
                }
            }
            indptr.push(indices.len());
        }

        Self::new((n_rows, n_cols), indptr, indices, data)
    }

    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            indptr: vec![0; n_rows + 1],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.n_rows
    }

    pub fn ncols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored (non-zero) entries
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Iterate the stored entries of one row
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.data[start..end].iter().copied())
    }

    /// Short human-readable type/shape description used in stage reports
    pub fn describe(&self) -> String {
        format!("CsrMatrix<f64> {}x{} (nnz={})", self.n_rows, self.n_cols, self.nnz())
    }

    /// Dense product `self · rhs`
    pub fn dot_dense(&self, rhs: &Array2<f64>) -> Result<Array2<f64>> {
        if rhs.nrows() != self.n_cols {
            return Err(AstroturfError::Shape {
                expected: format!("rhs rows = {}", self.n_cols),
                actual: format!("rhs rows = {}", rhs.nrows()),
            });
        }

        let k = rhs.ncols();
        let rows: Vec<Vec<f64>> = (0..self.n_rows)
            .into_par_iter()
            .map(|i| {
                let mut out = vec![0.0; k];
                for (col, value) in self.row(i) {
                    for (o, &r) in out.iter_mut().zip(rhs.row(col).iter()) {
                        *o += value * r;
                    }
                }
                out
            })
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((self.n_rows, k), flat)?)
    }

    /// Dense product `selfᵀ · rhs`
    pub fn t_dot_dense(&self, rhs: &Array2<f64>) -> Result<Array2<f64>> {
        if rhs.nrows() != self.n_rows {
            return Err(AstroturfError::Shape {
                expected: format!("rhs rows = {}", self.n_rows),
                actual: format!("rhs rows = {}", rhs.nrows()),
            });
        }

        // Sequential accumulation keeps the summation order fixed.
        let mut out = Array2::zeros((self.n_cols, rhs.ncols()));
        for i in 0..self.n_rows {
            let rhs_row = rhs.row(i);
            for (col, value) in self.row(i) {
                out.row_mut(col).scaled_add(value, &rhs_row);
            }
        }
        Ok(out)
    }

    /// Population variance of every column
    pub fn column_variances(&self) -> Array1<f64> {
        let mut sums = Array1::<f64>::zeros(self.n_cols);
        let mut sq_sums = Array1::<f64>::zeros(self.n_cols);
        for (&col, &value) in self.indices.iter().zip(self.data.iter()) {
            sums[col] += value;
            sq_sums[col] += value * value;
        }

        let n = self.n_rows.max(1) as f64;
        let mut var = Array1::zeros(self.n_cols);
        for j in 0..self.n_cols {
            let mean = sums[j] / n;
            var[j] = (sq_sums[j] / n - mean * mean).max(0.0);
        }
        var
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for i in 0..self.n_rows {
            for (col, value) in self.row(i) {
                dense[[i, col]] = value;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> CsrMatrix {
        // [[1, 0, 2],
        //  [0, 0, 0],
        //  [0, 3, 0]]
        CsrMatrix::from_rows(
            3,
            vec![vec![(2, 2.0), (0, 1.0)], vec![], vec![(1, 3.0)]],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_sorts_entries() {
        let m = sample();
        assert_eq!(m.indptr(), &[0, 2, 2, 3]);
        assert_eq!(m.indices(), &[0, 2, 1]);
        assert_eq!(m.data(), &[1.0, 2.0, 3.0]);
        assert_eq!(m.nnz(), 3);
    }

    #[test]
    fn test_new_rejects_bad_structure() {
        assert!(CsrMatrix::new((2, 2), vec![0, 1], vec![0], vec![1.0]).is_err());
        assert!(CsrMatrix::new((1, 2), vec![0, 1], vec![5], vec![1.0]).is_err());
        assert!(CsrMatrix::new((1, 3), vec![0, 2], vec![2, 1], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_products_match_dense() {
        let m = sample();
        let dense = m.to_dense();
        let b = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];

        assert_eq!(m.dot_dense(&b).unwrap(), dense.dot(&b));

        let c = array![[1.0], [2.0], [3.0]];
        assert_eq!(m.t_dot_dense(&c).unwrap(), dense.t().dot(&c));
    }

    #[test]
    fn test_column_variances() {
        let m = sample();
        let var = m.column_variances();
        // column 0 = [1, 0, 0] → mean 1/3, var = 1/3 - 1/9
        assert!((var[0] - (1.0 / 3.0 - 1.0 / 9.0)).abs() < 1e-12);
    }

    #[test]
    fn test_describe() {
        assert_eq!(sample().describe(), "CsrMatrix<f64> 3x3 (nnz=3)");
    }
}
