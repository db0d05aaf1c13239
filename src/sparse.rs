use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{CtmcError, CtmcResult};

/// Compressed sparse row matrix of `f64`.
///
/// Row `i` owns `indices[indptr[i]..indptr[i + 1]]`, sorted by column with
/// duplicates merged.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Build from coordinate triplets, summing repeated `(row, col)` pairs.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> CtmcResult<Self> {
        if rows.len() != cols.len() {
            return Err(CtmcError::ShapeMismatch {
                context: "sparse triplet columns",
                expected: rows.len(),
                actual: cols.len(),
            });
        }
        if rows.len() != vals.len() {
            return Err(CtmcError::ShapeMismatch {
                context: "sparse triplet values",
                expected: rows.len(),
                actual: vals.len(),
            });
        }

        let mut entries = Vec::with_capacity(vals.len());
        for ((&r, &c), &v) in rows.iter().zip(cols).zip(vals) {
            if r >= nrows || c >= ncols {
                return Err(CtmcError::InvalidParameter {
                    name: "sparse index",
                    value: format!("({r}, {c})"),
                    reason: "outside the matrix shape",
                });
            }
            entries.push((r, c, v));
        }
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; nrows + 1];
        let mut indices = Vec::with_capacity(entries.len());
        let mut data = Vec::with_capacity(entries.len());
        let mut prev: Option<(usize, usize)> = None;
        for (r, c, v) in entries {
            if prev == Some((r, c)) {
                if let Some(last) = data.last_mut() {
                    *last += v;
                }
                continue;
            }
            prev = Some((r, c));
            indptr[r + 1] += 1;
            indices.push(c);
            data.push(v);
        }
        for i in 0..nrows {
            indptr[i + 1] += indptr[i];
        }

        Ok(Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        })
    }

    pub fn from_dense(a: ArrayView2<f64>) -> Self {
        let (nrows, ncols) = a.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in a.rows() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    indices.push(j);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Stored entries as `(row, col, value)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.nrows).flat_map(move |i| {
            (self.indptr[i]..self.indptr[i + 1]).map(move |p| (i, self.indices[p], self.data[p]))
        })
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.nrows {
            return 0.0;
        }
        let lo = self.indptr[row];
        let hi = self.indptr[row + 1];
        match self.indices[lo..hi].binary_search(&col) {
            Ok(p) => self.data[lo + p],
            Err(_) => 0.0,
        }
    }

    /// `A · B` for a dense block `B` with `ncols` rows.
    pub fn dot(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.nrows, b.ncols()));
        for i in 0..self.nrows {
            let mut out_row = out.row_mut(i);
            for p in self.indptr[i]..self.indptr[i + 1] {
                out_row.scaled_add(self.data[p], &b.row(self.indices[p]));
            }
        }
        out
    }

    /// `Aᵀ · B` for a dense block `B` with `nrows` rows.
    pub fn tdot(&self, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.ncols, b.ncols()));
        for i in 0..self.nrows {
            let b_row = b.row(i);
            for p in self.indptr[i]..self.indptr[i + 1] {
                out.row_mut(self.indices[p]).scaled_add(self.data[p], &b_row);
            }
        }
        out
    }

    pub fn row_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.nrows);
        for (i, _, v) in self.iter() {
            sums[i] += v;
        }
        sums
    }

    pub fn diagonal(&self) -> Array1<f64> {
        let n = self.nrows.min(self.ncols);
        let mut diag = Array1::zeros(n);
        for (i, j, v) in self.iter() {
            if i == j {
                diag[i] += v;
            }
        }
        diag
    }

    /// Column sums of absolute values of the off-diagonal entries.
    pub fn offdiag_abs_col_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.ncols);
        for (i, j, v) in self.iter() {
            if i != j {
                sums[j] += v.abs();
            }
        }
        sums
    }

    /// Row sums of absolute values of the off-diagonal entries.
    pub fn offdiag_abs_row_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.nrows);
        for (i, j, v) in self.iter() {
            if i != j {
                sums[i] += v.abs();
            }
        }
        sums
    }

    pub fn abs_col_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.ncols);
        for (_, j, v) in self.iter() {
            sums[j] += v.abs();
        }
        sums
    }

    pub fn abs_row_sums(&self) -> Array1<f64> {
        let mut sums = Array1::zeros(self.nrows);
        for (i, _, v) in self.iter() {
            sums[i] += v.abs();
        }
        sums
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.nrows, self.ncols));
        for (i, j, v) in self.iter() {
            out[[i, j]] += v;
        }
        out
    }
}
