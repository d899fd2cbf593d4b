//! Compressed Sparse Row (CSR) matrix format
//!
//! CSR format stores:
//! - `values`: Non-zero entries in row-major order
//! - `col_indices`: Column index for each value
//! - `row_ptrs`: Index into values/col_indices where each row starts
//!
//! Besides the products needed by the cycle, this module provides the
//! sparse-sparse kernels the producers rely on: transpose and the
//! matrix product used for the Galerkin operator.

use crate::traits::{ComplexField, LinearOperator};
use ndarray::{Array1, Array2};
use num_traits::{ToPrimitive, Zero};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Row count above which the parallel matvec is used
#[cfg(feature = "rayon")]
const PARALLEL_ROWS: usize = 256;

/// Compressed Sparse Row (CSR) matrix format
#[derive(Debug, Clone)]
pub struct CsrMatrix<T: ComplexField> {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in row-major order
    pub values: Vec<T>,
    /// Column indices for each value, sorted within a row
    pub col_indices: Vec<usize>,
    /// Row pointers: row_ptrs[i] is the start index in values/col_indices for row i
    pub row_ptrs: Vec<usize>,
}

impl<T: ComplexField> CsrMatrix<T> {
    /// Create a new empty CSR matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Create a CSR matrix from COO triplets `(row, col, value)`.
    ///
    /// Duplicate entries are summed; column indices end up sorted per row.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_unstable_by_key(|&(i, j, _)| (i, j));

        let mut row_ptrs = vec![0usize; num_rows + 1];
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (i, j, v) in triplets {
            debug_assert!(i < num_rows && j < num_cols, "triplet ({i}, {j}) out of bounds");
            if last == Some((i, j)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            col_indices.push(j);
            values.push(v);
            row_ptrs[i + 1] += 1;
            last = Some((i, j));
        }

        for i in 0..num_rows {
            row_ptrs[i + 1] += row_ptrs[i];
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Create identity matrix in CSR format
    pub fn identity(n: usize) -> Self {
        Self::from_diagonal(&Array1::from_elem(n, T::one()))
    }

    /// Create diagonal matrix from vector
    pub fn from_diagonal(diag: &Array1<T>) -> Self {
        let n = diag.len();
        Self {
            num_rows: n,
            num_cols: n,
            values: diag.to_vec(),
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Get the range of indices in values/col_indices for a given row
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Get the (col, value) pairs for a row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Get element at (i, j), returns 0 if not stored
    pub fn get(&self, i: usize, j: usize) -> T {
        let range = self.row_range(i);
        match self.col_indices[range.clone()].binary_search(&j) {
            Ok(pos) => self.values[range.start + pos],
            Err(_) => T::zero(),
        }
    }

    /// Extract diagonal elements
    pub fn diagonal(&self) -> Array1<T> {
        let n = self.num_rows.min(self.num_cols);
        Array1::from_iter((0..n).map(|i| self.get(i, i)))
    }

    /// Matrix-vector product: y = A * x
    ///
    /// Runs row-parallel when the `rayon` feature is enabled and the matrix
    /// is large enough.
    pub fn matvec(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");

        #[cfg(feature = "rayon")]
        {
            if self.num_rows >= PARALLEL_ROWS {
                let rows: Vec<T> = (0..self.num_rows)
                    .into_par_iter()
                    .map(|i| self.row_dot(i, x))
                    .collect();
                return Array1::from_vec(rows);
            }
        }

        Array1::from_iter((0..self.num_rows).map(|i| self.row_dot(i, x)))
    }

    #[inline]
    fn row_dot(&self, row: usize, x: &Array1<T>) -> T {
        self.row_entries(row)
            .fold(T::zero(), |acc, (j, a)| acc + a * x[j])
    }

    /// Transpose matrix-vector product: y = A^T * x
    pub fn matvec_transpose(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_rows, "Input vector size mismatch");

        let mut y = Array1::from_elem(self.num_cols, T::zero());
        for i in 0..self.num_rows {
            let xi = x[i];
            for (j, a) in self.row_entries(i) {
                y[j] += a * xi;
            }
        }
        y
    }

    /// Explicit transpose
    pub fn transpose(&self) -> CsrMatrix<T> {
        let mut row_ptrs = vec![0usize; self.num_cols + 1];
        for &j in &self.col_indices {
            row_ptrs[j + 1] += 1;
        }
        for j in 0..self.num_cols {
            row_ptrs[j + 1] += row_ptrs[j];
        }

        let mut next = row_ptrs.clone();
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![T::zero(); self.nnz()];
        for i in 0..self.num_rows {
            for (j, a) in self.row_entries(i) {
                let slot = next[j];
                col_indices[slot] = i;
                values[slot] = a;
                next[j] += 1;
            }
        }

        CsrMatrix {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Sparse matrix product `self * other`
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions differ.
    pub fn matmul(&self, other: &CsrMatrix<T>) -> CsrMatrix<T> {
        assert_eq!(
            self.num_cols, other.num_rows,
            "Inner dimensions do not match: {} vs {}",
            self.num_cols, other.num_rows
        );

        let mut row_ptrs = Vec::with_capacity(self.num_rows + 1);
        row_ptrs.push(0);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();

        // Dense accumulator indexed by output column, with the list of touched columns
        let mut accumulator = vec![T::zero(); other.num_cols];
        let mut occupied = vec![false; other.num_cols];
        let mut touched: Vec<usize> = Vec::new();

        for i in 0..self.num_rows {
            for (k, a_ik) in self.row_entries(i) {
                for (j, b_kj) in other.row_entries(k) {
                    if !occupied[j] {
                        occupied[j] = true;
                        touched.push(j);
                    }
                    accumulator[j] += a_ik * b_kj;
                }
            }

            touched.sort_unstable();
            for &j in &touched {
                col_indices.push(j);
                values.push(accumulator[j]);
                accumulator[j] = T::zero();
                occupied[j] = false;
            }
            touched.clear();
            row_ptrs.push(col_indices.len());
        }

        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: other.num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Convert to dense matrix (for small matrices only)
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());
        for i in 0..self.num_rows {
            for (j, a) in self.row_entries(i) {
                dense[[i, j]] = a;
            }
        }
        dense
    }

    /// Write the matrix in Matrix Market coordinate format (1-based indices).
    ///
    /// Entries are written as `real` unless some value has an imaginary part.
    pub fn write_matrix_market<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let is_complex = self.values.iter().any(|v| !v.im().is_zero());
        let field = if is_complex { "complex" } else { "real" };

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "%%MatrixMarket matrix coordinate {field} general")?;
        writeln!(out, "{} {} {}", self.num_rows, self.num_cols, self.nnz())?;
        for i in 0..self.num_rows {
            for (j, a) in self.row_entries(i) {
                let re = a.re().to_f64().unwrap_or(f64::NAN);
                if is_complex {
                    let im = a.im().to_f64().unwrap_or(f64::NAN);
                    writeln!(out, "{} {} {:.16e} {:.16e}", i + 1, j + 1, re, im)?;
                } else {
                    writeln!(out, "{} {} {:.16e}", i + 1, j + 1, re)?;
                }
            }
        }
        out.flush()
    }
}

impl<T: ComplexField> LinearOperator<T> for CsrMatrix<T> {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn apply(&self, x: &Array1<T>) -> Array1<T> {
        self.matvec(x)
    }

    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T> {
        self.matvec_transpose(x)
    }
}
