#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major `Mat<f64>` with the handful of operations
//! the REML loop, the GRM accumulator and the association scan need:
//! matrix-vector products, symmetric rank-k updates, traces and
//! column access.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
///
/// Column-major layout, so `from_col_major` maps directly onto the binary
/// GRM and standardized-genotype files.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a dense matrix from a flat slice in column-major order.
    pub fn from_col_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Create a dense matrix from a flat slice in row-major order.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        let inner = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
        Self { inner }
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Get a reference to the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product: self' * v.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        (0..self.ncols())
            .map(|j| {
                let mut s = 0.0;
                for i in 0..self.nrows() {
                    s += self.inner.read(i, j) * v[i];
                }
                s
            })
            .collect()
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        let result = &self.inner * &other.inner;
        DenseMatrix { inner: result }
    }

    /// Transpose.
    pub fn transpose(&self) -> DenseMatrix {
        let inner = self.inner.transpose().to_owned();
        DenseMatrix { inner }
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Set an entire column from a slice.
    pub fn set_col(&mut self, j: usize, data: &[f64]) {
        assert_eq!(data.len(), self.nrows());
        for i in 0..self.nrows() {
            self.inner.write(i, j, data[i]);
        }
    }

    /// In-place `self += s * other`.
    pub fn add_scaled(&mut self, other: &DenseMatrix, s: f64) {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j) + s * other.inner.read(i, j);
                self.inner.write(i, j, v);
            }
        }
    }

    /// In-place `self[i,i] += value` for every i.
    pub fn add_diagonal(&mut self, value: f64) {
        let n = self.nrows().min(self.ncols());
        for i in 0..n {
            let v = self.inner.read(i, i) + value;
            self.inner.write(i, i, v);
        }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * s
        });
        DenseMatrix { inner }
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.inner.read(i, i)).collect()
    }

    /// Sum of the diagonal.
    pub fn trace(&self) -> f64 {
        self.diag().iter().sum()
    }

    /// `tr(self * other)` without forming the product.
    pub fn trace_of_product(&self, other: &DenseMatrix) -> f64 {
        assert_eq!(self.ncols(), other.nrows());
        assert_eq!(self.nrows(), other.ncols());
        let mut sum = 0.0;
        for i in 0..self.nrows() {
            for k in 0..self.ncols() {
                sum += self.inner.read(i, k) * other.inner.read(k, i);
            }
        }
        sum
    }

    /// Symmetric rank-k update of the lower triangle: `self += z * z'`.
    ///
    /// Only the lower triangle (i >= j) is written; call
    /// [`DenseMatrix::fill_upper_from_lower`] once accumulation is done.
    pub fn syrk_lower(&mut self, z: &DenseMatrix) {
        assert_eq!(self.nrows(), z.nrows());
        assert_eq!(self.nrows(), self.ncols());
        let zzt = z.inner.as_ref() * z.inner.transpose();
        let n = self.nrows();
        for j in 0..n {
            for i in j..n {
                let v = self.inner.read(i, j) + zzt.read(i, j);
                self.inner.write(i, j, v);
            }
        }
    }

    /// Mirror the lower triangle into the upper triangle.
    pub fn fill_upper_from_lower(&mut self) {
        let n = self.nrows();
        for j in 0..n {
            for i in (j + 1)..n {
                let v = self.inner.read(i, j);
                self.inner.write(j, i, v);
            }
        }
    }

    /// Frobenius norm.
    pub fn frobenius_norm(&self) -> f64 {
        let mut sum = 0.0;
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let v = self.inner.read(i, j);
                sum += v * v;
            }
        }
        sum.sqrt()
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = DenseMatrix::identity(3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.trace(), 3.0);
    }

    #[test]
    fn test_mat_vec_and_transpose() {
        let a = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(a.mat_vec(&[1.0, 0.0, 1.0]), vec![4.0, 10.0]);
        assert_eq!(a.t_mat_vec(&[1.0, 1.0]), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_mat_mul() {
        let a = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = DenseMatrix::from_row_major(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.mat_mul(&b);
        assert!((c.get(0, 0) - 58.0).abs() < 1e-10);
        assert!((c.get(0, 1) - 64.0).abs() < 1e-10);
        assert!((c.get(1, 0) - 139.0).abs() < 1e-10);
        assert!((c.get(1, 1) - 154.0).abs() < 1e-10);
    }

    #[test]
    fn test_syrk_lower_matches_product() {
        let z = DenseMatrix::from_col_major(3, 2, &[1.0, -1.0, 0.5, 2.0, 0.0, -1.0]);
        let mut k = DenseMatrix::zeros(3, 3);
        k.syrk_lower(&z);
        k.syrk_lower(&z);
        k.fill_upper_from_lower();
        let expected = z.mat_mul(&z.transpose()).scale(2.0);
        for i in 0..3 {
            for j in 0..3 {
                assert!((k.get(i, j) - expected.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_trace_of_product() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DenseMatrix::from_row_major(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        assert!((a.trace_of_product(&b) - a.mat_mul(&b).trace()).abs() < 1e-12);
    }
}
