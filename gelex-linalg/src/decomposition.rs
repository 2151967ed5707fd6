#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! Cholesky factorization (with log-determinant) for the REML
//! covariance `V` and the `X'V^{-1}X` system, plus faer-backed
//! symmetric eigenvalues for GRM diagnostics.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Matrix is not positive definite (pivot {pivot} = {value:.3e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Cholesky factor `A = L L'` of a symmetric positive definite matrix.
///
/// `L` is kept row-major in a flat buffer: row i holds `L[i, 0..=i]`
/// contiguously, which keeps the inner dot products cache friendly.
pub struct CholeskyDecomp {
    n: usize,
    l: Vec<f64>,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    /// Only the lower triangle of `a` is read.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = vec![0.0; n * n];

        for j in 0..n {
            let row_j = j * n;
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[row_j + k] * l[row_j + k];
            }
            let diag = a.get(j, j) - sum;
            if !(diag > 0.0) || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite {
                    pivot: j,
                    value: diag,
                });
            }
            let ljj = diag.sqrt();
            l[row_j + j] = ljj;

            for i in (j + 1)..n {
                let row_i = i * n;
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[row_i + k] * l[row_j + k];
                }
                l[row_i + j] = (a.get(i, j) - sum) / ljj;
            }
        }

        Ok(CholeskyDecomp { n, l })
    }

    /// `log|A| = 2 * sum(log L_ii)`.
    pub fn log_det(&self) -> f64 {
        (0..self.n).map(|i| self.l[i * self.n + i].ln()).sum::<f64>() * 2.0
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);

        // L y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let row = i * n;
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l[row + j] * y[j];
            }
            y[i] = (b[i] - sum) / self.l[row + i];
        }

        // L' x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l[j * n + i] * x[j];
            }
            x[i] = (y[i] - sum) / self.l[i * n + i];
        }

        x
    }

    /// Solve `A X = B` column by column.
    pub fn solve_matrix(&self, b: &DenseMatrix) -> DenseMatrix {
        assert_eq!(b.nrows(), self.n);
        let mut out = DenseMatrix::zeros(b.nrows(), b.ncols());
        for j in 0..b.ncols() {
            let col = self.solve(&b.col(j));
            out.set_col(j, &col);
        }
        out
    }

    /// Compute the inverse of the original matrix A^{-1} = (L L')^{-1}.
    /// The result is exactly symmetric.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.n;
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            e[j] = 1.0;
            let col = self.solve(&e);
            e[j] = 0.0;
            for i in j..n {
                inv.set(i, j, col[i]);
            }
        }
        inv.fill_upper_from_lower();
        inv
    }
}

/// Eigenvalues of a symmetric matrix, sorted in descending order.
pub fn symmetric_eigenvalues(a: &DenseMatrix) -> Result<Vec<f64>, LinalgError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    let mat = a.as_faer();
    let eigen = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = eigen.s();
    let mut evals: Vec<f64> = (0..n).map(|i| s.column_vector().read(i)).collect();
    evals.sort_by(|a, b| b.total_cmp(a));
    Ok(evals)
}

/// Solve a symmetric positive definite system A*x = b using Cholesky.
pub fn solve_spd(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.solve(b))
}

/// Compute the inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cholesky() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        assert!((chol.log_det() - 8.0f64.ln()).abs() < 1e-12);
        let inv = chol.inverse();
        assert!((inv.get(0, 0) - 3.0 / 8.0).abs() < 1e-12);
        assert!((inv.get(0, 1) + 2.0 / 8.0).abs() < 1e-12);
        assert!((inv.get(1, 1) - 4.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = DenseMatrix::from_row_major(3, 3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0]);
        let b = vec![1.0, 2.0, 3.0];
        let x = solve_spd(&a, &b).unwrap();
        let ax = a.mat_vec(&x);
        for i in 0..3 {
            assert!((ax[i] - b[i]).abs() < 1e-10, "ax[{}]={} != {}", i, ax[i], b[i]);
        }
    }

    #[test]
    fn test_log_det() {
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let chol = CholeskyDecomp::new(&a).unwrap();
        assert!((chol.log_det() - 8.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_not_pd() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 3.0, 3.0, 1.0]);
        match CholeskyDecomp::new(&a) {
            Err(LinalgError::NotPositiveDefinite { pivot, .. }) => assert_eq!(pivot, 1),
            _ => panic!("expected NotPositiveDefinite"),
        }
    }

    #[test]
    fn test_eigenvalues() {
        let a = DenseMatrix::from_row_major(2, 2, &[3.0, 1.0, 1.0, 3.0]);
        let evals = symmetric_eigenvalues(&a).unwrap();
        assert!((evals[0] - 4.0).abs() < 1e-10);
        assert!((evals[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_inverse_spd() {
        let a = DenseMatrix::from_row_major(3, 3, &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0]);
        let inv = inverse_spd(&a).unwrap();
        let prod = a.mat_mul(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod.get(i, j) - expected).abs() < 1e-10);
                assert_eq!(inv.get(i, j), inv.get(j, i));
            }
        }
    }

    #[test]
    fn test_solve_matrix() {
        let a = DenseMatrix::from_row_major(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let b = DenseMatrix::from_row_major(2, 2, &[2.0, 4.0, 8.0, 4.0]);
        let x = CholeskyDecomp::new(&a).unwrap().solve_matrix(&b);
        assert!((x.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((x.get(1, 0) - 2.0).abs() < 1e-12);
        assert!((x.get(1, 1) - 1.0).abs() < 1e-12);
    }
}
