//! gelex-linalg: dense linear algebra for gelex.
//!
//! Thin layer over faer: a column-major `DenseMatrix`, Cholesky with
//! log-determinant, SPD solves and inverses, symmetric eigenvalues.

pub mod decomposition;
pub mod dense;

pub use decomposition::{CholeskyDecomp, LinalgError};
pub use dense::DenseMatrix;
