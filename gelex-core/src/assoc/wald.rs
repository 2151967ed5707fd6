//! Wald tests of marker effects against a fitted null model.
//!
//! With `r = y − Xβ̂` and the null covariance `V`:
//!   β̂_j = z_j'V⁻¹r / z_j'V⁻¹z_j,   se_j = 1 / sqrt(z_j'V⁻¹z_j)
//! and the two-sided p-value `2Φ(−|β̂/se|)`. `V⁻¹r` is computed once and
//! `V⁻¹Z` once per chunk.

use gelex_linalg::DenseMatrix;
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use statrs::function::erf::erfc;

use crate::reml::RemlFit;

/// Precision below which a marker carries no information.
pub const MIN_PRECISION: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaldResult {
    pub beta: f64,
    pub se: f64,
    pub chisq: f64,
    pub p: f64,
}

impl WaldResult {
    /// Result reported for monomorphic or uninformative markers.
    pub fn untestable() -> Self {
        Self {
            beta: 0.0,
            se: f64::NAN,
            chisq: 0.0,
            p: 1.0,
        }
    }

    pub fn from_score(numerator: f64, denominator: f64) -> Self {
        if !(denominator > MIN_PRECISION) {
            return Self::untestable();
        }
        let beta = numerator / denominator;
        let se = (1.0 / denominator).sqrt();
        let t = beta / se;
        Self {
            beta,
            se,
            chisq: t * t,
            p: two_sided_p(t),
        }
    }
}

/// `2Φ(−|t|)`.
pub fn two_sided_p(t: f64) -> f64 {
    erfc(t.abs() / std::f64::consts::SQRT_2)
}

/// Additive and dominance effects tested jointly (2 df).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointResult {
    pub beta_a: f64,
    pub se_a: f64,
    pub beta_d: f64,
    pub se_d: f64,
    pub chisq: f64,
    pub p: f64,
}

impl JointResult {
    pub fn untestable() -> Self {
        Self {
            beta_a: 0.0,
            se_a: f64::NAN,
            beta_d: 0.0,
            se_d: f64::NAN,
            chisq: 0.0,
            p: 1.0,
        }
    }

    /// Solve the 2x2 system `M β = b`, `M = [aa ad; ad dd]`.
    pub fn from_scores(b: [f64; 2], aa: f64, ad: f64, dd: f64) -> Self {
        let det = aa * dd - ad * ad;
        if !(aa > MIN_PRECISION) || !(dd > MIN_PRECISION) || !(det > MIN_PRECISION * aa.max(dd)) {
            return Self::untestable();
        }
        let inv = [dd / det, -ad / det, aa / det];
        let beta_a = inv[0] * b[0] + inv[1] * b[1];
        let beta_d = inv[1] * b[0] + inv[2] * b[1];
        let chisq = b[0] * beta_a + b[1] * beta_d;
        let p = match ChiSquared::new(2.0) {
            Ok(dist) => dist.sf(chisq),
            Err(_) => f64::NAN,
        };
        Self {
            beta_a,
            se_a: inv[0].sqrt(),
            beta_d,
            se_d: inv[2].sqrt(),
            chisq,
            p,
        }
    }
}

/// Null-model quantities shared by every marker.
pub struct WaldTest {
    v_inv: DenseMatrix,
    vinv_resid: Vec<f64>,
}

impl WaldTest {
    /// Take ownership of `V⁻¹` from the fit.
    pub fn new(fit: RemlFit, y: &[f64], x: &DenseMatrix) -> Self {
        let vinv_resid = fit.vinv_residual(y, x);
        Self {
            v_inv: fit.v_inv,
            vinv_resid,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.vinv_resid.len()
    }

    pub fn v_inv(&self) -> &DenseMatrix {
        &self.v_inv
    }

    /// Test every column of the column-major chunk `z` (`n x k`).
    /// Columns flagged in `skip` are reported as untestable.
    pub fn test_chunk(
        &self,
        z: &[f64],
        k: usize,
        skip: &(dyn Fn(usize) -> bool + Sync),
    ) -> Vec<WaldResult> {
        let n = self.n_samples();
        let zm = DenseMatrix::from_col_major(n, k, z);
        let w = self.v_inv.mat_mul(&zm);
        (0..k)
            .into_par_iter()
            .map(|j| {
                if skip(j) {
                    return WaldResult::untestable();
                }
                let zj = &z[j * n..(j + 1) * n];
                let wj = w.col(j);
                WaldResult::from_score(
                    DenseMatrix::dot(zj, &self.vinv_resid),
                    DenseMatrix::dot(zj, &wj),
                )
            })
            .collect()
    }

    /// Joint additive+dominance test of matching columns of two chunks.
    pub fn test_joint_chunk(
        &self,
        add: &[f64],
        dom: &[f64],
        k: usize,
        skip: &(dyn Fn(usize) -> bool + Sync),
    ) -> Vec<JointResult> {
        let n = self.n_samples();
        let wa = self.v_inv.mat_mul(&DenseMatrix::from_col_major(n, k, add));
        let wd = self.v_inv.mat_mul(&DenseMatrix::from_col_major(n, k, dom));
        (0..k)
            .into_par_iter()
            .map(|j| {
                if skip(j) {
                    return JointResult::untestable();
                }
                let a = &add[j * n..(j + 1) * n];
                let d = &dom[j * n..(j + 1) * n];
                let wa_j = wa.col(j);
                let wd_j = wd.col(j);
                JointResult::from_scores(
                    [
                        DenseMatrix::dot(a, &self.vinv_resid),
                        DenseMatrix::dot(d, &self.vinv_resid),
                    ],
                    DenseMatrix::dot(a, &wa_j),
                    DenseMatrix::dot(a, &wd_j),
                    DenseMatrix::dot(d, &wd_j),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_score_is_consistent() {
        let r = WaldResult::from_score(3.0, 4.0);
        assert_eq!(r.beta, 0.75);
        assert_eq!(r.se, 0.5);
        assert!((r.chisq - 2.25).abs() < 1e-12);
        assert!((r.p - two_sided_p(1.5)).abs() < 1e-15);
        assert!((two_sided_p(1.959963984540054) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_untestable_marker() {
        let r = WaldResult::from_score(1.0, 0.0);
        assert_eq!(r.beta, 0.0);
        assert!(r.se.is_nan());
        assert_eq!(r.p, 1.0);
    }

    #[test]
    fn test_joint_reduces_to_independent() {
        let j = JointResult::from_scores([2.0, 3.0], 4.0, 0.0, 9.0);
        assert!((j.beta_a - 0.5).abs() < 1e-12);
        assert!((j.beta_d - 1.0 / 3.0).abs() < 1e-12);
        assert!((j.chisq - (1.0 + 1.0)).abs() < 1e-12);
        assert!((j.p - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_chunk_with_identity_covariance() {
        let fit = RemlFit {
            sigma: vec![1.0],
            sigma_se: vec![0.0],
            h2: vec![],
            h2_se: vec![],
            beta: vec![0.0],
            v_inv: DenseMatrix::identity(4),
            loglike: 0.0,
            iterations: 0,
            converged: true,
        };
        let y = vec![1.0, -1.0, 2.0, 0.0];
        let x = DenseMatrix::from_col_major(4, 1, &[1.0; 4]);
        let test = WaldTest::new(fit, &y, &x);
        let z = [1.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let results = test.test_chunk(&z, 2, &|_| false);
        assert_eq!(results[0].beta, 1.0);
        assert_eq!(results[1].beta, 0.0);
        assert!(results[1].se.is_nan());
        assert_eq!(results[1].p, 1.0);
    }
}
