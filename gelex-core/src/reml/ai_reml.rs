//! Average Information REML for variance components.
//!
//! Model: `y = Xβ + Σ g_k + e` with `g_k ~ N(0, σ²_k K_k)` and
//! `e ~ N(0, σ²_e I)`. With `V = Σ σ²_k K_k + σ²_e I` and
//! `P = V⁻¹ − V⁻¹X(X'V⁻¹X)⁻¹X'V⁻¹`, each iteration computes
//!
//!   s_k    = −0.5·tr(P K_k) + 0.5·y'P K_k P y
//!   A_{kl} =  0.5·y'P K_k P K_l P y
//!
//! and moves `σ ← σ + A⁻¹ s`. The residual component uses `K = I`.
//! Matrices are dense; `V` is factorized by Cholesky every iteration.

use anyhow::{Context, Result};
use gelex_geno::GelexError;
use gelex_linalg::decomposition::solve_spd;
use gelex_linalg::{CholeskyDecomp, DenseMatrix};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::util::math;

/// Change in log-likelihood below which the fit may stop.
const LOGLIKE_TOL: f64 = 1e-4;
/// Components are held at or above this fraction of `var(y)`.
const FLOOR_FRACTION: f64 = 1e-6;
const MAX_HALVINGS: usize = 10;

#[derive(Debug, Clone)]
pub struct RemlConfig {
    pub max_iter: usize,
    /// Bound on `‖Δσ‖ / ‖σ‖`.
    pub tol: f64,
    /// Take one EM step before the first AI step.
    pub em_init: bool,
}

impl Default for RemlConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-8,
            em_init: true,
        }
    }
}

impl RemlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(GelexError::config("REML needs at least one iteration").into());
        }
        if !(self.tol > 0.0) {
            return Err(GelexError::config("REML tolerance must be positive").into());
        }
        Ok(())
    }
}

/// A converged (or exhausted) REML fit.
#[derive(Debug, Clone)]
pub struct RemlFit {
    /// Variance components: one per GRM, residual last.
    pub sigma: Vec<f64>,
    /// Standard errors from the inverse AI matrix.
    pub sigma_se: Vec<f64>,
    /// `σ²_k / Σσ²` per GRM.
    pub h2: Vec<f64>,
    pub h2_se: Vec<f64>,
    /// GLS fixed effects `(X'V⁻¹X)⁻¹X'V⁻¹y`.
    pub beta: Vec<f64>,
    pub v_inv: DenseMatrix,
    pub loglike: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl RemlFit {
    /// `V⁻¹(y − Xβ)`.
    pub fn vinv_residual(&self, y: &[f64], x: &DenseMatrix) -> Vec<f64> {
        let xb = x.mat_vec(&self.beta);
        let r: Vec<f64> = y.iter().zip(&xb).map(|(a, b)| a - b).collect();
        self.v_inv.mat_vec(&r)
    }
}

/// Quantities of one evaluation at fixed `σ`.
struct Evaluation {
    v_inv: DenseMatrix,
    beta: Vec<f64>,
    loglike: f64,
    /// `tr(P K_k)` per component.
    traces: Vec<f64>,
    /// `y'P K_k P y` per component.
    quad: Vec<f64>,
    ai: DenseMatrix,
}

impl Evaluation {
    fn score(&self) -> Vec<f64> {
        self.traces
            .iter()
            .zip(&self.quad)
            .map(|(t, q)| -0.5 * t + 0.5 * q)
            .collect()
    }
}

fn kernel_times(grms: &[DenseMatrix], k: usize, v: &[f64]) -> Vec<f64> {
    if k < grms.len() {
        grms[k].mat_vec(v)
    } else {
        v.to_vec()
    }
}

fn evaluate(y: &[f64], x: &DenseMatrix, grms: &[DenseMatrix], sigma: &[f64]) -> Result<Evaluation> {
    let n = y.len();
    let r = sigma.len();

    let mut v = DenseMatrix::zeros(n, n);
    for (k, grm) in grms.iter().enumerate() {
        v.add_scaled(grm, sigma[k]);
    }
    v.add_diagonal(sigma[r - 1]);
    let chol_v = CholeskyDecomp::new(&v).context("V is not positive definite")?;
    let v_inv = chol_v.inverse();

    let vinv_x = v_inv.mat_mul(x);
    let xtvx = x.transpose().mat_mul(&vinv_x);
    let chol_x = CholeskyDecomp::new(&xtvx).context("X'V^-1X is not positive definite")?;
    let beta = chol_x.solve(&vinv_x.t_mat_vec(y));

    // P = V⁻¹ − V⁻¹X (X'V⁻¹X)⁻¹ X'V⁻¹
    let correction = vinv_x.mat_mul(&chol_x.solve_matrix(&vinv_x.transpose()));
    let mut p = v_inv.clone();
    p.add_scaled(&correction, -1.0);

    let py = p.mat_vec(y);
    let ypy = DenseMatrix::dot(y, &py);
    let loglike = -0.5 * (chol_v.log_det() + chol_x.log_det() + ypy);

    let traces: Vec<f64> = (0..r)
        .map(|k| {
            if k < grms.len() {
                p.trace_of_product(&grms[k])
            } else {
                p.trace()
            }
        })
        .collect();

    let dvpy: Vec<Vec<f64>> = (0..r).map(|k| kernel_times(grms, k, &py)).collect();
    let quad: Vec<f64> = dvpy.iter().map(|d| DenseMatrix::dot(&py, d)).collect();
    let p_dvpy: Vec<Vec<f64>> = dvpy.par_iter().map(|d| p.mat_vec(d)).collect();

    let mut ai = DenseMatrix::zeros(r, r);
    for k in 0..r {
        for l in k..r {
            let a = 0.5 * DenseMatrix::dot(&dvpy[k], &p_dvpy[l]);
            ai.set(k, l, a);
            ai.set(l, k, a);
        }
    }

    Ok(Evaluation {
        v_inv,
        beta,
        loglike,
        traces,
        quad,
        ai,
    })
}

/// One EM update `σ² + σ⁴ (y'PKPy − tr(PK)) / n`.
fn em_step(eval: &Evaluation, sigma: &[f64], n: usize) -> Vec<f64> {
    sigma
        .iter()
        .zip(eval.traces.iter().zip(&eval.quad))
        .map(|(&s, (&t, &q))| s + s * s * (q - t) / n as f64)
        .collect()
}

/// Hold components at `floor`, taking the deficit from the others.
/// Returns the number of constrained components.
fn constrain(sigma: &mut [f64], floor: f64) -> Result<usize> {
    let mut deficit = 0.0;
    let mut constrained = vec![false; sigma.len()];
    for (s, c) in sigma.iter_mut().zip(constrained.iter_mut()) {
        if *s < floor {
            deficit += floor - *s;
            *s = floor;
            *c = true;
        }
    }
    let n_constrained = constrained.iter().filter(|&&c| c).count();
    if n_constrained == 0 {
        return Ok(0);
    }
    let free = sigma.len() - n_constrained;
    if free == 0 {
        return Err(GelexError::numerical("every variance component hit the lower bound").into());
    }
    let share = deficit / free as f64;
    for (s, &c) in sigma.iter_mut().zip(&constrained) {
        if !c {
            *s -= share;
            if *s < floor {
                return Err(GelexError::numerical(
                    "no positive variance components remain after constraining",
                )
                .into());
            }
        }
    }
    Ok(n_constrained)
}

/// Step along `delta`, halving until every component is positive; fall
/// back to the floor constraint when halving does not get there.
fn apply_step(sigma: &[f64], delta: &[f64], floor: f64, iter: usize) -> Result<Vec<f64>> {
    let mut step = 1.0;
    for _ in 0..=MAX_HALVINGS {
        let next: Vec<f64> = sigma.iter().zip(delta).map(|(s, d)| s + step * d).collect();
        if next.iter().all(|&s| s > 0.0) {
            return Ok(next);
        }
        step *= 0.5;
    }
    let mut next: Vec<f64> = sigma.iter().zip(delta).map(|(s, d)| s + step * d).collect();
    let n_constrained = constrain(&mut next, floor)?;
    if 2 * n_constrained > sigma.len() {
        warn!(
            "iteration {}: {} of {} variance components constrained",
            iter,
            n_constrained,
            sigma.len()
        );
    }
    Ok(next)
}

fn relative_change(old: &[f64], new: &[f64]) -> f64 {
    let diff: f64 = old.iter().zip(new).map(|(a, b)| (a - b) * (a - b)).sum();
    diff.sqrt() / math::squared_norm(new).sqrt()
}

/// Fit the variance components of `y` given fixed design `x` and GRMs.
pub fn fit(y: &[f64], x: &DenseMatrix, grms: &[DenseMatrix], config: &RemlConfig) -> Result<RemlFit> {
    config.validate()?;
    let n = y.len();
    if x.nrows() != n || grms.iter().any(|k| k.nrows() != n || k.ncols() != n) {
        return Err(GelexError::inconsistent(format!(
            "REML inputs disagree on the number of samples ({})",
            n
        ))
        .into());
    }
    if n <= x.ncols() {
        return Err(GelexError::inconsistent(format!(
            "{} samples cannot support {} fixed effects",
            n,
            x.ncols()
        ))
        .into());
    }
    let y_var = math::variance(y);
    if !(y_var > 0.0) {
        return Err(GelexError::inconsistent("phenotype has no variance").into());
    }
    let floor = FLOOR_FRACTION * y_var;
    let r = grms.len() + 1;
    let mut sigma = vec![y_var / r as f64; r];

    info!(
        "AI-REML: {} samples, {} fixed effects, {} GRMs",
        n,
        x.ncols(),
        grms.len()
    );

    let mut eval = evaluate(y, x, grms, &sigma)?;
    if config.em_init {
        let mut next = em_step(&eval, &sigma, n);
        constrain(&mut next, floor)?;
        debug!("EM warm-up: sigma = {:?}", next);
        sigma = next;
        eval = evaluate(y, x, grms, &sigma)?;
    }

    let mut converged = false;
    let mut iterations = 0;
    for iter in 1..=config.max_iter {
        iterations = iter;
        let score = eval.score();
        let delta = solve_spd(&eval.ai, &score)
            .map_err(|e| GelexError::numerical(format!("AI matrix is singular: {}", e)))?;
        let next = apply_step(&sigma, &delta, floor, iter)?;
        let next_eval = evaluate(y, x, grms, &next)?;

        let change = relative_change(&sigma, &next);
        let dl = (next_eval.loglike - eval.loglike).abs();
        debug!(
            "AI-REML iter {}: loglike {:.6}, sigma {:?}, change {:.2e}",
            iter, next_eval.loglike, next, change
        );
        sigma = next;
        eval = next_eval;
        if change < config.tol && dl < LOGLIKE_TOL {
            converged = true;
            break;
        }
    }

    if converged {
        info!("AI-REML converged after {} iterations", iterations);
    } else {
        warn!("AI-REML did not converge after {} iterations", config.max_iter);
    }

    let (sigma_se, h2, h2_se) = standard_errors(&eval.ai, &sigma)?;
    info!(
        "Variance components {:?}, h2 {:?}, loglike {:.4}",
        sigma, h2, eval.loglike
    );

    Ok(RemlFit {
        sigma,
        sigma_se,
        h2,
        h2_se,
        beta: eval.beta,
        v_inv: eval.v_inv,
        loglike: eval.loglike,
        iterations,
        converged,
    })
}

/// Rebuild a fit at known components, e.g. from a saved model.
pub fn evaluate_at(
    y: &[f64],
    x: &DenseMatrix,
    grms: &[DenseMatrix],
    sigma: &[f64],
) -> Result<RemlFit> {
    if sigma.len() != grms.len() + 1 {
        return Err(GelexError::inconsistent(format!(
            "{} variance components for {} GRMs",
            sigma.len(),
            grms.len()
        ))
        .into());
    }
    let eval = evaluate(y, x, grms, sigma)?;
    let (sigma_se, h2, h2_se) = standard_errors(&eval.ai, sigma)?;
    Ok(RemlFit {
        sigma: sigma.to_vec(),
        sigma_se,
        h2,
        h2_se,
        beta: eval.beta,
        v_inv: eval.v_inv,
        loglike: eval.loglike,
        iterations: 0,
        converged: true,
    })
}

/// Component standard errors and delta-method heritability standard errors.
fn standard_errors(ai: &DenseMatrix, sigma: &[f64]) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let r = sigma.len();
    let cov = gelex_linalg::decomposition::inverse_spd(ai)
        .map_err(|e| GelexError::numerical(format!("AI matrix is singular: {}", e)))?;
    let sigma_se = (0..r).map(|k| cov.get(k, k).max(0.0).sqrt()).collect();

    let total: f64 = sigma.iter().sum();
    let mut h2 = Vec::with_capacity(r - 1);
    let mut h2_se = Vec::with_capacity(r - 1);
    for k in 0..r - 1 {
        h2.push(sigma[k] / total);
        // ∂h_k/∂σ_j = (δ_kj·S − σ_k) / S²
        let grad: Vec<f64> = (0..r)
            .map(|j| {
                let own = if j == k { total } else { 0.0 };
                (own - sigma[k]) / (total * total)
            })
            .collect();
        let var = cov.mat_vec(&grad);
        h2_se.push(DenseMatrix::dot(&grad, &var).max(0.0).sqrt());
    }
    Ok((sigma_se, h2, h2_se))
}
