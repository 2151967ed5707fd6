//! Per-iteration update operators.
//!
//! An iteration is a fixed sequence of operators chosen when the pipeline
//! is built. Every coefficient change goes through [`update_with_delta`]
//! (or [`update_residual`] for blocks without genetic values), which keeps
//! `y_adj` equal to the true residual after each single-locus update.
//!
//! Marker sweeps are serial: each update reads and writes `y_adj`.

pub mod fixed;
pub mod marker;
pub mod random;
pub mod residual;
pub mod rrd;

use anyhow::Result;
use gelex_geno::GenotypeStore;
use rand::Rng;

use super::model::{BayesModel, MarkerPrior};
use super::state::BayesState;

/// `y_adj += (old - new) z`, `u += (new - old) z`.
#[inline]
pub fn update_with_delta(y_adj: &mut [f64], u: &mut [f64], z: &[f64], old: f64, new: f64) {
    let delta = new - old;
    if delta == 0.0 {
        return;
    }
    for ((r, g), &x) in y_adj.iter_mut().zip(u.iter_mut()).zip(z) {
        *r -= delta * x;
        *g += delta * x;
    }
}

/// `y_adj += (old - new) z`.
#[inline]
pub fn update_residual(y_adj: &mut [f64], z: &[f64], old: f64, new: f64) {
    let delta = new - old;
    if delta == 0.0 {
        return;
    }
    for (r, &x) in y_adj.iter_mut().zip(z) {
        *r -= delta * x;
    }
}

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Conditional posterior `(mean, sd)` of one coefficient with prior
/// variance `sigma`: `κ = 1 / (c + σ²_e / σ²)`, mean `rhs κ`, sd
/// `sqrt(σ²_e κ)`.
#[inline]
pub(crate) fn posterior(rhs: f64, c: f64, sigma_e: f64, sigma: f64) -> (f64, f64) {
    let kappa = 1.0 / (c + sigma_e / sigma);
    (rhs * kappa, (sigma_e * kappa).sqrt())
}

/// Log Bayes factor of a slab with variance `sigma` against the spike:
/// `-0.5 (ln(c σ² / σ²_e + 1) - rhs² κ / σ²_e)`.
#[inline]
pub(crate) fn log_slab_kernel(rhs: f64, c: f64, sigma_e: f64, sigma: f64) -> f64 {
    let kappa = 1.0 / (c + sigma_e / sigma);
    -0.5 * ((c * sigma / sigma_e + 1.0).ln() - rhs * rhs * kappa / sigma_e)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Fixed,
    Random,
    Additive(MarkerPrior),
    Dominance(MarkerPrior),
    /// Metropolis-Hastings additive move of the correlated model.
    CorrelatedAdditive,
    /// Gibbs update of the dominance/additive ratios.
    DominanceRatio,
    Residual,
}

/// Operator sequence of one iteration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    ops: Vec<Operator>,
}

impl Pipeline {
    pub fn new<G: GenotypeStore>(model: &BayesModel<'_, G>) -> Self {
        let mut ops = vec![Operator::Fixed];
        if !model.random.is_empty() {
            ops.push(Operator::Random);
        }
        let kind = model.model_type.marker;
        if model.model_type.correlated_dominance() {
            ops.push(Operator::CorrelatedAdditive);
            ops.push(Operator::DominanceRatio);
        } else {
            ops.push(Operator::Additive(kind));
            if model.dominance.is_some() {
                ops.push(Operator::Dominance(kind));
            }
        }
        ops.push(Operator::Residual);
        Self { ops }
    }

    pub fn operators(&self) -> &[Operator] {
        &self.ops
    }

    /// Run one iteration.
    pub fn step<G, R>(&self, model: &BayesModel<'_, G>, state: &mut BayesState, rng: &mut R) -> Result<()>
    where
        G: GenotypeStore,
        R: Rng + ?Sized,
    {
        for op in &self.ops {
            let BayesState {
                fixed,
                random,
                additive,
                dominance,
                residual,
            } = state;
            match *op {
                Operator::Fixed => fixed::sample(&model.fixed, fixed, residual, rng),
                Operator::Random => random::sample(&model.random, random, residual, rng)?,
                Operator::Additive(kind) => {
                    marker::sweep(kind, &model.additive, additive, residual, rng)?
                }
                Operator::Dominance(kind) => {
                    if let (Some(effect), Some(state)) = (&model.dominance, dominance.as_mut()) {
                        marker::sweep(kind, effect, state, residual, rng)?;
                    }
                }
                Operator::CorrelatedAdditive => {
                    if let Some(dom) = dominance.as_ref() {
                        rrd::sample_additive(model, additive, dom, residual, rng)?;
                    }
                }
                Operator::DominanceRatio => {
                    if let (Some(effect), Some(dom)) = (&model.dominance, dominance.as_mut()) {
                        rrd::sample_ratios(effect, &model.ratio_prior, additive, dom, residual, rng);
                    }
                }
                Operator::Residual => residual::sample(&model.residual_prior, residual, rng)?,
            }
        }
        state.update_heritability();
        Ok(())
    }
}
