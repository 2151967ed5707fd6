//! Correlated additive and dominance effects.
//!
//! Dominance effects are tied to the additive effect of the same marker,
//! `δ_j = r_j |α_j|` with `r_j ~ N(μ, σ²_δ)`, so `δ_j ~ N(μ |α_j|, σ²_δ α_j²)`.
//! The additive effect is updated by an independence Metropolis-Hastings
//! move whose proposal is its ridge conditional; the acceptance ratio then
//! reduces to the dominance prior density `h(α)`. Ratios are drawn by Gibbs.

use anyhow::Result;
use gelex_geno::GenotypeStore;
use rand::Rng;

use super::{dot, posterior, update_with_delta};
use crate::bayes::dist;
use crate::bayes::model::{BayesModel, MarkerEffect, RatioPrior};
use crate::bayes::state::{MarkerState, ResidualState};
use crate::util::math;

const ZERO: f64 = 1e-12;

/// Log density of the dominance effect `d` given additive effect `a`, up to
/// a constant: `-ln|a| - (d - μ|a|)² / (2 σ²_δ a²)`.
pub fn log_ratio_density(a: f64, d: f64, prior: &RatioPrior) -> f64 {
    let abs_a = a.abs();
    if abs_a < ZERO {
        return f64::NEG_INFINITY;
    }
    let diff = d - prior.mean * abs_a;
    -abs_a.ln() - diff * diff / (2.0 * prior.variance * a * a)
}

/// MH sweep over the additive block, then the shared variance update.
pub fn sample_additive<G, R>(
    model: &BayesModel<'_, G>,
    add: &mut MarkerState,
    dom: &MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let effect = &model.additive;
    let prior = &model.ratio_prior;
    let sigma_e = residual.variance;
    let sigma = add.marker_variance[0];

    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = add.coeffs[j];
        let d = dom.coeffs[j];

        let rhs = dot(z, &residual.y_adj) + c * old;
        let (mean, sd) = posterior(rhs, c, sigma_e, sigma);
        let candidate = dist::normal_by_inversion(rng, mean, sd)?;

        let log_accept = log_ratio_density(candidate, d, prior) - log_ratio_density(old, d, prior);
        if log_accept >= 0.0 || dist::uniform(rng) < log_accept.exp() {
            update_with_delta(&mut residual.y_adj, &mut add.u, z, old, candidate);
            add.coeffs[j] = candidate;
        }
    }

    let active = effect.n_markers() - effect.num_mono();
    add.marker_variance[0] = effect
        .variance_prior
        .posterior(math::squared_norm(&add.coeffs), active)
        .sample(rng)?;
    Ok(())
}

/// Gibbs update of each ratio `r_j` given the current additive effect.
/// Markers whose additive effect is zero carry no dominance effect.
pub fn sample_ratios<G, R>(
    effect: &MarkerEffect<'_, G>,
    prior: &RatioPrior,
    add: &MarkerState,
    dom: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    let prior_precision = sigma_e / prior.variance;

    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let old = dom.coeffs[j];
        let abs_a = add.coeffs[j].abs();

        if abs_a < ZERO {
            update_with_delta(&mut residual.y_adj, &mut dom.u, z, old, 0.0);
            dom.coeffs[j] = 0.0;
            dom.ratios[j] = 0.0;
            continue;
        }

        let c = effect.col_norms[j];
        let norm = c * abs_a * abs_a;
        let rhs = abs_a * (dot(z, &residual.y_adj) + c * old) + prior.mean * prior_precision;
        let v = norm + prior_precision;
        let ratio = dist::normal(rng, rhs / v, (sigma_e / v).sqrt());
        let new = ratio * abs_a;

        update_with_delta(&mut residual.y_adj, &mut dom.u, z, old, new);
        dom.coeffs[j] = new;
        dom.ratios[j] = ratio;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::prior::PriorConfig;
    use crate::bayes::sampler::Pipeline;
    use crate::bayes::state::BayesState;
    use crate::data::FixedDesign;
    use gelex_geno::{GenotypeMatrix, MarkerStats};
    use rand::SeedableRng;

    #[test]
    fn test_log_ratio_density() {
        let prior = RatioPrior {
            mean: 0.0,
            variance: 1.0,
        };
        assert_eq!(log_ratio_density(0.0, 1.0, &prior), f64::NEG_INFINITY);
        let h = log_ratio_density(2.0, 2.0, &prior);
        assert!((h - (-(2.0f64).ln() - 4.0 / 8.0)).abs() < 1e-12);
    }

    #[test]
    fn test_correlated_model_keeps_residual() {
        let add_cols = [
            vec![-1.0, 0.0, 0.0, 1.0, -1.0, 1.0],
            vec![1.0, -1.0, 0.5, -0.5, 0.0, 0.0],
        ];
        let dom_cols = [
            vec![-0.5, 1.0, 1.0, -0.5, -0.5, -0.5],
            vec![0.2, 0.2, -0.8, -0.8, 0.6, 0.6],
        ];
        let stats = MarkerStats::new(vec![1.0; 2], vec![0.7; 2], vec![]);
        let add = GenotypeMatrix::new(6, add_cols.concat(), stats.clone());
        let dom = GenotypeMatrix::new(6, dom_cols.concat(), stats);
        let y = vec![0.3, 1.2, -0.7, 2.0, 0.4, -1.5];
        let fixed = FixedDesign::intercept(6);
        let model = BayesModel::new(
            "RRd".parse().unwrap(),
            y,
            &fixed,
            &[],
            &add,
            Some(&dom),
            &PriorConfig::default(),
        )
        .unwrap();
        let pipeline = Pipeline::new(&model);
        let mut state = BayesState::new(&model);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        for _ in 0..100 {
            pipeline.step(&model, &mut state, &mut rng).unwrap();
            let truth = state.true_residual(&model);
            for (a, b) in truth.iter().zip(&state.residual.y_adj) {
                assert!((a - b).abs() < 1e-9);
            }
            let dom_state = state.dominance.as_ref().unwrap();
            for j in 0..2 {
                let expected = dom_state.ratios[j] * state.additive.coeffs[j].abs();
                assert!((dom_state.coeffs[j] - expected).abs() < 1e-12);
            }
        }
    }
}
