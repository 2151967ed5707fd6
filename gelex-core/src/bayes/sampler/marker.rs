//! Single-locus marker sweeps for the A, B, C, R and RR priors (and the
//! pi variants, which add a Dirichlet update of the proportions).
//!
//! Markers are visited in index order; monomorphic markers are skipped and
//! keep a zero effect.

use anyhow::Result;
use gelex_geno::GenotypeStore;
use rand::Rng;

use super::{dot, log_slab_kernel, posterior, update_with_delta};
use crate::bayes::dist;
use crate::bayes::model::{MarkerEffect, MarkerPrior};
use crate::bayes::state::{MarkerState, ResidualState};
use crate::util::math;

/// One sweep over a marker block with prior `kind`.
pub fn sweep<G, R>(
    kind: MarkerPrior,
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    match kind {
        MarkerPrior::A => sweep_a(effect, state, residual, rng)?,
        MarkerPrior::RR => sweep_rr(effect, state, residual, rng)?,
        MarkerPrior::B | MarkerPrior::Bpi => sweep_b(effect, state, residual, rng)?,
        MarkerPrior::C | MarkerPrior::Cpi => sweep_c(effect, state, residual, rng)?,
        MarkerPrior::R => sweep_r(effect, state, residual, rng)?,
    }

    if kind.is_mixture() {
        state.recount(effect);
    }
    if kind.estimates_pi() {
        let alpha: Vec<f64> = state.pi.count.iter().map(|&c| c as f64 + 1.0).collect();
        state.pi.prop = dist::dirichlet(rng, &alpha)?;
    }
    Ok(())
}

/// Per-marker variance, always active.
fn sweep_a<G, R>(
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = state.coeffs[j];

        let rhs = dot(z, &residual.y_adj) + c * old;
        let (mean, sd) = posterior(rhs, c, sigma_e, state.marker_variance[j]);
        let new = dist::normal(rng, mean, sd);
        update_with_delta(&mut residual.y_adj, &mut state.u, z, old, new);
        state.coeffs[j] = new;

        state.marker_variance[j] = effect.variance_prior.posterior(new * new, 1).sample(rng)?;
    }
    Ok(())
}

/// Shared variance, always active.
fn sweep_rr<G, R>(
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    let sigma = state.marker_variance[0];
    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = state.coeffs[j];

        let rhs = dot(z, &residual.y_adj) + c * old;
        let (mean, sd) = posterior(rhs, c, sigma_e, sigma);
        let new = dist::normal(rng, mean, sd);
        update_with_delta(&mut residual.y_adj, &mut state.u, z, old, new);
        state.coeffs[j] = new;
    }

    let active = effect.n_markers() - effect.num_mono();
    state.marker_variance[0] = effect
        .variance_prior
        .posterior(math::squared_norm(&state.coeffs), active)
        .sample(rng)?;
    Ok(())
}

/// Spike and slab with a per-marker slab variance.
fn sweep_b<G, R>(
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    let log_prior_odds = state.pi.prop[1].ln() - state.pi.prop[0].ln();
    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = state.coeffs[j];
        let sigma = state.marker_variance[j];

        let rhs = dot(z, &residual.y_adj) + c * old;
        let log_odds = log_slab_kernel(rhs, c, sigma_e, sigma) + log_prior_odds;
        let p_spike = 1.0 / (1.0 + log_odds.exp());

        if dist::uniform(rng) < p_spike {
            state.tracker[j] = 0;
            update_with_delta(&mut residual.y_adj, &mut state.u, z, old, 0.0);
            state.coeffs[j] = 0.0;
            state.marker_variance[j] = effect.variance_prior.sample(rng)?;
        } else {
            state.tracker[j] = 1;
            let (mean, sd) = posterior(rhs, c, sigma_e, sigma);
            let new = dist::normal(rng, mean, sd);
            update_with_delta(&mut residual.y_adj, &mut state.u, z, old, new);
            state.coeffs[j] = new;
            state.marker_variance[j] = effect.variance_prior.posterior(new * new, 1).sample(rng)?;
        }
    }
    Ok(())
}

/// Spike and slab with one shared slab variance.
fn sweep_c<G, R>(
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    let sigma = state.marker_variance[0];
    let log_prior_odds = state.pi.prop[1].ln() - state.pi.prop[0].ln();
    let mut ss = 0.0;
    let mut n_slab = 0;
    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = state.coeffs[j];

        let rhs = dot(z, &residual.y_adj) + c * old;
        let log_odds = log_slab_kernel(rhs, c, sigma_e, sigma) + log_prior_odds;
        let p_spike = 1.0 / (1.0 + log_odds.exp());

        let new = if dist::uniform(rng) < p_spike {
            state.tracker[j] = 0;
            0.0
        } else {
            state.tracker[j] = 1;
            let (mean, sd) = posterior(rhs, c, sigma_e, sigma);
            let new = dist::normal(rng, mean, sd);
            ss += new * new;
            n_slab += 1;
            new
        };
        update_with_delta(&mut residual.y_adj, &mut state.u, z, old, new);
        state.coeffs[j] = new;
    }

    state.marker_variance[0] = effect.variance_prior.posterior(ss, n_slab).sample(rng)?;
    Ok(())
}

/// Finite mixture of a spike and scaled slabs `σ² s_k`.
fn sweep_r<G, R>(
    effect: &MarkerEffect<'_, G>,
    state: &mut MarkerState,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()>
where
    G: GenotypeStore,
    R: Rng + ?Sized,
{
    let sigma_e = residual.variance;
    let base = state.marker_variance[0];
    let variances: Vec<f64> = effect.scale.iter().map(|s| s * base).collect();
    let log_pi: Vec<f64> = state.pi.prop.iter().map(|p| p.ln()).collect();
    let k_comp = variances.len();
    let mut weights = vec![0.0; k_comp];
    let mut ss = 0.0;
    let mut n_slab = 0;

    for j in 0..effect.n_markers() {
        if effect.is_monomorphic(j) {
            continue;
        }
        let z = effect.design.col(j);
        let c = effect.col_norms[j];
        let old = state.coeffs[j];
        let rhs = dot(z, &residual.y_adj) + c * old;

        weights[0] = log_pi[0];
        for k in 1..k_comp {
            weights[k] = log_slab_kernel(rhs, c, sigma_e, variances[k]) + log_pi[k];
        }
        math::softmax_in_place(&mut weights);

        let draw = dist::uniform(rng);
        let mut cumulative = 0.0;
        let mut comp = k_comp - 1;
        for (k, &w) in weights.iter().enumerate() {
            cumulative += w;
            if draw < cumulative {
                comp = k;
                break;
            }
        }
        state.tracker[j] = comp;

        let new = if comp == 0 {
            0.0
        } else {
            let (mean, sd) = posterior(rhs, c, sigma_e, variances[comp]);
            let new = dist::normal(rng, mean, sd);
            ss += new * new / effect.scale[comp];
            n_slab += 1;
            new
        };
        update_with_delta(&mut residual.y_adj, &mut state.u, z, old, new);
        state.coeffs[j] = new;
    }

    state.marker_variance[0] = effect.variance_prior.posterior(ss, n_slab).sample(rng)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::model::BayesModel;
    use crate::bayes::prior::PriorConfig;
    use crate::bayes::state::BayesState;
    use crate::data::FixedDesign;
    use gelex_geno::{GenotypeMatrix, MarkerStats};
    use rand::SeedableRng;

    fn design() -> (GenotypeMatrix, Vec<f64>) {
        // column 1 is monomorphic
        let cols = [
            vec![-1.0, 0.0, 0.0, 1.0, -1.0, 1.0],
            vec![0.0; 6],
            vec![1.0, -1.0, 0.5, -0.5, 0.0, 0.0],
            vec![0.5, 0.5, -1.0, 0.0, 1.0, -1.0],
        ];
        let data: Vec<f64> = cols.iter().flatten().copied().collect();
        let stats = MarkerStats::new(vec![1.0; 4], vec![0.7, 0.0, 0.6, 0.7], vec![1]);
        let y = vec![0.1, 1.3, -0.4, 2.2, 0.9, -1.1];
        (GenotypeMatrix::new(6, data, stats), y)
    }

    fn run(kind: &str) {
        let (g, y) = design();
        let fixed = FixedDesign::intercept(6);
        let model = BayesModel::new(
            kind.parse().unwrap(),
            y,
            &fixed,
            &[],
            &g,
            None,
            &PriorConfig::default(),
        )
        .unwrap();
        let mut state = BayesState::new(&model);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(11);
        let kind = model.model_type.marker;
        for _ in 0..50 {
            sweep(kind, &model.additive, &mut state.additive, &mut state.residual, &mut rng)
                .unwrap();
            let truth = state.true_residual(&model);
            for (a, b) in truth.iter().zip(&state.residual.y_adj) {
                assert!((a - b).abs() < 1e-9);
            }
            assert_eq!(state.additive.coeffs[1], 0.0);
            assert_eq!(state.additive.pi.count.iter().sum::<usize>(), 3);
            if kind.is_mixture() {
                for (k, &count) in state.additive.pi.count.iter().enumerate() {
                    let expected = (0..4)
                        .filter(|&j| j != 1 && state.additive.tracker[j] == k)
                        .count();
                    assert_eq!(count, expected);
                }
            }
            assert!((state.additive.pi.prop.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sweeps_keep_residual_and_counts() {
        for kind in ["A", "B", "Bpi", "C", "Cpi", "R", "RR"] {
            run(kind);
        }
    }

    #[test]
    fn test_spike_zeroes_effect() {
        let (g, y) = design();
        let fixed = FixedDesign::intercept(6);
        let prior = PriorConfig {
            pi: Some(vec![1.0 - 1e-12, 1e-12]),
            ..Default::default()
        };
        let model =
            BayesModel::new("C".parse().unwrap(), y, &fixed, &[], &g, None, &prior).unwrap();
        let mut state = BayesState::new(&model);
        state.additive.coeffs[0] = 0.3;
        state.residual.y_adj = state.true_residual(&model);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(2);
        sweep(MarkerPrior::C, &model.additive, &mut state.additive, &mut state.residual, &mut rng)
            .unwrap();
        assert_eq!(state.additive.coeffs[0], 0.0);
        assert_eq!(state.additive.pi.count, vec![3, 0]);
    }
}
