//! Random-effect blocks: per-level Gibbs updates with a block variance.

use anyhow::Result;
use rand::Rng;

use super::{dot, posterior, update_residual};
use crate::bayes::dist;
use crate::bayes::model::RandomEffect;
use crate::bayes::state::{RandomState, ResidualState};
use crate::util::math;

pub fn sample<R: Rng + ?Sized>(
    effects: &[RandomEffect],
    states: &mut [RandomState],
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()> {
    for (effect, state) in effects.iter().zip(states.iter_mut()) {
        let sigma_e = residual.variance;
        for (k, col) in effect.cols.iter().enumerate() {
            let c = effect.col_norms[k];
            if c == 0.0 {
                continue;
            }
            let old = state.coeffs[k];
            let rhs = dot(col, &residual.y_adj) + c * old;
            let (mean, sd) = posterior(rhs, c, sigma_e, state.variance);
            let new = dist::normal(rng, mean, sd);
            update_residual(&mut residual.y_adj, col, old, new);
            state.coeffs[k] = new;
        }
        state.variance = effect
            .prior
            .posterior(math::squared_norm(&state.coeffs), state.coeffs.len())
            .sample(rng)?;
    }
    Ok(())
}
