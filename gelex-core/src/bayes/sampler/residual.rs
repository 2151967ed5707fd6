//! Residual variance update.

use anyhow::Result;
use rand::Rng;

use crate::bayes::prior::ScaledInvChiSq;
use crate::bayes::state::ResidualState;
use crate::util::math;

/// Draw `σ²_e` from the prior updated with `(‖y_adj‖², n)`.
pub fn sample<R: Rng + ?Sized>(
    prior: &ScaledInvChiSq,
    residual: &mut ResidualState,
    rng: &mut R,
) -> Result<()> {
    let ss = math::squared_norm(&residual.y_adj);
    residual.variance = prior.posterior(ss, residual.y_adj.len()).sample(rng)?;
    Ok(())
}
