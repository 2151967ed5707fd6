//! Gibbs scan over fixed-effect columns under a flat prior.

use rand::Rng;

use super::{dot, update_residual};
use crate::bayes::dist;
use crate::bayes::model::FixedEffect;
use crate::bayes::state::{FixedState, ResidualState};

/// Draw each coefficient from `N((z'y_adj + c β) / c, σ²_e / c)`.
pub fn sample<R: Rng + ?Sized>(
    effect: &FixedEffect,
    state: &mut FixedState,
    residual: &mut ResidualState,
    rng: &mut R,
) {
    let sigma_e = residual.variance;
    for (k, col) in effect.cols.iter().enumerate() {
        let c = effect.col_norms[k];
        if c == 0.0 {
            continue;
        }
        let old = state.coeffs[k];
        let rhs = dot(col, &residual.y_adj) + c * old;
        let new = dist::normal(rng, rhs / c, (sigma_e / c).sqrt());
        update_residual(&mut residual.y_adj, col, old, new);
        state.coeffs[k] = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_intercept_centres_on_mean() {
        let effect = FixedEffect {
            names: vec!["Intercept".into()],
            cols: vec![vec![1.0; 4]],
            col_norms: vec![4.0],
        };
        let mut state = FixedState { coeffs: vec![0.0] };
        let mut residual = ResidualState {
            y_adj: vec![10.0, 11.0, 9.0, 10.0],
            variance: 1e-10,
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        sample(&effect, &mut state, &mut residual, &mut rng);
        assert!((state.coeffs[0] - 10.0).abs() < 1e-3);
        let total: f64 = residual.y_adj.iter().sum();
        assert!(total.abs() < 1e-2);
    }
}
