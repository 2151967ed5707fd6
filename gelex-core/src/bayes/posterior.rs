//! Summaries of a single chain: mean, sd, highest posterior density
//! interval, effective sample size and split R-hat.

use crate::util::math;

/// Probability mass of the reported interval.
pub const DEFAULT_PROB: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub sd: f64,
    pub low: f64,
    pub high: f64,
    pub ess: f64,
    pub rhat: f64,
}

pub fn summarize(draws: &[f64], prob: f64) -> Summary {
    let (low, high) = hpdi(draws, prob);
    Summary {
        mean: math::mean(draws),
        sd: math::variance(draws).sqrt(),
        low,
        high,
        ess: effective_sample_size(draws),
        rhat: split_rhat(draws),
    }
}

/// Narrowest interval holding `prob` of the draws.
pub fn hpdi(draws: &[f64], prob: f64) -> (f64, f64) {
    if draws.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mut sorted = draws.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let width = ((prob * n as f64).ceil() as usize).clamp(1, n);
    let mut best = (sorted[0], sorted[width - 1]);
    for i in 1..=(n - width) {
        let (lo, hi) = (sorted[i], sorted[i + width - 1]);
        if hi - lo < best.1 - best.0 {
            best = (lo, hi);
        }
    }
    best
}

fn autocovariance(draws: &[f64], mean: f64, lag: usize) -> f64 {
    let n = draws.len();
    (0..n - lag)
        .map(|t| (draws[t] - mean) * (draws[t + lag] - mean))
        .sum::<f64>()
        / n as f64
}

/// ESS with Geyer's initial monotone sequence estimator.
pub fn effective_sample_size(draws: &[f64]) -> f64 {
    let n = draws.len();
    if n < 4 {
        return n as f64;
    }
    let mean = math::mean(draws);
    let gamma0 = autocovariance(draws, mean, 0);
    if !(gamma0 > 0.0) {
        return n as f64;
    }

    let mut tau = -1.0;
    let mut previous = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let rho_even = autocovariance(draws, mean, lag) / gamma0;
        let rho_odd = autocovariance(draws, mean, lag + 1) / gamma0;
        let mut pair = rho_even + rho_odd;
        if pair <= 0.0 {
            break;
        }
        pair = pair.min(previous);
        tau += 2.0 * pair;
        previous = pair;
        lag += 2;
    }
    if tau <= 0.0 {
        return n as f64;
    }
    n as f64 / tau
}

/// Potential scale reduction with the chain split into two halves.
pub fn split_rhat(draws: &[f64]) -> f64 {
    let half = draws.len() / 2;
    if half < 2 {
        return f64::NAN;
    }
    let first = &draws[..half];
    let second = &draws[draws.len() - half..];
    let means = [math::mean(first), math::mean(second)];
    let within = (math::variance(first) + math::variance(second)) / 2.0;
    let between = half as f64 * math::variance(&means);
    if within == 0.0 {
        return if between == 0.0 { 1.0 } else { f64::NAN };
    }
    let h = half as f64;
    let var_plus = (h - 1.0) / h * within + between / h;
    (var_plus / within).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    #[test]
    fn test_hpdi_on_uniform_grid() {
        let draws: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let (lo, hi) = hpdi(&draws, 0.9);
        assert_eq!(hi - lo, 89.0);
    }

    #[test]
    fn test_hpdi_prefers_dense_region() {
        let mut draws = vec![0.0; 18];
        draws.extend([100.0, 200.0]);
        assert_eq!(hpdi(&draws, 0.9), (0.0, 0.0));
    }

    #[test]
    fn test_ess_of_independent_draws_is_near_n() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let draws: Vec<f64> = (0..2000).map(|_| StandardNormal.sample(&mut rng)).collect();
        let ess = effective_sample_size(&draws);
        assert!(ess > 1200.0 && ess < 3000.0, "ess = {}", ess);
        let rhat = split_rhat(&draws);
        assert!((rhat - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_ess_of_correlated_chain_is_small() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mut x = 0.0;
        let draws: Vec<f64> = (0..2000)
            .map(|_| {
                let e: f64 = StandardNormal.sample(&mut rng);
                x = 0.95 * x + e;
                x
            })
            .collect();
        assert!(effective_sample_size(&draws) < 300.0);
    }

    #[test]
    fn test_constant_chain() {
        let draws = vec![1.5; 10];
        let s = summarize(&draws, DEFAULT_PROB);
        assert_eq!(s.mean, 1.5);
        assert_eq!(s.sd, 0.0);
        assert_eq!(s.ess, 10.0);
        assert_eq!(s.rhat, 1.0);
    }
}
