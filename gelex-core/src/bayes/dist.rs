//! Random draws used by the samplers. All take the chain's single RNG.

use anyhow::Result;
use gelex_geno::GelexError;
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, Gamma, Open01, StandardNormal};
use statrs::distribution::{ContinuousCDF, Normal};

pub fn normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + sd * z
}

/// Uniform on `[0, 1)`.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>()
}

pub fn chi_squared<R: Rng + ?Sized>(rng: &mut R, nu: f64) -> Result<f64> {
    let dist = ChiSquared::new(nu).map_err(|e| {
        GelexError::numerical(format!("invalid chi-squared degrees of freedom {}: {}", nu, e))
    })?;
    Ok(dist.sample(rng))
}

/// Dirichlet draw built from independent `Gamma(alpha_k, 1)` draws.
pub fn dirichlet<R: Rng + ?Sized>(rng: &mut R, alpha: &[f64]) -> Result<Vec<f64>> {
    let mut draws = Vec::with_capacity(alpha.len());
    for &a in alpha {
        let gamma = Gamma::new(a, 1.0).map_err(|e| {
            GelexError::numerical(format!("invalid Dirichlet concentration {}: {}", a, e))
        })?;
        draws.push(gamma.sample(rng));
    }
    let total: f64 = draws.iter().sum();
    if !(total > 0.0) {
        return Err(GelexError::numerical("Dirichlet draw summed to zero").into());
    }
    for d in draws.iter_mut() {
        *d /= total;
    }
    Ok(draws)
}

/// Draw from `N(mean, sd²)` by inverting the CDF at an open-interval
/// uniform.
pub fn normal_by_inversion<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> Result<f64> {
    if !(sd > 0.0) {
        return Ok(mean);
    }
    let dist = Normal::new(mean, sd)
        .map_err(|e| GelexError::numerical(format!("invalid normal proposal: {}", e)))?;
    let q: f64 = rng.sample(Open01);
    Ok(dist.inverse_cdf(q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_dirichlet_sums_to_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = dirichlet(&mut rng, &[3.0, 1.0, 10.0]).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|&x| x > 0.0));
        assert!(dirichlet(&mut rng, &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_normal_by_inversion_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let draws: Vec<f64> = (0..20000)
            .map(|_| normal_by_inversion(&mut rng, 2.0, 0.5).unwrap())
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.0).abs() < 0.02);
        assert_eq!(normal_by_inversion(&mut rng, 1.5, 0.0).unwrap(), 1.5);
    }

    #[test]
    fn test_chi_squared_rejects_non_positive() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(chi_squared(&mut rng, 0.0).is_err());
        assert!(chi_squared(&mut rng, 2.0).unwrap() >= 0.0);
    }
}
