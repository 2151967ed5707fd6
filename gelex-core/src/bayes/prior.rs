//! Variance priors and prior configuration.

use anyhow::Result;
use gelex_geno::GelexError;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dist;
use super::model::MarkerPrior;

/// Scaled inverse chi-squared `{ν, s²}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledInvChiSq {
    pub nu: f64,
    pub s2: f64,
}

impl ScaledInvChiSq {
    pub fn new(nu: f64, s2: f64) -> Self {
        Self { nu, s2 }
    }

    /// Conditional posterior after `n` values with sum of squares `ss`:
    /// `{ν + n, (ν s² + ss) / (ν + n)}`.
    pub fn posterior(&self, ss: f64, n: usize) -> Self {
        let nu = self.nu + n as f64;
        Self {
            nu,
            s2: (self.nu * self.s2 + ss) / nu,
        }
    }

    /// Draw `ν s² / χ²(ν)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let chi = dist::chi_squared(rng, self.nu)?;
        let v = self.nu * self.s2 / chi;
        if !v.is_finite() {
            return Err(GelexError::numerical(format!(
                "variance draw diverged (nu = {}, s2 = {:e})",
                self.nu, self.s2
            ))
            .into());
        }
        Ok(v)
    }
}

/// User-facing prior settings. Marker variance scales `s²` are derived from
/// the phenotype when the model is built.
#[derive(Debug, Clone)]
pub struct PriorConfig {
    /// Degrees of freedom of the marker variance prior.
    pub nu: f64,
    /// Prior heritability used to size the initial marker variance.
    pub h2: f64,
    /// Mixture proportions of the additive block; model default when unset.
    pub pi: Option<Vec<f64>>,
    /// Per-component scales for the R family.
    pub scale: Option<Vec<f64>>,
    /// Mixture proportions of the dominance block; model default when unset.
    pub dom_pi: Option<Vec<f64>>,
    pub residual: ScaledInvChiSq,
    pub random: ScaledInvChiSq,
    /// Dominance/additive ratio prior `N(mean, variance)`.
    pub ratio_mean: f64,
    pub ratio_variance: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            nu: 4.0,
            h2: 0.5,
            pi: None,
            scale: None,
            dom_pi: None,
            residual: ScaledInvChiSq::new(-2.0, 0.0),
            random: ScaledInvChiSq::new(4.0, 0.0),
            ratio_mean: 0.0,
            ratio_variance: 1.0,
        }
    }
}

impl PriorConfig {
    pub fn pi_for(&self, kind: MarkerPrior, dominance: bool) -> Vec<f64> {
        let user = if dominance { &self.dom_pi } else { &self.pi };
        match user {
            Some(pi) if kind.is_mixture() => pi.clone(),
            _ => kind.default_pi(),
        }
    }

    pub fn scale_for(&self, kind: MarkerPrior) -> Vec<f64> {
        match (&self.scale, kind) {
            (Some(scale), MarkerPrior::R) => scale.clone(),
            _ => kind.default_scale(),
        }
    }

    /// Reject settings the samplers cannot run with.
    pub fn validate(&self, kind: MarkerPrior, dominance: bool) -> Result<()> {
        if !(self.nu > 2.0) {
            return Err(GelexError::config(format!("prior nu must exceed 2, got {}", self.nu)).into());
        }
        if !(self.h2 > 0.0 && self.h2 < 1.0) {
            return Err(GelexError::config(format!("prior h2 must be in (0, 1), got {}", self.h2)).into());
        }
        if !(self.ratio_variance > 0.0) {
            return Err(GelexError::config("dominance ratio variance must be positive").into());
        }
        validate_pi(kind, &self.pi_for(kind, false))?;
        if dominance {
            validate_pi(kind, &self.pi_for(kind, true))?;
        }
        if kind == MarkerPrior::R {
            let scale = self.scale_for(kind);
            let blocks: &[bool] = if dominance { &[false, true] } else { &[false] };
            for &dom in blocks {
                let pi = self.pi_for(kind, dom);
                if scale.len() != pi.len() {
                    return Err(GelexError::config(format!(
                        "{} scales given for {} {} mixture components",
                        scale.len(),
                        pi.len(),
                        if dom { "dominance" } else { "additive" }
                    ))
                    .into());
                }
            }
            if scale[0] != 0.0 || scale[1..].iter().any(|&s| !(s > 0.0)) {
                return Err(GelexError::config(
                    "scales must start with 0 (spike) followed by positive values",
                )
                .into());
            }
        }
        Ok(())
    }
}

fn validate_pi(kind: MarkerPrior, pi: &[f64]) -> Result<()> {
    if pi.iter().any(|&p| !(0.0..=1.0).contains(&p)) {
        return Err(GelexError::config(format!("mixture proportions out of range: {:?}", pi)).into());
    }
    let total: f64 = pi.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(GelexError::config(format!(
            "mixture proportions sum to {}, expected 1",
            total
        ))
        .into());
    }
    match kind {
        MarkerPrior::B | MarkerPrior::Bpi | MarkerPrior::C | MarkerPrior::Cpi if pi.len() != 2 => {
            Err(GelexError::config(format!("{:?} takes two mixture proportions", kind)).into())
        }
        MarkerPrior::R if pi.len() < 2 => {
            Err(GelexError::config("R takes at least two mixture proportions").into())
        }
        _ if kind.is_mixture() && pi[0] >= 1.0 => {
            Err(GelexError::config("spike proportion must be below 1").into())
        }
        _ => Ok(()),
    }
}
