//! RemlModel: a fitted null mixed model saved by `assoc` and reusable by a
//! later scan on the same samples.

use serde::{Deserialize, Serialize};

use crate::reml::RemlFit;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemlModel {
    /// Magic bytes for validation.
    pub magic: [u8; 4],
    pub version: u32,
    /// Sample keys in model order.
    pub sample_ids: Vec<String>,
    /// GRM prefixes in component order.
    pub grms: Vec<String>,
    /// Fixed-effect term names, matching `beta`.
    pub fixed_names: Vec<String>,
    /// Variance components: one per GRM, residual last.
    pub sigma: Vec<f64>,
    pub sigma_se: Vec<f64>,
    pub h2: Vec<f64>,
    pub h2_se: Vec<f64>,
    pub beta: Vec<f64>,
    pub loglike: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl RemlModel {
    /// Magic bytes: "GLRM" (GeLex Reml Model).
    pub const MAGIC: [u8; 4] = [b'G', b'L', b'R', b'M'];
    pub const VERSION: u32 = 1;

    pub fn from_fit(
        fit: &RemlFit,
        sample_ids: Vec<String>,
        grms: Vec<String>,
        fixed_names: Vec<String>,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            sample_ids,
            grms,
            fixed_names,
            sigma: fit.sigma.clone(),
            sigma_se: fit.sigma_se.clone(),
            h2: fit.h2.clone(),
            h2_se: fit.h2_se.clone(),
            beta: fit.beta.clone(),
            loglike: fit.loglike,
            iterations: fit.iterations,
            converged: fit.converged,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}
