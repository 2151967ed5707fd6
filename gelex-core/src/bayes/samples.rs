//! Posterior records.
//!
//! Scalar parameters keep their full chains (append-only, in record order)
//! so interval, ESS and R-hat summaries can be computed after the run.
//! Marker effects and genetic values are too wide for that and are folded
//! into running moments and component tallies as each record arrives.

use anyhow::Result;
use gelex_geno::{GelexError, GenotypeStore};

use super::model::BayesModel;
use super::state::{BayesState, MarkerState};

/// Full chains of scalar parameters keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamChains {
    names: Vec<String>,
    draws: Vec<Vec<f64>>,
}

impl ParamChains {
    pub fn new(names: Vec<String>) -> Self {
        let draws = vec![Vec::new(); names.len()];
        Self { names, draws }
    }

    /// Append one record; `values` follows the order of `names()`.
    pub fn push(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.names.len() {
            return Err(GelexError::inconsistent(format!(
                "record has {} values for {} parameters",
                values.len(),
                self.names.len()
            ))
            .into());
        }
        for (chain, &v) in self.draws.iter_mut().zip(values) {
            chain.push(v);
        }
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        let i = self.names.iter().position(|n| n == name)?;
        Some(&self.draws[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.draws.iter().map(Vec::as_slice))
    }

    pub fn n_records(&self) -> usize {
        self.draws.first().map_or(0, Vec::len)
    }
}

/// Running mean and variance per element (Welford).
#[derive(Debug, Clone, PartialEq)]
pub struct RunningMoments {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningMoments {
    pub fn new(len: usize) -> Self {
        Self {
            n: 0,
            mean: vec![0.0; len],
            m2: vec![0.0; len],
        }
    }

    pub fn push(&mut self, values: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(values) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Sample standard deviation of element `j`.
    pub fn sd(&self, j: usize) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            (self.m2[j] / (self.n - 1) as f64).sqrt()
        }
    }
}

/// Per-marker effect moments and mixture component tallies.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSamples {
    pub moments: RunningMoments,
    /// `tallies[j][k]`: records in which marker `j` sat in component `k`.
    tallies: Vec<Vec<u32>>,
    n_components: usize,
}

impl EffectSamples {
    pub fn new(m: usize, n_components: usize) -> Self {
        Self {
            moments: RunningMoments::new(m),
            tallies: vec![vec![0; n_components]; m],
            n_components,
        }
    }

    pub fn push(&mut self, state: &MarkerState) {
        self.moments.push(&state.coeffs);
        for (t, &k) in self.tallies.iter_mut().zip(&state.tracker) {
            t[k] += 1;
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Posterior probability of component `k` for marker `j`.
    pub fn component_prob(&self, j: usize, k: usize) -> f64 {
        let n = self.moments.count();
        if n == 0 {
            0.0
        } else {
            self.tallies[j][k] as f64 / n as f64
        }
    }

    /// Posterior inclusion probability `1 - P(component 0)`.
    pub fn pip(&self, j: usize) -> f64 {
        1.0 - self.component_prob(j, 0)
    }
}

/// Everything recorded by one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct McmcSamples {
    pub params: ParamChains,
    pub additive: EffectSamples,
    pub dominance: Option<EffectSamples>,
    /// Genetic values `u` per sample.
    pub additive_gv: RunningMoments,
    pub dominance_gv: Option<RunningMoments>,
}

impl McmcSamples {
    pub fn new<G: GenotypeStore>(model: &BayesModel<'_, G>) -> Self {
        let n = model.n_samples();
        Self {
            params: ParamChains::new(param_names(model)),
            additive: EffectSamples::new(model.additive.n_markers(), model.additive.n_components()),
            dominance: model
                .dominance
                .as_ref()
                .map(|d| EffectSamples::new(d.n_markers(), d.n_components())),
            additive_gv: RunningMoments::new(n),
            dominance_gv: model.dominance.as_ref().map(|_| RunningMoments::new(n)),
        }
    }

    pub fn record<G: GenotypeStore>(
        &mut self,
        model: &BayesModel<'_, G>,
        state: &BayesState,
    ) -> Result<()> {
        self.params.push(&param_values(model, state))?;
        self.additive.push(&state.additive);
        self.additive_gv.push(&state.additive.u);
        if let (Some(samples), Some(dom)) = (self.dominance.as_mut(), state.dominance.as_ref()) {
            samples.push(dom);
        }
        if let (Some(gv), Some(dom)) = (self.dominance_gv.as_mut(), state.dominance.as_ref()) {
            gv.push(&dom.u);
        }
        Ok(())
    }

    pub fn n_records(&self) -> usize {
        self.params.n_records()
    }
}

fn block_names<G: GenotypeStore>(
    prefix: &str,
    model: &BayesModel<'_, G>,
    n_components: usize,
    names: &mut Vec<String>,
) {
    let kind = model.model_type.marker;
    names.push(format!("{}_var", prefix));
    let shared = if prefix == "dom" {
        kind.shared_variance() && !model.model_type.correlated_dominance()
    } else {
        kind.shared_variance()
    };
    if shared {
        names.push(format!("{}_marker_var", prefix));
    }
    names.push(format!("{}_h2", prefix));
    if kind.is_mixture() {
        for k in 0..n_components {
            names.push(format!("{}_pi{}", prefix, k));
        }
    }
}

fn block_values(state: &MarkerState, shared: bool, mixture: bool, values: &mut Vec<f64>) {
    values.push(state.variance);
    if shared {
        values.push(state.marker_variance[0]);
    }
    values.push(state.heritability);
    if mixture {
        values.extend_from_slice(&state.pi.prop);
    }
}

/// Scalar parameter names in record order: fixed terms, random variances,
/// additive block, dominance block, residual.
pub fn param_names<G: GenotypeStore>(model: &BayesModel<'_, G>) -> Vec<String> {
    let mut names = model.fixed.names.clone();
    names.extend(model.random.iter().map(|r| format!("{}_var", r.name)));
    block_names("add", model, model.additive.n_components(), &mut names);
    if let Some(d) = &model.dominance {
        block_names("dom", model, d.n_components(), &mut names);
    }
    names.push("residual".to_string());
    names
}

fn param_values<G: GenotypeStore>(model: &BayesModel<'_, G>, state: &BayesState) -> Vec<f64> {
    let kind = model.model_type.marker;
    let mut values = state.fixed.coeffs.clone();
    values.extend(state.random.iter().map(|r| r.variance));
    block_values(&state.additive, kind.shared_variance(), kind.is_mixture(), &mut values);
    if let Some(d) = &state.dominance {
        let shared = kind.shared_variance() && !model.model_type.correlated_dominance();
        block_values(d, shared, kind.is_mixture(), &mut values);
    }
    values.push(state.residual.variance);
    values
}
