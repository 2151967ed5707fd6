//! Mutable chain state. `y_adj` always equals `y` minus every block's
//! current contribution.

use gelex_geno::GenotypeStore;

use super::model::{BayesModel, MarkerEffect};
use crate::util::math;

/// Mixture proportions and per-component assignment counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Pi {
    pub prop: Vec<f64>,
    pub count: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct FixedState {
    pub coeffs: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct RandomState {
    pub coeffs: Vec<f64>,
    pub variance: f64,
}

#[derive(Debug, Clone)]
pub struct MarkerState {
    pub coeffs: Vec<f64>,
    /// `Z · coeffs`.
    pub u: Vec<f64>,
    /// Mixture component per marker; meaningful for non-monomorphic markers.
    pub tracker: Vec<usize>,
    /// Length 1 when shared, otherwise one per marker.
    pub marker_variance: Vec<f64>,
    pub pi: Pi,
    /// Sample variance of `u`.
    pub variance: f64,
    pub heritability: f64,
    /// Dominance/additive ratios of the correlated model; empty otherwise.
    pub ratios: Vec<f64>,
}

impl MarkerState {
    fn new<G: GenotypeStore>(effect: &MarkerEffect<'_, G>, n: usize) -> Self {
        let m = effect.n_markers();
        // Mixtures start in the spike with zero effects; single-component
        // priors start every marker active.
        let start = if effect.kind.is_mixture() { 0 } else { 1 };
        let tracker = vec![start; m];
        let marker_variance = if effect.kind.shared_variance() {
            vec![effect.init_variance]
        } else {
            vec![effect.init_variance; m]
        };
        let mut count = vec![0; effect.n_components()];
        count[start] = m - effect.num_mono();
        Self {
            coeffs: vec![0.0; m],
            u: vec![0.0; n],
            tracker,
            marker_variance,
            pi: Pi {
                prop: effect.pi.clone(),
                count,
            },
            variance: 0.0,
            heritability: 0.0,
            ratios: Vec::new(),
        }
    }

    /// Recount `pi.count` from `tracker` over non-monomorphic markers.
    pub fn recount<G: GenotypeStore>(&mut self, effect: &MarkerEffect<'_, G>) {
        self.pi.count.iter_mut().for_each(|c| *c = 0);
        for (j, &k) in self.tracker.iter().enumerate() {
            if !effect.is_monomorphic(j) {
                self.pi.count[k] += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResidualState {
    pub y_adj: Vec<f64>,
    pub variance: f64,
}

#[derive(Debug, Clone)]
pub struct BayesState {
    pub fixed: FixedState,
    pub random: Vec<RandomState>,
    pub additive: MarkerState,
    pub dominance: Option<MarkerState>,
    pub residual: ResidualState,
}

impl BayesState {
    /// All coefficients zero, so `y_adj = y`.
    pub fn new<G: GenotypeStore>(model: &BayesModel<'_, G>) -> Self {
        let n = model.n_samples();
        let mut dominance = model.dominance.as_ref().map(|d| MarkerState::new(d, n));
        if model.model_type.correlated_dominance() {
            if let Some(d) = dominance.as_mut() {
                d.ratios = vec![0.0; d.coeffs.len()];
                d.marker_variance = Vec::new();
            }
        }
        Self {
            fixed: FixedState {
                coeffs: vec![0.0; model.fixed.cols.len()],
            },
            random: model
                .random
                .iter()
                .map(|r| RandomState {
                    coeffs: vec![0.0; r.levels.len()],
                    variance: r.init_variance,
                })
                .collect(),
            additive: MarkerState::new(&model.additive, n),
            dominance,
            residual: ResidualState {
                y_adj: model.y.clone(),
                variance: model.residual_init,
            },
        }
    }

    /// Refresh block variances and heritabilities:
    /// `h²_block = var(u_block) / (Σ var(u) + Σ σ²_random + σ²_e)`.
    pub fn update_heritability(&mut self) {
        self.additive.variance = math::variance(&self.additive.u);
        if let Some(d) = self.dominance.as_mut() {
            d.variance = math::variance(&d.u);
        }
        let genetic = self.additive.variance + self.dominance.as_ref().map_or(0.0, |d| d.variance);
        let random: f64 = self.random.iter().map(|r| r.variance).sum();
        let total = genetic + random + self.residual.variance;
        let h2 = |v: f64| if total > 0.0 { v / total } else { 0.0 };
        self.additive.heritability = h2(self.additive.variance);
        if let Some(d) = self.dominance.as_mut() {
            d.heritability = h2(d.variance);
        }
    }

    /// Recompute `y - Xβ - Σ Z u` from scratch.
    pub fn true_residual<G: GenotypeStore>(&self, model: &BayesModel<'_, G>) -> Vec<f64> {
        let mut r = model.y.clone();
        let mut subtract = |col: &[f64], b: f64| {
            if b != 0.0 {
                for (ri, &x) in r.iter_mut().zip(col) {
                    *ri -= b * x;
                }
            }
        };
        for (col, &b) in model.fixed.cols.iter().zip(&self.fixed.coeffs) {
            subtract(col, b);
        }
        for (effect, state) in model.random.iter().zip(&self.random) {
            for (col, &b) in effect.cols.iter().zip(&state.coeffs) {
                subtract(col, b);
            }
        }
        for (j, &b) in self.additive.coeffs.iter().enumerate() {
            subtract(model.additive.design.col(j), b);
        }
        if let (Some(effect), Some(state)) = (&model.dominance, &self.dominance) {
            for (j, &b) in state.coeffs.iter().enumerate() {
                subtract(effect.design.col(j), b);
            }
        }
        r
    }
}
