//! Bayesian model: effect blocks, their designs and priors.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use gelex_geno::{GelexError, GenotypeStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::prior::{PriorConfig, ScaledInvChiSq};
use crate::data::{FixedDesign, RandomDesign};
use crate::util::math;

/// Prior family of one marker block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerPrior {
    A,
    B,
    Bpi,
    C,
    Cpi,
    R,
    RR,
}

impl MarkerPrior {
    pub fn is_mixture(self) -> bool {
        !matches!(self, MarkerPrior::A | MarkerPrior::RR)
    }

    /// One variance shared by all markers (or by the slab).
    pub fn shared_variance(self) -> bool {
        matches!(
            self,
            MarkerPrior::C | MarkerPrior::Cpi | MarkerPrior::R | MarkerPrior::RR
        )
    }

    pub fn estimates_pi(self) -> bool {
        matches!(self, MarkerPrior::Bpi | MarkerPrior::Cpi | MarkerPrior::R)
    }

    pub fn default_pi(self) -> Vec<f64> {
        match self {
            MarkerPrior::A | MarkerPrior::RR => vec![0.0, 1.0],
            MarkerPrior::R => vec![0.95, 0.02, 0.02, 0.01],
            _ => vec![0.95, 0.05],
        }
    }

    pub fn default_scale(self) -> Vec<f64> {
        match self {
            MarkerPrior::R => vec![0.0, 0.001, 0.01, 0.1],
            _ => Vec::new(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            MarkerPrior::A => "A",
            MarkerPrior::B => "B",
            MarkerPrior::Bpi => "Bpi",
            MarkerPrior::C => "C",
            MarkerPrior::Cpi => "Cpi",
            MarkerPrior::R => "R",
            MarkerPrior::RR => "RR",
        }
    }
}

/// A model name such as `BayesCpi` or `RRd`: the marker prior plus whether
/// a dominance block is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelType {
    pub marker: MarkerPrior,
    pub dominance: bool,
}

impl ModelType {
    /// `RRd`: dominance effects tied to the additive effect of the same
    /// marker through the ratio prior.
    pub fn correlated_dominance(&self) -> bool {
        self.dominance && self.marker == MarkerPrior::RR
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bayes{}{}",
            self.marker.name(),
            if self.dominance { "d" } else { "" }
        )
    }
}

impl FromStr for ModelType {
    type Err = GelexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("Bayes").unwrap_or(s);
        let (base, dominance) = match name.strip_suffix('d') {
            Some(base) if !base.is_empty() => (base, true),
            _ => (name, false),
        };
        let marker = match base {
            "A" => MarkerPrior::A,
            "B" => MarkerPrior::B,
            "Bpi" => MarkerPrior::Bpi,
            "C" => MarkerPrior::C,
            "Cpi" => MarkerPrior::Cpi,
            "R" => MarkerPrior::R,
            "RR" => MarkerPrior::RR,
            _ => {
                return Err(GelexError::config(format!("unknown model type '{}'", s)));
            }
        };
        Ok(Self { marker, dominance })
    }
}

/// Column-sliced design with precomputed squared norms.
#[derive(Debug, Clone)]
pub struct FixedEffect {
    pub names: Vec<String>,
    pub cols: Vec<Vec<f64>>,
    pub col_norms: Vec<f64>,
}

impl FixedEffect {
    fn new(design: &FixedDesign) -> Self {
        let cols: Vec<Vec<f64>> = (0..design.ncols()).map(|j| design.x.col(j)).collect();
        let col_norms = cols.iter().map(|c| math::squared_norm(c)).collect();
        Self {
            names: design.names.clone(),
            cols,
            col_norms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomEffect {
    pub name: String,
    pub levels: Vec<String>,
    pub cols: Vec<Vec<f64>>,
    pub col_norms: Vec<f64>,
    pub prior: ScaledInvChiSq,
    pub init_variance: f64,
}

/// One marker block: a genotype store plus its prior record.
pub struct MarkerEffect<'a, G: GenotypeStore> {
    pub design: &'a G,
    pub col_norms: Vec<f64>,
    /// Sample variance of each column, for PVE.
    pub col_variances: Vec<f64>,
    pub kind: MarkerPrior,
    pub pi: Vec<f64>,
    /// Per-component multipliers of the base variance (R family).
    pub scale: Vec<f64>,
    pub variance_prior: ScaledInvChiSq,
    pub init_variance: f64,
}

impl<'a, G: GenotypeStore> MarkerEffect<'a, G> {
    fn new(design: &'a G, kind: MarkerPrior, pi: Vec<f64>, scale: Vec<f64>, nu: f64, h2: f64, y_var: f64) -> Self {
        let col_norms = design.col_norms();
        let n = design.rows();
        let col_variances = col_norms
            .iter()
            .enumerate()
            .map(|(j, &c)| {
                if design.is_monomorphic(j) || n < 2 {
                    0.0
                } else {
                    let mean = design.col(j).iter().sum::<f64>() / n as f64;
                    (c - n as f64 * mean * mean) / (n - 1) as f64
                }
            })
            .collect();

        let m_active = (design.cols() - design.num_mono()).max(1) as f64;
        let slab = if kind.is_mixture() { 1.0 - pi[0] } else { 1.0 };
        let init_variance = h2 * y_var / (m_active * slab);
        let s2 = init_variance * (nu - 2.0) / nu;
        Self {
            design,
            col_norms,
            col_variances,
            kind,
            pi,
            scale,
            variance_prior: ScaledInvChiSq::new(nu, s2),
            init_variance,
        }
    }

    pub fn n_markers(&self) -> usize {
        self.design.cols()
    }

    pub fn is_monomorphic(&self, j: usize) -> bool {
        self.design.is_monomorphic(j)
    }

    pub fn num_mono(&self) -> usize {
        self.design.num_mono()
    }

    pub fn n_components(&self) -> usize {
        self.pi.len()
    }
}

/// Dominance/additive ratio prior `N(mean, variance)` of the correlated
/// model.
#[derive(Debug, Clone, Copy)]
pub struct RatioPrior {
    pub mean: f64,
    pub variance: f64,
}

pub struct BayesModel<'a, G: GenotypeStore> {
    pub model_type: ModelType,
    pub y: Vec<f64>,
    pub y_var: f64,
    pub fixed: FixedEffect,
    pub random: Vec<RandomEffect>,
    pub additive: MarkerEffect<'a, G>,
    pub dominance: Option<MarkerEffect<'a, G>>,
    pub ratio_prior: RatioPrior,
    pub residual_prior: ScaledInvChiSq,
    pub residual_init: f64,
}

impl<'a, G: GenotypeStore> BayesModel<'a, G> {
    pub fn new(
        model_type: ModelType,
        y: Vec<f64>,
        fixed: &FixedDesign,
        random: &[RandomDesign],
        additive: &'a G,
        dominance: Option<&'a G>,
        prior: &PriorConfig,
    ) -> Result<Self> {
        prior.validate(model_type.marker, model_type.dominance)?;
        let n = y.len();
        if n < 2 {
            return Err(GelexError::inconsistent("at least two samples are required").into());
        }
        if additive.rows() != n || fixed.x.nrows() != n {
            return Err(GelexError::inconsistent(format!(
                "design rows ({} markers, {} fixed) do not match {} phenotypes",
                additive.rows(),
                fixed.x.nrows(),
                n
            ))
            .into());
        }
        let dominance = match (model_type.dominance, dominance) {
            (true, Some(d)) => {
                if d.rows() != n || d.cols() != additive.cols() {
                    return Err(GelexError::inconsistent(
                        "dominance design does not match the additive design",
                    )
                    .into());
                }
                Some(d)
            }
            (true, None) => {
                return Err(GelexError::config(format!(
                    "{} needs a dominance design",
                    model_type
                ))
                .into())
            }
            (false, _) => None,
        };

        let y_var = math::variance(&y);
        if !(y_var > 0.0) {
            return Err(GelexError::inconsistent("phenotype has no variance").into());
        }

        let kind = model_type.marker;
        let additive = MarkerEffect::new(
            additive,
            kind,
            prior.pi_for(kind, false),
            prior.scale_for(kind),
            prior.nu,
            prior.h2,
            y_var,
        );
        let dominance = dominance.map(|d| {
            MarkerEffect::new(
                d,
                kind,
                prior.pi_for(kind, true),
                prior.scale_for(kind),
                prior.nu,
                prior.h2,
                y_var,
            )
        });

        let random = random
            .iter()
            .map(|r| {
                let cols: Vec<Vec<f64>> = (0..r.levels.len()).map(|j| r.z.col(j)).collect();
                let col_norms = cols.iter().map(|c| math::squared_norm(c)).collect();
                RandomEffect {
                    name: r.name.clone(),
                    levels: r.levels.clone(),
                    cols,
                    col_norms,
                    prior: prior.random,
                    init_variance: 0.1 * y_var,
                }
            })
            .collect();

        info!(
            "{}: {} samples, {} markers ({} monomorphic), initial marker variance {:.3e}",
            model_type,
            n,
            additive.n_markers(),
            additive.num_mono(),
            additive.init_variance
        );

        Ok(Self {
            model_type,
            y,
            y_var,
            fixed: FixedEffect::new(fixed),
            random,
            additive,
            dominance,
            ratio_prior: RatioPrior {
                mean: prior.ratio_mean,
                variance: prior.ratio_variance,
            },
            residual_prior: prior.residual,
            residual_init: 0.5 * y_var,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gelex_geno::{GenotypeMatrix, MarkerStats};

    #[test]
    fn test_parse_model_type() {
        let t: ModelType = "RRd".parse().unwrap();
        assert_eq!(t.marker, MarkerPrior::RR);
        assert!(t.dominance);
        assert!(t.correlated_dominance());

        let t: ModelType = "BayesBpi".parse().unwrap();
        assert_eq!(t.marker, MarkerPrior::Bpi);
        assert!(!t.dominance);

        let t: ModelType = "Cpid".parse().unwrap();
        assert_eq!(t.marker, MarkerPrior::Cpi);
        assert!(t.dominance);
        assert_eq!(t.to_string(), "BayesCpid");

        assert!("Q".parse::<ModelType>().is_err());
        assert!("d".parse::<ModelType>().is_err());
    }

    #[test]
    fn test_initial_marker_variance() {
        let data = vec![1.0, -1.0, 0.0, 0.0, 0.5, -0.5];
        let stats = MarkerStats::new(vec![1.0, 2.0, 1.0], vec![0.5, 0.0, 0.5], vec![1]);
        let g = GenotypeMatrix::new(2, data, stats);
        let fixed = FixedDesign::intercept(2);
        let model = BayesModel::new(
            "C".parse().unwrap(),
            vec![1.0, 3.0],
            &fixed,
            &[],
            &g,
            None,
            &PriorConfig::default(),
        )
        .unwrap();
        // var(y) = 2, two active markers, slab 0.05
        let expected = 0.5 * 2.0 / (2.0 * 0.05);
        assert!((model.additive.init_variance - expected).abs() < 1e-12);
        assert!((model.additive.variance_prior.s2 - expected * 0.5).abs() < 1e-12);
        assert_eq!(model.residual_init, 1.0);
    }

    #[test]
    fn test_dominance_requires_design() {
        let stats = MarkerStats::new(vec![1.0], vec![0.5], vec![]);
        let g = GenotypeMatrix::new(2, vec![1.0, -1.0], stats);
        let fixed = FixedDesign::intercept(2);
        let err = BayesModel::new(
            "Ad".parse().unwrap(),
            vec![1.0, 2.0],
            &fixed,
            &[],
            &g,
            None,
            &PriorConfig::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_rd_rejects_dom_pi_shorter_than_scales() {
        let stats = MarkerStats::new(vec![1.0], vec![0.5], vec![]);
        let g = GenotypeMatrix::new(2, vec![1.0, -1.0], stats.clone());
        let d = GenotypeMatrix::new(2, vec![0.5, -0.5], stats);
        let fixed = FixedDesign::intercept(2);
        let prior = PriorConfig {
            dom_pi: Some(vec![0.5, 0.5]),
            ..Default::default()
        };
        let err = BayesModel::new(
            "BayesRd".parse().unwrap(),
            vec![1.0, 2.0],
            &fixed,
            &[],
            &g,
            Some(&d),
            &prior,
        )
        .err()
        .unwrap();
        assert_eq!(
            gelex_geno::error_kind(&err),
            Some(gelex_geno::ErrorKind::ConfigInvalid)
        );
    }
}
