//! gelex-core: statistical engine for gelex.
//!
//! Data pipeline and genotype coding, GRM construction, Bayesian
//! alphabet models with a Gibbs MCMC driver, AI-REML, Wald association
//! scans (optionally LOCO), genomic prediction, and model persistence.

pub mod assoc;
pub mod bayes;
pub mod data;
pub mod grm;
pub mod model;
pub mod predict;
pub mod reml;
pub mod util;
