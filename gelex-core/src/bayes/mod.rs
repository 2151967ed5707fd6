//! Bayesian marker regression: the Bayes alphabet sampled by Gibbs and
//! Metropolis-Hastings moves, with posterior summaries and writers.

pub mod dist;
pub mod mcmc;
pub mod model;
pub mod posterior;
pub mod prior;
pub mod sampler;
pub mod samples;
pub mod state;
pub mod writer;

pub use mcmc::{Mcmc, McmcConfig};
pub use model::{BayesModel, MarkerPrior, ModelType};
pub use posterior::{summarize, Summary};
pub use prior::{PriorConfig, ScaledInvChiSq};
pub use samples::McmcSamples;
pub use state::BayesState;
