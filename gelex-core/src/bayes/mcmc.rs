//! MCMC driver: burn-in, thinning and recording.

use anyhow::Result;
use gelex_geno::{GelexError, GenotypeStore};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::model::BayesModel;
use super::sampler::Pipeline;
use super::samples::McmcSamples;
use super::state::BayesState;

#[derive(Debug, Clone)]
pub struct McmcConfig {
    pub n_iters: usize,
    pub n_burnin: usize,
    pub n_thin: usize,
    pub seed: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            n_iters: 3000,
            n_burnin: 1000,
            n_thin: 1,
            seed: 42,
        }
    }
}

impl McmcConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_iters == 0 {
            return Err(GelexError::config("number of iterations must be positive").into());
        }
        if self.n_burnin >= self.n_iters {
            return Err(GelexError::config(format!(
                "burn-in ({}) must be below the number of iterations ({})",
                self.n_burnin, self.n_iters
            ))
            .into());
        }
        if self.n_thin == 0 {
            return Err(GelexError::config("thinning interval must be positive").into());
        }
        Ok(())
    }

    /// Whether iteration `iter` (0-based) writes a record.
    pub fn records(&self, iter: usize) -> bool {
        iter >= self.n_burnin && (iter + 1 - self.n_burnin) % self.n_thin == 0
    }

    pub fn n_records(&self) -> usize {
        (self.n_iters - self.n_burnin) / self.n_thin
    }
}

pub struct Mcmc {
    config: McmcConfig,
}

impl Mcmc {
    pub fn new(config: McmcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &McmcConfig {
        &self.config
    }

    pub fn run<G: GenotypeStore>(&self, model: &BayesModel<'_, G>) -> Result<McmcSamples> {
        self.run_with(model, |_, _| Ok(()))
    }

    /// Run the chain, calling `observe(iter, state)` after every iteration.
    pub fn run_with<G, F>(&self, model: &BayesModel<'_, G>, mut observe: F) -> Result<McmcSamples>
    where
        G: GenotypeStore,
        F: FnMut(usize, &BayesState) -> Result<()>,
    {
        let config = &self.config;
        let pipeline = Pipeline::new(model);
        let mut state = BayesState::new(model);
        let mut samples = McmcSamples::new(model);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        info!(
            "Running {}: {} iterations, burn-in {}, thin {}, seed {}",
            model.model_type, config.n_iters, config.n_burnin, config.n_thin, config.seed
        );
        let report_every = (config.n_iters / 10).max(1);

        for iter in 0..config.n_iters {
            pipeline.step(model, &mut state, &mut rng)?;
            if !state.residual.variance.is_finite() || !state.additive.variance.is_finite() {
                return Err(GelexError::numerical(format!(
                    "variance diverged at iteration {}",
                    iter + 1
                ))
                .into());
            }
            if config.records(iter) {
                samples.record(model, &state)?;
            }
            observe(iter, &state)?;

            debug!(
                "iter {}: residual {:.4}, add_var {:.4}, add_h2 {:.3}",
                iter + 1,
                state.residual.variance,
                state.additive.variance,
                state.additive.heritability
            );
            if (iter + 1) % report_every == 0 {
                info!(
                    "Iteration {}/{} ({}): h2 {:.3}",
                    iter + 1,
                    config.n_iters,
                    if iter < config.n_burnin { "burn-in" } else { "sampling" },
                    state.additive.heritability
                );
            }
        }

        info!("Recorded {} posterior samples", samples.n_records());
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_schedule() {
        let config = McmcConfig {
            n_iters: 10,
            n_burnin: 4,
            n_thin: 3,
            seed: 1,
        };
        let recorded: Vec<usize> = (0..10).filter(|&i| config.records(i)).collect();
        assert_eq!(recorded, vec![6, 9]);
        assert_eq!(config.n_records(), 2);
    }

    #[test]
    fn test_validate() {
        assert!(McmcConfig::default().validate().is_ok());
        let bad = McmcConfig {
            n_burnin: 3000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = McmcConfig {
            n_thin: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
