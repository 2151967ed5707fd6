//! Phenotype prediction for a new genotype panel from a fitted Bayesian
//! model's `.snp.eff` and `.param` outputs.

pub mod covariates;
pub mod effects;
pub mod engine;
pub mod matcher;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use gelex_geno::phenotype::{self, CatCovariates, QuantCovariates};
use gelex_geno::{plink, BedReader, Bfile, GelexError, SampleManager, SampleResolver};
use tracing::info;

use crate::data::Policy;
use crate::util::format;

pub use covariates::{CovariateEffects, CovariateTerm};
pub use effects::{SnpEffect, SnpEffects};
pub use engine::{genetic_values, GeneticValues};
pub use matcher::{match_alleles, AlleleMatch, MatchPlan};

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub bfile: String,
    pub snp_eff: PathBuf,
    /// `.param` file with covariate coefficients.
    pub covar_params: Option<PathBuf>,
    pub qcovar: Option<PathBuf>,
    pub dcovar: Option<PathBuf>,
    pub iid_only: bool,
    pub chunk_size: usize,
    /// Must match the coding used in training.
    pub policy: Policy,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            bfile: String::new(),
            snp_eff: PathBuf::new(),
            covar_params: None,
            qcovar: None,
            dcovar: None,
            iid_only: false,
            chunk_size: 10_000,
            policy: Policy::AdditiveStandardized,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub genetic: GeneticValues,
    pub covariates: Vec<CovariateTerm>,
    /// Covariate terms plus additive and dominance values.
    pub total: Vec<f64>,
}

impl Prediction {
    fn new(genetic: GeneticValues, covariates: Vec<CovariateTerm>) -> Self {
        let mut total: Vec<f64> = genetic
            .additive
            .iter()
            .zip(&genetic.dominant)
            .map(|(a, d)| a + d)
            .collect();
        for (_, col) in &covariates {
            for (t, v) in total.iter_mut().zip(col) {
                *t += v;
            }
        }
        Self {
            genetic,
            covariates,
            total,
        }
    }
}

pub fn predict(config: &PredictConfig) -> Result<(SampleManager, Prediction)> {
    if config.chunk_size == 0 {
        return Err(GelexError::config("chunk size must be positive").into());
    }
    let effects = SnpEffects::read(&config.snp_eff)?;
    if effects.is_empty() {
        return Err(GelexError::inconsistent(format!(
            "{} lists no markers",
            config.snp_eff.display()
        ))
        .into());
    }

    let bfile = Bfile::new(&config.bfile);
    let fam = plink::read_fam(&bfile.fam)?;
    let markers = plink::read_bim(&bfile.bim)?;

    let qcovar = match &config.qcovar {
        Some(path) => phenotype::read_qcovar(path, config.iid_only)?,
        None => QuantCovariates::default(),
    };
    let dcovar = match &config.dcovar {
        Some(path) => phenotype::read_dcovar(path, config.iid_only)?,
        None => CatCovariates::default(),
    };
    let mut resolver = SampleResolver::new(&fam, config.iid_only);
    if config.qcovar.is_some() {
        resolver.intersect(qcovar.values.keys().map(String::as_str));
    }
    if config.dcovar.is_some() {
        resolver.intersect(dcovar.values.keys().map(String::as_str));
    }
    let samples = resolver.finalize()?;
    let n = samples.len();
    info!("Predicting {} samples from {} markers", n, markers.len());

    let plan = MatchPlan::new(&markers, &effects);
    let reader = BedReader::open(&bfile.bed, markers.len(), &samples)?;
    let genetic = genetic_values(&reader, &plan, &effects, config.policy, config.chunk_size)?;
    info!(
        "Used {} of {} trained effects",
        plan.n_used(),
        effects.len()
    );

    let covariates = match &config.covar_params {
        Some(path) => {
            let coefs = CovariateEffects::read(path)?;
            let qvalues = if qcovar.names.is_empty() {
                vec![Vec::new(); n]
            } else {
                samples.align(&qcovar.values)?
            };
            let dvalues = if dcovar.names.is_empty() {
                vec![Vec::new(); n]
            } else {
                samples.align(&dcovar.values)?
            };
            coefs.apply(n, &qcovar.names, &qvalues, &dcovar.names, &dvalues)
        }
        None => Vec::new(),
    };

    Ok((samples, Prediction::new(genetic, covariates)))
}

pub fn predict_path(out: &str) -> PathBuf {
    PathBuf::from(format!("{}.predict", out))
}

/// `FID IID prediction <covariate terms...> additive dominant`.
pub fn write_predictions<W: Write>(
    w: &mut W,
    samples: &SampleManager,
    prediction: &Prediction,
) -> Result<()> {
    write!(w, "FID\tIID\tprediction")?;
    for (name, _) in &prediction.covariates {
        write!(w, "\t{}", name)?;
    }
    writeln!(w, "\tadditive\tdominant")?;
    for i in 0..samples.len() {
        let (fid, iid) = samples.fid_iid(i);
        write!(w, "{}\t{}\t{}", fid, iid, format::exact(prediction.total[i]))?;
        for (_, col) in &prediction.covariates {
            write!(w, "\t{}", format::exact(col[i]))?;
        }
        writeln!(
            w,
            "\t{}\t{}",
            format::exact(prediction.genetic.additive[i]),
            format::exact(prediction.genetic.dominant[i])
        )?;
    }
    Ok(())
}

pub fn write_prediction_file(path: &Path, samples: &SampleManager, prediction: &Prediction) -> Result<()> {
    let mut w = crate::bayes::writer::create(path)?;
    write_predictions(&mut w, samples, prediction)?;
    w.flush()?;
    info!("Wrote predictions to {}", path.display());
    Ok(())
}
