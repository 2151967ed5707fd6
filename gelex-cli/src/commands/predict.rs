//! Predict genetic values of a new cohort.
//!
//! gelex predict --bfile new --snp-eff run1.snp.eff --covar-params run1.param --out new1

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use gelex_core::data::Policy;
use gelex_core::predict::{self, PredictConfig};

#[derive(Args)]
pub struct PredictArgs {
    /// PLINK file prefix of the cohort to predict
    #[arg(long)]
    bfile: String,

    /// Marker effects written by `gelex fit`
    #[arg(long)]
    snp_eff: PathBuf,

    /// Parameter file written by `gelex fit`, for covariate effects
    #[arg(long)]
    covar_params: Option<PathBuf>,

    /// Quantitative covariate file
    #[arg(long)]
    qcovar: Option<PathBuf>,

    /// Categorical covariate file
    #[arg(long)]
    dcovar: Option<PathBuf>,

    /// Additive genotype coding; must match the one used by `gelex fit`
    #[arg(long, default_value = "additive-standardized")]
    policy: Policy,

    /// Markers per chunk
    #[arg(long, default_value = "10000")]
    chunk_size: usize,

    /// Key samples by IID only
    #[arg(long, default_value = "false")]
    iid_only: bool,

    /// Output prefix for <out>.predict
    #[arg(long)]
    out: String,
}

pub fn run(args: PredictArgs) -> Result<()> {
    info!("=== gelex predict ===");
    let config = PredictConfig {
        bfile: args.bfile,
        snp_eff: args.snp_eff,
        covar_params: args.covar_params,
        qcovar: args.qcovar,
        dcovar: args.dcovar,
        iid_only: args.iid_only,
        chunk_size: args.chunk_size,
        policy: args.policy,
    };
    let (samples, prediction) = predict::predict(&config)?;
    predict::write_prediction_file(&predict::predict_path(&args.out), &samples, &prediction)?;
    Ok(())
}
