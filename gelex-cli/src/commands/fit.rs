//! Fit a Bayes alphabet model.
//!
//! gelex fit --bfile data --pheno pheno.txt --model BayesCpi --out run1

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use gelex_core::bayes::{writer, BayesModel, Mcmc, McmcConfig, ModelType, PriorConfig};
use gelex_core::data::{DataPipe, DataPipeConfig, Policy};
use gelex_geno::GenotypeStore;

#[derive(Args)]
pub struct FitArgs {
    /// PLINK file prefix (bed/bim/fam)
    #[arg(long)]
    bfile: String,

    /// Phenotype file (FID IID trait...)
    #[arg(long)]
    pheno: PathBuf,

    /// Phenotype column, counted from the first trait column
    #[arg(long, default_value = "0")]
    pheno_col: usize,

    /// Quantitative covariate file
    #[arg(long)]
    qcovar: Option<PathBuf>,

    /// Categorical covariate file
    #[arg(long)]
    dcovar: Option<PathBuf>,

    /// Categorical covariates fitted as random effects (comma-separated)
    #[arg(long, value_delimiter = ',')]
    rcovar: Vec<String>,

    /// Model: A, B, Bpi, C, Cpi, R, RR, optionally with a `d` suffix for
    /// dominance and a `Bayes` prefix
    #[arg(long, default_value = "RR")]
    model: ModelType,

    /// Total MCMC iterations
    #[arg(long, default_value = "3000")]
    iters: usize,

    /// Burn-in iterations
    #[arg(long, default_value = "1000")]
    burnin: usize,

    /// Thinning interval
    #[arg(long, default_value = "1")]
    thin: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Additive genotype coding (the dominance coding follows it)
    #[arg(long, default_value = "additive-standardized")]
    policy: Policy,

    /// Mixture proportions of the additive block (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pi: Option<Vec<f64>>,

    /// Mixture proportions of the dominance block (comma-separated)
    #[arg(long, value_delimiter = ',')]
    dom_pi: Option<Vec<f64>>,

    /// Component scales of BayesR (comma-separated, first must be 0)
    #[arg(long, value_delimiter = ',')]
    scale: Option<Vec<f64>>,

    /// Prior heritability used to size the marker variance
    #[arg(long, default_value = "0.5")]
    h2: f64,

    /// Degrees of freedom of the marker variance prior
    #[arg(long, default_value = "4")]
    nu: f64,

    /// Keep the coded genotypes in a memory-mapped file with this prefix
    /// instead of in memory
    #[arg(long)]
    mmap: Option<String>,

    /// Markers per chunk while decoding
    #[arg(long, default_value = "10000")]
    chunk_size: usize,

    /// Key samples by IID only
    #[arg(long, default_value = "false")]
    iid_only: bool,

    /// Output prefix for <out>.param, <out>.snp.eff and <out>.gv
    #[arg(long)]
    out: String,
}

pub fn run(args: FitArgs) -> Result<()> {
    info!("=== gelex fit: {} ===", args.model);
    if args.policy.is_dominance() {
        return Err(gelex_geno::GelexError::config(
            "--policy selects the additive coding; the dominance coding follows it",
        )
        .into());
    }
    let mcmc = Mcmc::new(McmcConfig {
        n_iters: args.iters,
        n_burnin: args.burnin,
        n_thin: args.thin,
        seed: args.seed,
    })?;
    let prior = PriorConfig {
        nu: args.nu,
        h2: args.h2,
        pi: args.pi.clone(),
        scale: args.scale.clone(),
        dom_pi: args.dom_pi.clone(),
        ..Default::default()
    };
    prior.validate(args.model.marker, args.model.dominance)?;

    let pipe = DataPipe::load(&DataPipeConfig {
        bfile: args.bfile.clone(),
        pheno: args.pheno.clone(),
        pheno_col: args.pheno_col,
        qcovar: args.qcovar.clone(),
        dcovar: args.dcovar.clone(),
        rcovar: args.rcovar.clone(),
        grms: Vec::new(),
        iid_only: args.iid_only,
        chunk_size: args.chunk_size,
    })?;

    let dominance = args.model.dominance;
    match &args.mmap {
        Some(prefix) => {
            let add = pipe.mapped_genotype_matrix(args.policy, prefix)?;
            let dom = if dominance {
                let dom_prefix = format!("{}.dom", prefix);
                Some(pipe.mapped_genotype_matrix(args.policy.dominance(), &dom_prefix)?)
            } else {
                None
            };
            fit_and_write(&args, &pipe, &mcmc, &prior, &add, dom.as_ref())
        }
        None => {
            let add = pipe.genotype_matrix(args.policy)?;
            let dom = if dominance {
                Some(pipe.genotype_matrix(args.policy.dominance())?)
            } else {
                None
            };
            fit_and_write(&args, &pipe, &mcmc, &prior, &add, dom.as_ref())
        }
    }
}

fn fit_and_write<G: GenotypeStore>(
    args: &FitArgs,
    pipe: &DataPipe,
    mcmc: &Mcmc,
    prior: &PriorConfig,
    add: &G,
    dom: Option<&G>,
) -> Result<()> {
    let model = BayesModel::new(
        args.model,
        pipe.y.clone(),
        &pipe.fixed,
        &pipe.random,
        add,
        dom,
        prior,
    )?;
    let samples = mcmc.run(&model)?;
    writer::write_outputs(&args.out, &model, &samples, &pipe.markers, &pipe.samples)?;
    info!("Done");
    Ok(())
}
