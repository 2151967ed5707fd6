//! Fit the null mixed model and scan markers.
//!
//! gelex assoc --bfile data --pheno pheno.txt --grm data.add --out scan1
//! gelex assoc --bfile data --pheno pheno.txt --loco-grm data.add --out scan1

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use gelex_core::assoc::{self, ScanConfig};
use gelex_core::data::{DataPipe, DataPipeConfig, Policy};
use gelex_core::model::{self, RemlModel};
use gelex_core::reml::{self, ai_reml, LocoSet, RemlConfig, RemlFit};
use gelex_geno::{grm_io, GelexError};

#[derive(Args)]
pub struct AssocArgs {
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

    /// GRM prefixes, one variance component each (comma-separated)
    #[arg(long, value_delimiter = ',')]
    grm: Vec<String>,

    /// Per-chromosome GRM set written by `gelex grm --loco`; enables LOCO
    #[arg(long)]
    loco_grm: Option<String>,

    /// Reuse a saved null model instead of refitting (not with LOCO)
    #[arg(long)]
    reml_model: Option<PathBuf>,

    /// Save the null model to <out>.reml.model
    #[arg(long, default_value = "false")]
    save_model: bool,

    /// Also save a JSON sidecar of the null model
    #[arg(long, default_value = "false")]
    save_json: bool,

    /// Test additive and dominance effects jointly (2 df)
    #[arg(long, default_value = "false")]
    joint: bool,

    /// Additive genotype coding used in the scan
    #[arg(long, default_value = "additive-centered")]
    policy: Policy,

    /// Markers per chunk
    #[arg(long, default_value = "10000")]
    chunk_size: usize,

    /// Maximum AI-REML iterations
    #[arg(long, default_value = "100")]
    max_iter: usize,

    /// Convergence tolerance
    #[arg(long, default_value = "1e-8")]
    tol: f64,

    /// Skip the EM warm-up step
    #[arg(long, default_value = "false")]
    no_em: bool,

    /// Key samples by IID only
    #[arg(long, default_value = "false")]
    iid_only: bool,

    /// Output prefix for <out>.assoc
    #[arg(long)]
    out: String,
}

pub fn run(args: AssocArgs) -> Result<()> {
    info!("=== gelex assoc ===");
    let scan_config = ScanConfig {
        chunk_size: args.chunk_size,
        policy: args.policy,
        joint: args.joint,
        loco: args.loco_grm.is_some(),
    };
    scan_config.validate()?;
    let reml_config = RemlConfig {
        max_iter: args.max_iter,
        tol: args.tol,
        em_init: !args.no_em,
    };
    reml_config.validate()?;
    if args.loco_grm.is_some() && args.reml_model.is_some() {
        return Err(GelexError::config("--reml-model cannot be combined with --loco-grm").into());
    }
    if args.loco_grm.is_none() && args.grm.is_empty() {
        return Err(GelexError::config("at least one --grm or a --loco-grm set is required").into());
    }

    // Every GRM sample list takes part in the intersection.
    let mut grm_ids = args.grm.clone();
    if let Some(prefix) = &args.loco_grm {
        for chrom in grm_io::read_loco_index(prefix)? {
            grm_ids.push(grm_io::chrom_prefix(prefix, &chrom));
        }
    }
    let pipe = DataPipe::load(&DataPipeConfig {
        bfile: args.bfile.clone(),
        pheno: args.pheno.clone(),
        pheno_col: args.pheno_col,
        qcovar: args.qcovar.clone(),
        dcovar: args.dcovar.clone(),
        rcovar: Vec::new(),
        grms: grm_ids,
        iid_only: args.iid_only,
        chunk_size: args.chunk_size,
    })?;
    let grms = pipe.read_grms(&args.grm)?;
    let reader = pipe.reader()?;
    let x = &pipe.fixed.x;

    let path = PathBuf::from(format!("{}.assoc", args.out));
    let file = File::create(&path)
        .map_err(|e| GelexError::resource(format!("cannot create output: {}", e)).with_file(&path))?;
    let mut out = BufWriter::new(file);

    let summary = match &args.loco_grm {
        Some(prefix) => {
            let set = LocoSet::load(prefix, &pipe.samples)?;
            assoc::scan_loco(
                &reader,
                &pipe.markers,
                &pipe.y,
                x,
                &set,
                &grms,
                &reml_config,
                &scan_config,
                &mut out,
            )?
        }
        None => {
            let fit = match &args.reml_model {
                Some(path) => refit_saved(path, &pipe, &args.grm, &grms)?,
                None => reml::fit(&pipe.y, x, &grms, &reml_config)?,
            };
            if !fit.converged {
                warn!("REML did not converge in {} iterations", fit.iterations);
            }
            let saved = RemlModel::from_fit(
                &fit,
                pipe.samples.common_ids().to_vec(),
                args.grm.clone(),
                pipe.fixed.names.clone(),
            );
            info!("{}", model::model_summary(&saved));
            if args.save_model {
                let path = PathBuf::from(format!("{}.reml.model", args.out));
                model::save_model(&saved, &path)?;
                if args.save_json {
                    model::save_model_json(&saved, &path.with_extension("model.json"))?;
                }
                info!("Saved null model to {}", path.display());
            }
            assoc::scan(&reader, &pipe.markers, fit, &pipe.y, x, &scan_config, &mut out)?
        }
    };

    info!(
        "Wrote {} ({} markers, {} untestable)",
        path.display(),
        summary.n_tested,
        summary.n_untestable
    );
    Ok(())
}

/// Rebuild `V⁻¹` at the saved components after checking the model was fitted
/// on the same samples, kernels and fixed effects.
fn refit_saved(path: &Path, pipe: &DataPipe, prefixes: &[String], grms: &[gelex_linalg::DenseMatrix]) -> Result<RemlFit> {
    let saved = model::load_model(path)?;
    if saved.sample_ids != pipe.samples.common_ids() {
        return Err(GelexError::inconsistent("saved model was fitted on a different sample set")
            .with_file(path)
            .into());
    }
    if saved.grms != prefixes || saved.fixed_names != pipe.fixed.names {
        return Err(GelexError::inconsistent(
            "saved model uses different GRMs or fixed effects",
        )
        .with_file(path)
        .into());
    }
    info!("Loaded null model from {}", path.display());
    ai_reml::evaluate_at(&pipe.y, &pipe.fixed.x, grms, &saved.sigma)
}
