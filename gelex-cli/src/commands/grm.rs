//! Build a GRM from PLINK genotypes.
//!
//! gelex grm --bfile data --out data.add [--loco] [--policy additive-standardized]

use anyhow::Result;
use clap::Args;
use tracing::info;

use gelex_core::data::Policy;
use gelex_core::grm::{self, GrmConfig, GrmResult};
use gelex_geno::{grm_io, plink, BedReader, Bfile, SampleManager};

#[derive(Args)]
pub struct GrmArgs {
    /// PLINK file prefix (bed/bim/fam)
    #[arg(long)]
    bfile: String,

    /// Output prefix for <out>.grm.bin / <out>.grm.id
    #[arg(long)]
    out: String,

    /// Genotype coding: additive-centered, additive-standardized,
    /// dominance-centered or dominance-standardized
    #[arg(long, default_value = "additive-standardized")]
    policy: Policy,

    /// Markers per chunk
    #[arg(long, default_value = "10000")]
    chunk_size: usize,

    /// Also write one GRM per chromosome for LOCO scans
    #[arg(long, default_value = "false")]
    loco: bool,

    /// Key samples by IID only
    #[arg(long, default_value = "false")]
    iid_only: bool,
}

pub fn run(args: GrmArgs) -> Result<()> {
    info!("=== gelex grm ===");
    let bfile = Bfile::new(&args.bfile);
    let fam = plink::read_fam(&bfile.fam)?;
    let markers = plink::read_bim(&bfile.bim)?;
    let samples = SampleManager::from_fam(&fam, args.iid_only)?;
    let reader = BedReader::open(&bfile.bed, markers.len(), &samples)?;
    info!(
        "{} samples, {} markers, {} coding",
        samples.len(),
        markers.len(),
        args.policy
    );

    let config = GrmConfig {
        chunk_size: args.chunk_size,
        policy: args.policy,
    };
    let total = markers.len();
    let step = (total / 10).max(1);
    let mut next = step;
    let mut progress = |done: usize, _: usize| {
        if done >= next || done == total {
            info!("GRM: {}/{} markers", done, total);
            next = done + step;
        }
    };

    let whole = if args.loco {
        let groups = grm::chromosome_groups(&markers);
        let parts = grm::compute_loco(&reader, &groups, &config, &mut progress)?;
        let mut chroms = Vec::with_capacity(groups.len());
        for (group, part) in groups.iter().zip(&parts) {
            grm_io::write_grm(&grm_io::chrom_prefix(&args.out, &group.chrom), &part.k, &samples)?;
            chroms.push(group.chrom.clone());
        }
        grm_io::write_loco_index(&args.out, &chroms)?;
        info!("Wrote {} per-chromosome GRMs", chroms.len());
        GrmResult::combine(&parts)
    } else {
        Some(grm::compute(&reader, &[0..total], &config, &mut progress)?)
    };

    if let Some(result) = whole {
        grm_io::write_grm(&args.out, &result.k, &samples)?;
        info!(
            "GRM over {} markers, denominator {:.4}",
            result.n_markers, result.denominator
        );
    }
    Ok(())
}
