//! Leave-one-chromosome-out kernels.
//!
//! A LOCO GRM set holds one unnormalized `K_c` per chromosome group. The
//! whole-genome kernel is their sum and the kernel used when testing
//! chromosome `c` is `(K − K_c) / (d − d_c)`, so markers on `c` never
//! contribute to the covariance they are tested against.

use anyhow::{Context, Result};
use gelex_geno::{grm_io, GelexError, SampleManager};
use gelex_linalg::DenseMatrix;
use tracing::{debug, info};

use super::ai_reml::{self, RemlConfig, RemlFit};

pub struct LocoSet {
    pub chroms: Vec<String>,
    per_chrom: Vec<DenseMatrix>,
    whole: DenseMatrix,
}

impl LocoSet {
    /// Load `<prefix>.chr<c>.grm.{bin,id}` for every chromosome listed in
    /// `<prefix>.loco.txt`, aligned to `samples`.
    pub fn load(prefix: &str, samples: &SampleManager) -> Result<Self> {
        let chroms = grm_io::read_loco_index(prefix)?;
        let mut per_chrom = Vec::with_capacity(chroms.len());
        for chrom in &chroms {
            let path = grm_io::chrom_prefix(prefix, chrom);
            let k = grm_io::read_grm(&path, samples)
                .with_context(|| format!("Failed to load LOCO GRM for chromosome {}", chrom))?;
            per_chrom.push(k);
        }
        Self::from_parts(chroms, per_chrom)
    }

    pub fn from_parts(chroms: Vec<String>, per_chrom: Vec<DenseMatrix>) -> Result<Self> {
        if chroms.len() < 2 || chroms.len() != per_chrom.len() {
            return Err(GelexError::inconsistent(format!(
                "LOCO needs at least two chromosome groups, found {}",
                per_chrom.len()
            ))
            .into());
        }
        let n = per_chrom[0].nrows();
        let mut whole = DenseMatrix::zeros(n, n);
        for k in &per_chrom {
            whole.add_scaled(k, 1.0);
        }
        info!("LOCO set with {} chromosome groups", chroms.len());
        Ok(Self {
            chroms,
            per_chrom,
            whole,
        })
    }

    pub fn position(&self, chrom: &str) -> Option<usize> {
        self.chroms.iter().position(|c| c == chrom)
    }

    /// Normalized kernel excluding chromosome `chrom`.
    pub fn kernel(&self, chrom: &str) -> Result<DenseMatrix> {
        let idx = self.position(chrom).ok_or_else(|| {
            GelexError::inconsistent(format!("chromosome {} is not in the LOCO set", chrom))
        })?;
        grm_io::loco_grm(&self.whole, &self.per_chrom[idx])
    }

    /// Normalized whole-genome kernel.
    pub fn whole(&self) -> Result<DenseMatrix> {
        let mut k = self.whole.clone();
        grm_io::normalize(&mut k)?;
        Ok(k)
    }
}

/// REML fit against the kernel that leaves out `chrom`. Extra kernels
/// (other GRMs) are fitted alongside it.
pub fn fit_excluding(
    y: &[f64],
    x: &DenseMatrix,
    set: &LocoSet,
    chrom: &str,
    extra: &[DenseMatrix],
    config: &RemlConfig,
) -> Result<RemlFit> {
    let mut grms = Vec::with_capacity(extra.len() + 1);
    grms.push(set.kernel(chrom)?);
    grms.extend(extra.iter().cloned());
    debug!("LOCO fit excluding chromosome {}", chrom);
    ai_reml::fit(y, x, &grms, config)
        .with_context(|| format!("LOCO REML failed for chromosome {}", chrom))
}
