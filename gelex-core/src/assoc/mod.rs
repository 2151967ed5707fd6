//! Chunked marker association scan against a REML null model, optionally
//! leave-one-chromosome-out.

pub mod wald;
pub mod writer;

use std::io::Write;
use std::ops::Range;

use anyhow::{Context, Result};
use gelex_geno::{BedReader, GelexError, MarkerInfo};
use gelex_linalg::DenseMatrix;
use tracing::{debug, info};

use crate::data::standardize::{self, Policy};
use crate::grm::chromosome_groups;
use crate::reml::{loco, LocoSet, RemlConfig, RemlFit};
pub use wald::{JointResult, WaldResult, WaldTest};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Markers decoded per chunk.
    pub chunk_size: usize,
    /// Coding of the tested additive column.
    pub policy: Policy,
    /// Test additive and dominance effects jointly.
    pub joint: bool,
    pub loco: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10000,
            policy: Policy::AdditiveCentered,
            joint: false,
            loco: false,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(GelexError::config("chunk size must be positive").into());
        }
        if self.policy.is_dominance() {
            return Err(GelexError::config(format!(
                "scan policy must be additive, got {}",
                self.policy
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub n_tested: usize,
    /// Monomorphic or uninformative markers reported with `p = 1`.
    pub n_untestable: usize,
}

impl ScanSummary {
    fn merge(&mut self, other: ScanSummary) {
        self.n_tested += other.n_tested;
        self.n_untestable += other.n_untestable;
    }
}

/// Scan `ranges` of markers in order, writing one row per marker.
pub fn scan_ranges(
    reader: &BedReader,
    markers: &[MarkerInfo],
    ranges: &[Range<usize>],
    test: &WaldTest,
    config: &ScanConfig,
    out: &mut impl Write,
) -> Result<ScanSummary> {
    config.validate()?;
    let n = reader.n_samples();
    if test.n_samples() != n {
        return Err(GelexError::inconsistent(format!(
            "null model has {} samples, genotypes have {}",
            test.n_samples(),
            n
        ))
        .into());
    }
    let mut summary = ScanSummary::default();
    let mut add = Vec::new();
    let mut dom = Vec::new();

    for range in ranges {
        let mut start = range.start;
        while start < range.end {
            let end = (start + config.chunk_size).min(range.end);
            let k = end - start;
            add.resize(n * k, 0.0);
            reader.decode_chunk(start, end, &mut add)?;
            if config.joint {
                dom.clear();
                dom.extend_from_slice(&add);
                standardize::standardize_chunk(config.policy.dominance(), n, &mut dom);
            }
            let stats = standardize::standardize_chunk(config.policy, n, &mut add);
            let skip = |j: usize| stats.is_monomorphic(j);

            if config.joint {
                let results = test.test_joint_chunk(&add, &dom, k, &skip);
                for (j, r) in results.iter().enumerate() {
                    writer::write_joint_row(out, &markers[start + j], stats.freq(j), r)?;
                    summary.n_tested += 1;
                    if r.se_a.is_nan() {
                        summary.n_untestable += 1;
                    }
                }
            } else {
                let results = test.test_chunk(&add, k, &skip);
                for (j, r) in results.iter().enumerate() {
                    writer::write_row(out, &markers[start + j], stats.freq(j), r)?;
                    summary.n_tested += 1;
                    if r.se.is_nan() {
                        summary.n_untestable += 1;
                    }
                }
            }
            debug!("Scanned markers [{}, {})", start, end);
            start = end;
        }
    }
    Ok(summary)
}

/// Scan every marker against one null model.
pub fn scan(
    reader: &BedReader,
    markers: &[MarkerInfo],
    fit: RemlFit,
    y: &[f64],
    x: &DenseMatrix,
    config: &ScanConfig,
    out: &mut impl Write,
) -> Result<ScanSummary> {
    if markers.len() != reader.n_markers() {
        return Err(GelexError::inconsistent("marker list does not match the genotype file").into());
    }
    let test = WaldTest::new(fit, y, x);
    writer::write_header(out, config.joint)?;
    info!("Scanning {} markers", markers.len());
    let summary = scan_ranges(reader, markers, &[0..markers.len()], &test, config, out)?;
    out.flush()?;
    info!(
        "Tested {} markers ({} untestable)",
        summary.n_tested, summary.n_untestable
    );
    Ok(summary)
}

/// Refit the null model once per chromosome group with that chromosome
/// left out of the kernel, and scan each marker against its own group's
/// fit. Rows follow input marker order even when a chromosome's markers
/// are split into several runs; a group's fit is dropped after its last run.
#[allow(clippy::too_many_arguments)]
pub fn scan_loco(
    reader: &BedReader,
    markers: &[MarkerInfo],
    y: &[f64],
    x: &DenseMatrix,
    set: &LocoSet,
    extra: &[DenseMatrix],
    reml: &RemlConfig,
    config: &ScanConfig,
    out: &mut impl Write,
) -> Result<ScanSummary> {
    if markers.len() != reader.n_markers() {
        return Err(GelexError::inconsistent("marker list does not match the genotype file").into());
    }
    let groups = chromosome_groups(markers);
    for group in &groups {
        if set.position(&group.chrom).is_none() {
            return Err(GelexError::inconsistent(format!(
                "chromosome {} has markers but no LOCO GRM",
                group.chrom
            ))
            .into());
        }
    }

    let mut runs: Vec<(usize, Range<usize>)> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| group.ranges.iter().map(move |r| (g, r.clone())))
        .collect();
    runs.sort_by_key(|(_, r)| r.start);
    let mut last_run = vec![0; groups.len()];
    for (i, (g, _)) in runs.iter().enumerate() {
        last_run[*g] = i;
    }

    writer::write_header(out, config.joint)?;
    let mut summary = ScanSummary::default();
    let mut tests: Vec<Option<WaldTest>> = (0..groups.len()).map(|_| None).collect();
    for (i, (g, range)) in runs.iter().enumerate() {
        let group = &groups[*g];
        let test = match tests[*g].take() {
            Some(test) => test,
            None => {
                info!(
                    "LOCO: chromosome {} ({} markers)",
                    group.chrom,
                    group.n_markers()
                );
                let fit = loco::fit_excluding(y, x, set, &group.chrom, extra, reml)?;
                WaldTest::new(fit, y, x)
            }
        };
        let part = scan_ranges(reader, markers, std::slice::from_ref(range), &test, config, out)
            .with_context(|| format!("LOCO scan failed on chromosome {}", group.chrom))?;
        summary.merge(part);
        if last_run[*g] != i {
            tests[*g] = Some(test);
        }
    }
    out.flush()?;
    info!(
        "Tested {} markers across {} chromosomes ({} untestable)",
        summary.n_tested,
        groups.len(),
        summary.n_untestable
    );
    Ok(summary)
}
