//! Dense GRM construction.
//!
//! Accumulates `K = Σ_m z_m z_m'` over coded marker columns with a
//! symmetric rank-k update per chunk. `K` is returned unnormalized together
//! with its denominator `trace(K) / n`.

use std::ops::Range;

use anyhow::Result;
use gelex_geno::{BedReader, GelexError, MarkerInfo};
use gelex_linalg::DenseMatrix;
use tracing::{debug, info};

use crate::data::standardize::{standardize_chunk, Policy};

#[derive(Debug, Clone)]
pub struct GrmConfig {
    /// Markers decoded per rank-k update.
    pub chunk_size: usize,
    pub policy: Policy,
}

impl Default for GrmConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10000,
            policy: Policy::AdditiveStandardized,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GrmResult {
    /// Unnormalized `Z Z'`, symmetric.
    pub k: DenseMatrix,
    /// `trace(K) / n`.
    pub denominator: f64,
    pub n_markers: usize,
}

impl GrmResult {
    fn finish(mut k: DenseMatrix, n_markers: usize) -> Self {
        k.fill_upper_from_lower();
        let n = k.nrows().max(1) as f64;
        let denominator = k.trace() / n;
        Self {
            k,
            denominator,
            n_markers,
        }
    }

    /// Sum of results over disjoint marker sets.
    pub fn combine(parts: &[GrmResult]) -> Option<GrmResult> {
        let first = parts.first()?;
        let mut k = first.k.clone();
        for part in &parts[1..] {
            k.add_scaled(&part.k, 1.0);
        }
        let n_markers = parts.iter().map(|p| p.n_markers).sum();
        Some(GrmResult::finish(k, n_markers))
    }
}

/// Markers sharing one chromosome label, as one or more contiguous ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromGroup {
    pub chrom: String,
    pub ranges: Vec<Range<usize>>,
}

impl ChromGroup {
    pub fn n_markers(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    pub fn contains(&self, j: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(&j))
    }
}

/// Group markers by chromosome in order of first appearance.
pub fn chromosome_groups(markers: &[MarkerInfo]) -> Vec<ChromGroup> {
    let mut groups: Vec<ChromGroup> = Vec::new();
    let mut start = 0;
    for j in 1..=markers.len() {
        if j < markers.len() && markers[j].chrom == markers[start].chrom {
            continue;
        }
        let chrom = &markers[start].chrom;
        match groups.iter_mut().find(|g| &g.chrom == chrom) {
            Some(g) => g.ranges.push(start..j),
            None => groups.push(ChromGroup {
                chrom: chrom.clone(),
                ranges: vec![start..j],
            }),
        }
        start = j;
    }
    groups
}

/// Compute `K` over the union of `ranges`. `progress(processed, total)` is
/// called on the calling thread after every chunk.
pub fn compute<P>(
    reader: &BedReader,
    ranges: &[Range<usize>],
    config: &GrmConfig,
    progress: &mut P,
) -> Result<GrmResult>
where
    P: FnMut(usize, usize),
{
    if config.chunk_size == 0 {
        return Err(GelexError::config("chunk size must be positive").into());
    }
    let n = reader.n_samples();
    let total: usize = ranges.iter().map(|r| r.len()).sum();
    debug!(
        "GRM over {} markers in {} ranges ({})",
        total,
        ranges.len(),
        config.policy
    );

    let mut k = DenseMatrix::zeros(n, n);
    let mut buf = Vec::new();
    let mut processed = 0;
    for range in ranges {
        let mut start = range.start;
        while start < range.end {
            let end = (start + config.chunk_size).min(range.end);
            let width = end - start;
            buf.resize(n * width, 0.0);
            reader.decode_chunk(start, end, &mut buf)?;
            standardize_chunk(config.policy, n, &mut buf);
            let z = DenseMatrix::from_col_major(n, width, &buf);
            k.syrk_lower(&z);

            processed += width;
            progress(processed, total);
            start = end;
        }
    }
    Ok(GrmResult::finish(k, total))
}

/// One `K` per chromosome group.
pub fn compute_loco<P>(
    reader: &BedReader,
    groups: &[ChromGroup],
    config: &GrmConfig,
    progress: &mut P,
) -> Result<Vec<GrmResult>>
where
    P: FnMut(usize, usize),
{
    let total: usize = groups.iter().map(|g| g.n_markers()).sum();
    let mut offset = 0;
    let mut results = Vec::with_capacity(groups.len());
    for group in groups {
        let mut inner = |done: usize, _: usize| progress(offset + done, total);
        let result = compute(reader, &group.ranges, config, &mut inner)?;
        info!(
            "Chromosome {}: {} markers, denominator {:.4}",
            group.chrom, result.n_markers, result.denominator
        );
        offset += result.n_markers;
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gelex_geno::testing::{write_bfile, write_bfile_with};
    use gelex_geno::SampleManager;

    fn open(prefix: &std::path::Path, m: usize) -> BedReader {
        let bfile = gelex_geno::Bfile::new(&prefix.to_string_lossy());
        let fam = gelex_geno::plink::read_fam(&bfile.fam).unwrap();
        let sm = SampleManager::from_fam(&fam, false).unwrap();
        BedReader::open(&bfile.bed, m, &sm).unwrap()
    }

    fn geno() -> Vec<Vec<i32>> {
        vec![
            vec![0, 1, 2, 1, 0],
            vec![2, 1, 0, 0, 1],
            vec![1, 1, 1, 2, 0],
            vec![0, 0, 2, 2, 1],
        ]
    }

    #[test]
    fn test_grm_symmetric_and_denominator() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        write_bfile(&prefix, &geno()).unwrap();
        let reader = open(&prefix, 4);

        let mut calls = Vec::new();
        let config = GrmConfig {
            chunk_size: 3,
            policy: Policy::AdditiveStandardized,
        };
        let r = compute(&reader, &[0..4], &config, &mut |p, t| calls.push((p, t))).unwrap();
        assert_eq!(calls, vec![(3, 4), (4, 4)]);
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(r.k.get(i, j), r.k.get(j, i));
            }
        }
        assert!((r.denominator - r.k.trace() / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_chunking_does_not_change_k() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        write_bfile(&prefix, &geno()).unwrap();
        let reader = open(&prefix, 4);
        let one = GrmConfig {
            chunk_size: 1,
            policy: Policy::DominanceCentered,
        };
        let all = GrmConfig {
            chunk_size: 100,
            policy: Policy::DominanceCentered,
        };
        let a = compute(&reader, &[0..4], &one, &mut |_, _| {}).unwrap();
        let b = compute(&reader, &[0..4], &all, &mut |_, _| {}).unwrap();
        let mut diff = a.k.clone();
        diff.add_scaled(&b.k, -1.0);
        assert!(diff.frobenius_norm() < 1e-10);
    }

    #[test]
    fn test_loco_groups_sum_to_whole() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g");
        let chroms: Vec<String> = ["1", "1", "2", "1"].iter().map(|s| s.to_string()).collect();
        write_bfile_with(&prefix, &geno(), &chroms).unwrap();
        let markers = gelex_geno::plink::read_bim(&prefix.with_extension("bim")).unwrap();
        let groups = chromosome_groups(&markers);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].ranges, vec![0..2, 3..4]);
        assert_eq!(groups[1].ranges, vec![2..3]);

        let reader = open(&prefix, 4);
        let config = GrmConfig::default();
        let parts = compute_loco(&reader, &groups, &config, &mut |_, _| {}).unwrap();
        let whole = compute(&reader, &[0..4], &config, &mut |_, _| {}).unwrap();
        let sum = GrmResult::combine(&parts).unwrap();
        let mut diff = sum.k.clone();
        diff.add_scaled(&whole.k, -1.0);
        assert!(diff.frobenius_norm() < 1e-10);
        assert_eq!(sum.n_markers, 4);
    }
}
