//! Core types and traits for genotype storage.

/// Variant metadata, one per BIM line.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInfo {
    /// Chromosome (e.g. "1", "22", "X").
    pub chrom: String,
    /// Marker/variant ID (e.g. rsID).
    pub id: String,
    /// Genetic distance in centimorgans.
    pub cm: f64,
    /// Position in base pairs.
    pub pos: u64,
    /// Counted allele.
    pub a1: String,
    pub a2: String,
}

/// Per-marker statistics recorded while standardizing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerStats {
    /// Mean of the raw 0/1/2 counts after imputation.
    pub means: Vec<f64>,
    /// Population standard deviation of the raw counts.
    pub stddevs: Vec<f64>,
    /// Indices of monomorphic markers, ascending.
    pub mono_indices: Vec<usize>,
    mono_flags: Vec<bool>,
}

impl MarkerStats {
    pub fn new(means: Vec<f64>, stddevs: Vec<f64>, mono_indices: Vec<usize>) -> Self {
        let mut mono_flags = vec![false; means.len()];
        for &j in &mono_indices {
            mono_flags[j] = true;
        }
        Self {
            means,
            stddevs,
            mono_indices,
            mono_flags,
        }
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn is_monomorphic(&self, j: usize) -> bool {
        self.mono_flags[j]
    }

    /// Counted-allele frequency `mean / 2`.
    pub fn freq(&self, j: usize) -> f64 {
        self.means[j] / 2.0
    }

    /// Append the statistics of another marker block.
    pub fn extend(&mut self, other: &MarkerStats) {
        let offset = self.means.len();
        self.means.extend_from_slice(&other.means);
        self.stddevs.extend_from_slice(&other.stddevs);
        self.mono_indices
            .extend(other.mono_indices.iter().map(|&j| j + offset));
        self.mono_flags.extend_from_slice(&other.mono_flags);
    }
}

/// Read-only column access to a standardized genotype matrix.
///
/// Implemented by the owned [`crate::matrix::GenotypeMatrix`] and the
/// memory-mapped [`crate::mmap::MappedGenotypeMatrix`]. Samplers are generic
/// over this trait so the concrete storage is fixed at construction.
pub trait GenotypeStore: Sync {
    fn rows(&self) -> usize;

    fn cols(&self) -> usize;

    /// Column `j`, `rows()` contiguous values.
    fn col(&self, j: usize) -> &[f64];

    fn stats(&self) -> &MarkerStats;

    fn mean(&self, j: usize) -> f64 {
        self.stats().means[j]
    }

    fn stddev(&self, j: usize) -> f64 {
        self.stats().stddevs[j]
    }

    fn is_monomorphic(&self, j: usize) -> bool {
        self.stats().is_monomorphic(j)
    }

    fn num_mono(&self) -> usize {
        self.stats().mono_indices.len()
    }

    /// Squared column norms `‖Z[:, j]‖²`.
    fn col_norms(&self) -> Vec<f64> {
        (0..self.cols())
            .map(|j| self.col(j).iter().map(|v| v * v).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_extend_offsets_mono() {
        let mut a = MarkerStats::new(vec![1.0, 0.0], vec![0.5, 0.0], vec![1]);
        let b = MarkerStats::new(vec![2.0, 1.0], vec![0.0, 0.7], vec![0]);
        a.extend(&b);
        assert_eq!(a.len(), 4);
        assert_eq!(a.mono_indices, vec![1, 2]);
        assert!(a.is_monomorphic(2));
        assert!(!a.is_monomorphic(3));
        assert_eq!(a.freq(3), 0.5);
    }
}
