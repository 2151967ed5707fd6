//! Owned, column-major standardized genotype matrix.

use anyhow::Result;

use crate::error::GelexError;
use crate::traits::{GenotypeStore, MarkerStats};

#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    n_samples: usize,
    n_markers: usize,
    data: Vec<f64>,
    stats: MarkerStats,
}

impl GenotypeMatrix {
    /// `data` is column-major, `n_samples * stats.len()` values.
    pub fn new(n_samples: usize, data: Vec<f64>, stats: MarkerStats) -> Self {
        let n_markers = stats.len();
        assert_eq!(data.len(), n_samples * n_markers);
        Self {
            n_samples,
            n_markers,
            data,
            stats,
        }
    }

    pub fn empty(n_samples: usize) -> Self {
        Self::new(n_samples, Vec::new(), MarkerStats::default())
    }

    /// Append a column-major chunk and its statistics.
    pub fn append(&mut self, chunk: &[f64], stats: &MarkerStats) -> Result<()> {
        if chunk.len() != self.n_samples * stats.len() {
            return Err(GelexError::inconsistent(format!(
                "chunk of {} values does not hold {} markers of {} samples",
                chunk.len(),
                stats.len(),
                self.n_samples
            ))
            .into());
        }
        self.data.extend_from_slice(chunk);
        self.stats.extend(stats);
        self.n_markers += stats.len();
        Ok(())
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl GenotypeStore for GenotypeMatrix {
    fn rows(&self) -> usize {
        self.n_samples
    }

    fn cols(&self) -> usize {
        self.n_markers
    }

    fn col(&self, j: usize) -> &[f64] {
        let n = self.n_samples;
        &self.data[j * n..(j + 1) * n]
    }

    fn stats(&self) -> &MarkerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_col() {
        let mut m = GenotypeMatrix::empty(2);
        m.append(&[1.0, 2.0], &MarkerStats::new(vec![1.5], vec![0.5], vec![]))
            .unwrap();
        m.append(
            &[0.0, 0.0, 3.0, 4.0],
            &MarkerStats::new(vec![0.0, 1.0], vec![0.0, 0.5], vec![0]),
        )
        .unwrap();
        assert_eq!(m.cols(), 3);
        assert_eq!(m.col(2), &[3.0, 4.0]);
        assert!(m.is_monomorphic(1));
        assert_eq!(m.num_mono(), 1);
        assert_eq!(m.col_norms(), vec![5.0, 0.0, 25.0]);
    }

    #[test]
    fn test_append_rejects_ragged_chunk() {
        let mut m = GenotypeMatrix::empty(2);
        let err = m
            .append(&[1.0, 2.0, 3.0], &MarkerStats::new(vec![1.5], vec![0.5], vec![]))
            .unwrap_err();
        assert_eq!(
            crate::error::error_kind(&err),
            Some(crate::error::ErrorKind::InputInconsistent)
        );
        assert_eq!(m.cols(), 0);
    }
}
