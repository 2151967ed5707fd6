//! Memory-mapped standardized genotype matrix.
//!
//! `<prefix>.bin` holds the column-major f64 values. `<prefix>.stats` holds,
//! little-endian: `n_samples: i64, n_variants: i64, n_mono: i64,
//! mono_indices: [i64; n_mono], means: [f64; n_variants],
//! stddevs: [f64; n_variants]`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::Mmap;
use tracing::info;

use crate::error::GelexError;
use crate::traits::{GenotypeStore, MarkerStats};

pub fn bin_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.bin", prefix))
}

pub fn stats_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.stats", prefix))
}

/// Streams standardized chunks to `<prefix>.bin`; the stats file is written
/// by [`StandardizedWriter::finish`].
pub struct StandardizedWriter {
    prefix: String,
    out: BufWriter<File>,
    n_samples: usize,
    stats: MarkerStats,
}

impl StandardizedWriter {
    pub fn create(prefix: &str, n_samples: usize) -> Result<Self> {
        let path = bin_path(prefix);
        let file = File::create(&path).map_err(|e| {
            GelexError::resource(format!("cannot create file: {}", e)).with_file(&path)
        })?;
        Ok(Self {
            prefix: prefix.to_string(),
            out: BufWriter::new(file),
            n_samples,
            stats: MarkerStats::default(),
        })
    }

    pub fn write_chunk(&mut self, chunk: &[f64], stats: &MarkerStats) -> Result<()> {
        if chunk.len() != self.n_samples * stats.len() {
            return Err(GelexError::inconsistent(format!(
                "chunk of {} values does not hold {} markers of {} samples",
                chunk.len(),
                stats.len(),
                self.n_samples
            ))
            .into());
        }
        for v in chunk {
            self.out.write_all(&v.to_le_bytes())?;
        }
        self.stats.extend(stats);
        Ok(())
    }

    /// Flush the matrix and write the statistics file.
    pub fn finish(mut self) -> Result<MarkerStats> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", bin_path(&self.prefix).display()))?;
        write_stats(&stats_path(&self.prefix), self.n_samples, &self.stats)?;
        info!(
            "Standardized matrix written to {} ({} x {})",
            bin_path(&self.prefix).display(),
            self.n_samples,
            self.stats.len()
        );
        Ok(self.stats)
    }
}

pub fn write_stats(path: &Path, n_samples: usize, stats: &MarkerStats) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        GelexError::resource(format!("cannot create file: {}", e)).with_file(path)
    })?;
    let mut w = BufWriter::new(file);
    w.write_all(&(n_samples as i64).to_le_bytes())?;
    w.write_all(&(stats.len() as i64).to_le_bytes())?;
    w.write_all(&(stats.mono_indices.len() as i64).to_le_bytes())?;
    for &j in &stats.mono_indices {
        w.write_all(&(j as i64).to_le_bytes())?;
    }
    for v in &stats.means {
        w.write_all(&v.to_le_bytes())?;
    }
    for v in &stats.stddevs {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Read a stats file, returning `(n_samples, stats)`.
pub fn read_stats(path: &Path) -> Result<(usize, MarkerStats)> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read stats file: {}", path.display()))?;
    let bad = |msg: &str| anyhow::Error::from(GelexError::malformed(msg).with_file(path));

    let word = |k: usize| -> Option<[u8; 8]> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes.get(8 * k..8 * k + 8)?);
        Some(buf)
    };
    let header: Vec<i64> = (0..3).filter_map(|k| word(k).map(i64::from_le_bytes)).collect();
    if header.len() != 3 || header.iter().any(|&v| v < 0) {
        return Err(bad("stats header truncated or negative"));
    }
    let (n_samples, n_variants, n_mono) =
        (header[0] as usize, header[1] as usize, header[2] as usize);
    let expected = 8 * (3 + n_mono + 2 * n_variants);
    if bytes.len() != expected {
        return Err(bad("stats file size does not match its header"));
    }

    let mut words = bytes[24..].chunks_exact(8).map(|c| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(c);
        buf
    });
    let mono: Vec<usize> = words
        .by_ref()
        .take(n_mono)
        .map(|b| i64::from_le_bytes(b) as usize)
        .collect();
    let means: Vec<f64> = words.by_ref().take(n_variants).map(f64::from_le_bytes).collect();
    let stddevs: Vec<f64> = words.take(n_variants).map(f64::from_le_bytes).collect();
    if mono.iter().any(|&j| j >= n_variants) {
        return Err(bad("monomorphic index out of range"));
    }
    Ok((n_samples, MarkerStats::new(means, stddevs, mono)))
}

/// Read-only view over a standardized matrix written by
/// [`StandardizedWriter`].
pub struct MappedGenotypeMatrix {
    mmap: Mmap,
    n_samples: usize,
    n_markers: usize,
    stats: MarkerStats,
}

impl MappedGenotypeMatrix {
    pub fn open(prefix: &str) -> Result<Self> {
        let (n_samples, stats) = read_stats(&stats_path(prefix))?;
        let path = bin_path(prefix);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        // SAFETY: read-only mapping; the file is not modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            GelexError::resource(format!("failed to map file: {}", e)).with_file(&path)
        })?;

        let n_markers = stats.len();
        if mmap.len() != n_samples * n_markers * 8 {
            return Err(GelexError::inconsistent(format!(
                "matrix holds {} bytes, stats declare {} x {}",
                mmap.len(),
                n_samples,
                n_markers
            ))
            .with_file(&path)
            .into());
        }
        if mmap.as_ptr().align_offset(std::mem::align_of::<f64>()) != 0 {
            return Err(GelexError::resource("mapping is not 8-byte aligned")
                .with_file(&path)
                .into());
        }
        Ok(Self {
            mmap,
            n_samples,
            n_markers,
            stats,
        })
    }

    fn values(&self) -> &[f64] {
        let len = self.n_samples * self.n_markers;
        if len == 0 {
            return &[];
        }
        // SAFETY: alignment and length were checked in `open`; every bit
        // pattern is a valid f64.
        unsafe { std::slice::from_raw_parts(self.mmap.as_ptr() as *const f64, len) }
    }
}

impl GenotypeStore for MappedGenotypeMatrix {
    fn rows(&self) -> usize {
        self.n_samples
    }

    fn cols(&self) -> usize {
        self.n_markers
    }

    fn col(&self, j: usize) -> &[f64] {
        let n = self.n_samples;
        &self.values()[j * n..(j + 1) * n]
    }

    fn stats(&self) -> &MarkerStats {
        &self.stats
    }
}
