//! PLINK bed/bim/fam reader using memory-mapped files.
//!
//! PLINK binary format consists of three files:
//! - .bed: Binary genotype data (2 bits per genotype, packed)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use tracing::debug;

use crate::error::GelexError;
use crate::sample::{SampleManager, DROP};
use crate::table::read_input;
use crate::traits::MarkerInfo;

pub const BED_MAGIC: [u8; 3] = [0x6C, 0x1B, 0x01];

/// PLINK FAM file entry (one per sample).
#[derive(Debug, Clone)]
pub struct FamEntry {
    pub fid: String,
    pub iid: String,
    pub father: String,
    pub mother: String,
    pub sex: i32,
    pub pheno: f64,
}

/// Paths of a PLINK trio sharing one prefix.
#[derive(Debug, Clone)]
pub struct Bfile {
    pub bed: PathBuf,
    pub bim: PathBuf,
    pub fam: PathBuf,
}

impl Bfile {
    /// `prefix` may be given with or without a trailing `.bed`.
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.strip_suffix(".bed").unwrap_or(prefix);
        Self {
            bed: PathBuf::from(format!("{}.bed", prefix)),
            bim: PathBuf::from(format!("{}.bim", prefix)),
            fam: PathBuf::from(format!("{}.fam", prefix)),
        }
    }
}

/// Parse a .fam file.
pub fn read_fam(path: &Path) -> Result<Vec<FamEntry>> {
    let contents = read_input(path)?;
    let mut entries = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(GelexError::malformed(format!(
                "fam line has {} fields, expected 6",
                fields.len()
            ))
            .with_file(path)
            .with_line(line_num + 1)
            .into());
        }
        entries.push(FamEntry {
            fid: fields[0].to_string(),
            iid: fields[1].to_string(),
            father: fields[2].to_string(),
            mother: fields[3].to_string(),
            sex: fields[4].parse().unwrap_or(0),
            pheno: fields[5].parse().unwrap_or(f64::NAN),
        });
    }
    if entries.is_empty() {
        return Err(GelexError::malformed("no samples").with_file(path).into());
    }
    Ok(entries)
}

/// Parse a .bim file.
pub fn read_bim(path: &Path) -> Result<Vec<MarkerInfo>> {
    let contents = read_input(path)?;
    let mut entries = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let bad = |msg: String| {
            anyhow::Error::from(
                GelexError::malformed(msg)
                    .with_file(path)
                    .with_line(line_num + 1),
            )
        };
        if fields.len() < 6 {
            return Err(bad(format!(
                "bim line has {} fields, expected 6",
                fields.len()
            )));
        }
        let pos: u64 = fields[3]
            .parse()
            .map_err(|_| bad(format!("invalid base-pair position '{}'", fields[3])))?;
        entries.push(MarkerInfo {
            chrom: fields[0].to_string(),
            id: fields[1].to_string(),
            cm: fields[2].parse().unwrap_or(0.0),
            pos,
            a1: fields[4].to_string(),
            a2: fields[5].to_string(),
        });
    }
    Ok(entries)
}

/// Decode one 2-bit PLINK code to an A1 count.
#[inline]
fn decode_code(code: u8) -> f64 {
    match code & 0x03 {
        0b00 => 2.0,      // Homozygous A1/A1
        0b01 => f64::NAN, // Missing
        0b10 => 1.0,      // Heterozygous
        _ => 0.0,         // Homozygous A2/A2
    }
}

/// Random-access decoder for a memory-mapped .bed file.
///
/// Columns come out in the dense sample order of the [`SampleManager`] the
/// reader was opened with. Missing calls are imputed to the observed mean of
/// the marker (zero when nothing was observed).
#[derive(Debug)]
pub struct BedReader {
    mmap: Mmap,
    path: PathBuf,
    n_markers: usize,
    bytes_per_marker: usize,
    raw_to_dense: Vec<usize>,
    n_dense: usize,
}

impl BedReader {
    /// Map `bed_path`, verify the magic bytes and that the file holds exactly
    /// `n_markers` blocks for the FAM sample count of `samples`.
    pub fn open(bed_path: &Path, n_markers: usize, samples: &SampleManager) -> Result<Self> {
        let file = match std::fs::File::open(bed_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GelexError::malformed("file not found")
                    .with_file(bed_path)
                    .into())
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open bed file: {}", bed_path.display()))
            }
        };
        // SAFETY: the mapping is read-only and the file is not modified
        // while the reader is alive.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            GelexError::resource(format!("failed to map file: {}", e)).with_file(bed_path)
        })?;

        if mmap.len() < 3 || mmap[..3] != BED_MAGIC {
            return Err(
                GelexError::malformed("invalid PLINK bed magic (expected SNP-major 6C 1B 01)")
                    .with_file(bed_path)
                    .into(),
            );
        }

        let n_raw = samples.n_raw();
        let bytes_per_marker = n_raw.div_ceil(4);
        let expected = 3 + bytes_per_marker * n_markers;
        if mmap.len() != expected {
            return Err(GelexError::inconsistent(format!(
                "bed size {} bytes does not match {} markers x {} samples ({} bytes)",
                mmap.len(),
                n_markers,
                n_raw,
                expected
            ))
            .with_file(bed_path)
            .into());
        }

        debug!(
            "Opened {}: {} markers, {} raw samples, {} kept",
            bed_path.display(),
            n_markers,
            n_raw,
            samples.len()
        );

        Ok(Self {
            mmap,
            path: bed_path.to_path_buf(),
            n_markers,
            bytes_per_marker,
            raw_to_dense: samples.raw_to_dense().to_vec(),
            n_dense: samples.len(),
        })
    }

    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    /// Number of samples in every decoded column.
    pub fn n_samples(&self) -> usize {
        self.n_dense
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode marker `j` into `out` (length `n_samples()`), flipping the
    /// counted allele (`x -> 2 - x`) when `reverse` is set.
    pub fn decode_marker(&self, j: usize, reverse: bool, out: &mut [f64]) -> Result<()> {
        if j >= self.n_markers {
            return Err(GelexError::config(format!(
                "marker index {} out of range ({})",
                j, self.n_markers
            ))
            .into());
        }
        debug_assert_eq!(out.len(), self.n_dense);

        let offset = 3 + j * self.bytes_per_marker;
        let block = self
            .mmap
            .get(offset..offset + self.bytes_per_marker)
            .ok_or_else(|| {
                GelexError::inconsistent(format!("bed file truncated at marker {}", j))
                    .with_file(&self.path)
            })?;

        let mut sum = 0.0;
        let mut n_obs = 0usize;
        for (raw, &dense) in self.raw_to_dense.iter().enumerate() {
            if dense == DROP {
                continue;
            }
            let code = block[raw >> 2] >> ((raw & 3) * 2);
            let mut v = decode_code(code);
            if !v.is_nan() {
                if reverse {
                    v = 2.0 - v;
                }
                sum += v;
                n_obs += 1;
            }
            out[dense] = v;
        }

        if n_obs < self.n_dense {
            let fill = if n_obs > 0 { sum / n_obs as f64 } else { 0.0 };
            for v in out.iter_mut() {
                if v.is_nan() {
                    *v = fill;
                }
            }
        }
        Ok(())
    }

    /// Decode markers `[start, end)` into the column-major buffer `out`
    /// (`n_samples() x (end - start)`). Markers are decoded in parallel.
    pub fn decode_chunk(&self, start: usize, end: usize, out: &mut [f64]) -> Result<()> {
        self.decode_chunk_with(start, end, None, out)
    }

    /// Like [`BedReader::decode_chunk`], with an optional per-marker reverse
    /// flag indexed by absolute marker position.
    pub fn decode_chunk_with(
        &self,
        start: usize,
        end: usize,
        reverse: Option<&[bool]>,
        out: &mut [f64],
    ) -> Result<()> {
        if start > end || end > self.n_markers {
            return Err(GelexError::config(format!(
                "marker range [{}, {}) out of bounds ({})",
                start, end, self.n_markers
            ))
            .into());
        }
        let n = self.n_dense;
        if out.len() != n * (end - start) {
            return Err(GelexError::config(format!(
                "output buffer holds {} values, need {}",
                out.len(),
                n * (end - start)
            ))
            .into());
        }
        if let Some(flags) = reverse {
            if flags.len() < end {
                return Err(GelexError::inconsistent(format!(
                    "reverse flags cover {} markers, chunk ends at {}",
                    flags.len(),
                    end
                ))
                .into());
            }
        }
        if n == 0 {
            return Ok(());
        }
        out.par_chunks_mut(n)
            .enumerate()
            .try_for_each(|(k, col)| {
                let j = start + k;
                let flip = reverse.map(|r| r[j]).unwrap_or(false);
                self.decode_marker(j, flip, col)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleResolver;
    use crate::testing::write_bfile;

    #[test]
    fn test_decode_code() {
        assert_eq!(decode_code(0b00), 2.0);
        assert!(decode_code(0b01).is_nan());
        assert_eq!(decode_code(0b10), 1.0);
        assert_eq!(decode_code(0b11), 0.0);
    }

    #[test]
    fn test_decode_code_offsets() {
        let byte: u8 = 0b11_10_01_00;
        assert_eq!(decode_code(byte), 2.0);
        assert!(decode_code(byte >> 2).is_nan());
        assert_eq!(decode_code(byte >> 4), 1.0);
        assert_eq!(decode_code(byte >> 6), 0.0);
    }

    #[test]
    fn test_bfile_paths() {
        let b = Bfile::new("data/geno.bed");
        assert_eq!(b.bim, PathBuf::from("data/geno.bim"));
        let b = Bfile::new("data/geno.v1");
        assert_eq!(b.fam, PathBuf::from("data/geno.v1.fam"));
    }

    #[test]
    fn test_decode_with_subset_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("t");
        // 5 samples x 2 markers, -1 = missing
        let geno = vec![vec![0, 1, 2, -1, 2], vec![2, 2, 2, 2, 2]];
        let b = write_bfile(&prefix, &geno).unwrap();

        let fam = read_fam(&b.fam).unwrap();
        let bim = read_bim(&b.bim).unwrap();
        assert_eq!(bim.len(), 2);

        let mut r = SampleResolver::new(&fam, true);
        r.intersect(["S0", "S3", "S4"].iter().copied());
        let sm = r.finalize().unwrap();
        let reader = BedReader::open(&b.bed, bim.len(), &sm).unwrap();

        let mut out = vec![0.0; 3 * 2];
        reader.decode_chunk(0, 2, &mut out).unwrap();
        // S3 missing -> mean of observed (0, 2) = 1
        assert_eq!(&out[..3], &[0.0, 1.0, 2.0]);
        assert_eq!(&out[3..], &[2.0, 2.0, 2.0]);

        let mut flipped = vec![0.0; 3];
        reader.decode_marker(0, true, &mut flipped).unwrap();
        assert_eq!(flipped, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_open_rejects_bad_magic_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("t");
        let b = write_bfile(&prefix, &[vec![0, 1, 2]]).unwrap();
        let fam = read_fam(&b.fam).unwrap();
        let sm = SampleManager::from_fam(&fam, true).unwrap();

        assert!(BedReader::open(&b.bed, 2, &sm).is_err());

        let mut bytes = std::fs::read(&b.bed).unwrap();
        bytes[0] = 0;
        std::fs::write(&b.bed, &bytes).unwrap();
        assert!(BedReader::open(&b.bed, 1, &sm).is_err());
    }

    #[test]
    fn test_out_of_range_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("t");
        let b = write_bfile(&prefix, &[vec![0, 1]]).unwrap();
        let fam = read_fam(&b.fam).unwrap();
        let sm = SampleManager::from_fam(&fam, true).unwrap();
        let reader = BedReader::open(&b.bed, 1, &sm).unwrap();
        let mut out = vec![0.0; 4];
        assert!(reader.decode_chunk(0, 2, &mut out).is_err());
    }

    #[test]
    fn test_short_reverse_flags_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("t");
        let b = write_bfile(&prefix, &[vec![0, 1], vec![2, 1]]).unwrap();
        let fam = read_fam(&b.fam).unwrap();
        let sm = SampleManager::from_fam(&fam, true).unwrap();
        let reader = BedReader::open(&b.bed, 2, &sm).unwrap();
        let mut out = vec![0.0; 4];
        let err = reader
            .decode_chunk_with(0, 2, Some(&[true][..]), &mut out)
            .unwrap_err();
        assert_eq!(
            crate::error::error_kind(&err),
            Some(crate::error::ErrorKind::InputInconsistent)
        );

        reader
            .decode_chunk_with(0, 2, Some(&[true, false][..]), &mut out)
            .unwrap();
        assert_eq!(out, vec![2.0, 1.0, 2.0, 1.0]);
    }
}
