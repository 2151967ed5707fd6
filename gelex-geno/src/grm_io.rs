//! GRM file pair reader/writer.
//!
//! A GRM is stored as two files sharing a prefix:
//! - `<prefix>.grm.bin`: `n * n` little-endian f64, column-major
//! - `<prefix>.grm.id`: `FID\tIID`, one line per row
//!
//! Matrices are stored unnormalized (`Z Z'`); consumers divide by
//! `trace / n`. A LOCO set adds one pair per chromosome at
//! `<prefix>.chr<c>` and an index file `<prefix>.loco.txt`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gelex_linalg::DenseMatrix;
use memmap2::Mmap;
use tracing::info;

use crate::error::GelexError;
use crate::sample::{sample_key, SampleManager};
use crate::table::read_input;

pub fn bin_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.grm.bin", prefix))
}

pub fn id_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.grm.id", prefix))
}

/// Prefix of the per-chromosome GRM inside a LOCO set.
pub fn chrom_prefix(prefix: &str, chrom: &str) -> String {
    format!("{}.chr{}", prefix, chrom)
}

pub fn loco_index_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.loco.txt", prefix))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| {
        GelexError::resource(format!("cannot create file: {}", e)).with_file(path)
    })?;
    Ok(BufWriter::new(file))
}

/// Write `k` (rows in the dense order of `samples`) to a GRM file pair.
pub fn write_grm(prefix: &str, k: &DenseMatrix, samples: &SampleManager) -> Result<()> {
    let n = samples.len();
    if k.nrows() != n || k.ncols() != n {
        return Err(GelexError::inconsistent(format!(
            "GRM is {}x{}, sample set has {}",
            k.nrows(),
            k.ncols(),
            n
        ))
        .into());
    }

    let path = bin_path(prefix);
    let mut w = create(&path)?;
    for j in 0..n {
        for i in 0..n {
            w.write_all(&k.get(i, j).to_le_bytes())?;
        }
    }
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let path = id_path(prefix);
    let mut w = create(&path)?;
    for d in 0..n {
        let (fid, iid) = samples.fid_iid(d);
        writeln!(w, "{}\t{}", fid, iid)?;
    }
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("GRM written to {} ({} samples)", bin_path(prefix).display(), n);
    Ok(())
}

/// Sample keys of a GRM, in file row order.
pub fn read_grm_ids(prefix: &str, iid_only: bool) -> Result<Vec<String>> {
    let path = id_path(prefix);
    let contents = read_input(&path)?;
    let mut ids = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(GelexError::malformed("expected FID and IID")
                .with_file(&path)
                .with_line(line_num + 1)
                .into());
        }
        ids.push(sample_key(fields[0], fields[1], iid_only));
    }
    if ids.is_empty() {
        return Err(GelexError::malformed("no sample IDs").with_file(&path).into());
    }
    Ok(ids)
}

/// Read a GRM and reorder it to the dense order of `samples`. Every
/// finalized sample must be present in the GRM.
pub fn read_grm(prefix: &str, samples: &SampleManager) -> Result<DenseMatrix> {
    let ids = read_grm_ids(prefix, samples.iid_only())?;
    let n_file = ids.len();

    let path = bin_path(prefix);
    let file = File::open(&path).map_err(|e| {
        GelexError::malformed(format!("cannot open GRM: {}", e)).with_file(&path)
    })?;
    // SAFETY: read-only mapping of a file not modified while mapped.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
        GelexError::resource(format!("failed to map file: {}", e)).with_file(&path)
    })?;
    if mmap.len() != n_file * n_file * 8 {
        return Err(GelexError::inconsistent(format!(
            "GRM holds {} bytes, id file lists {} samples",
            mmap.len(),
            n_file
        ))
        .with_file(&path)
        .into());
    }

    let mut file_index = vec![0usize; samples.len()];
    let position: std::collections::HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    for (dense, id) in samples.common_ids().iter().enumerate() {
        file_index[dense] = *position.get(id.as_str()).ok_or_else(|| {
            GelexError::inconsistent(format!("sample {} missing from GRM", id))
                .with_file(id_path(prefix))
        })?;
    }

    let read = |i: usize, j: usize| {
        let off = 8 * (j * n_file + i);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&mmap[off..off + 8]);
        f64::from_le_bytes(buf)
    };
    let n = samples.len();
    let mut k = DenseMatrix::zeros(n, n);
    for b in 0..n {
        for a in b..n {
            let v = read(file_index[a], file_index[b]);
            k.set(a, b, v);
        }
    }
    k.fill_upper_from_lower();
    Ok(k)
}

/// Divide a GRM by its denominator `trace / n`.
pub fn normalize(k: &mut DenseMatrix) -> Result<f64> {
    let n = k.nrows();
    let denom = k.trace() / n as f64;
    if !(denom > 0.0) {
        return Err(GelexError::numerical("GRM trace is not positive").into());
    }
    *k = k.scale(1.0 / denom);
    Ok(denom)
}

pub fn write_loco_index(prefix: &str, chroms: &[String]) -> Result<()> {
    let path = loco_index_path(prefix);
    let mut w = create(&path)?;
    for c in chroms {
        writeln!(w, "{}", c)?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_loco_index(prefix: &str) -> Result<Vec<String>> {
    let path = loco_index_path(prefix);
    let chroms: Vec<String> = read_input(&path)?
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if chroms.is_empty() {
        return Err(GelexError::malformed("no chromosomes listed").with_file(&path).into());
    }
    Ok(chroms)
}

/// Build the normalized leave-one-chromosome-out GRM
/// `(K_whole - K_chr) / (d_whole - d_chr)` from unnormalized matrices.
pub fn loco_grm(whole: &DenseMatrix, chrom: &DenseMatrix) -> Result<DenseMatrix> {
    let n = whole.nrows() as f64;
    let d_whole = whole.trace() / n;
    let d_chrom = chrom.trace() / n;
    let d = d_whole - d_chrom;
    if !(d > 0.0) {
        return Err(GelexError::inconsistent(format!(
            "chromosome GRM denominator {:.4} is not below whole-genome {:.4}",
            d_chrom, d_whole
        ))
        .into());
    }
    let mut k = whole.clone();
    k.add_scaled(chrom, -1.0);
    Ok(k.scale(1.0 / d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plink::FamEntry;
    use crate::sample::SampleResolver;

    fn fam(n: usize) -> Vec<FamEntry> {
        (0..n)
            .map(|i| FamEntry {
                fid: format!("F{}", i),
                iid: format!("S{}", i),
                father: "0".into(),
                mother: "0".into(),
                sex: 0,
                pheno: f64::NAN,
            })
            .collect()
    }

    #[test]
    fn test_write_read_reorders_to_subset() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g").to_string_lossy().to_string();
        let all = SampleManager::from_fam(&fam(3), false).unwrap();
        let k = DenseMatrix::from_row_major(
            3,
            3,
            &[1.0, 0.1, 0.2, 0.1, 2.0, 0.3, 0.2, 0.3, 3.0],
        );
        write_grm(&prefix, &k, &all).unwrap();
        assert_eq!(read_grm_ids(&prefix, false).unwrap(), vec!["F0_S0", "F1_S1", "F2_S2"]);

        let mut r = SampleResolver::new(&fam(3), false);
        r.intersect(["F2_S2", "F0_S0"].iter().copied());
        let sub = r.finalize().unwrap();
        let g = read_grm(&prefix, &sub).unwrap();
        assert_eq!(g.nrows(), 2);
        assert_eq!(g.get(0, 0), 1.0);
        assert_eq!(g.get(1, 1), 3.0);
        assert_eq!(g.get(0, 1), 0.2);
        assert_eq!(g.get(1, 0), 0.2);
    }

    #[test]
    fn test_missing_sample_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g").to_string_lossy().to_string();
        let two = SampleManager::from_fam(&fam(2), false).unwrap();
        write_grm(&prefix, &DenseMatrix::identity(2), &two).unwrap();
        let three = SampleManager::from_fam(&fam(3), false).unwrap();
        let err = read_grm(&prefix, &three).unwrap_err();
        assert_eq!(
            crate::error::error_kind(&err),
            Some(crate::error::ErrorKind::InputInconsistent)
        );
    }

    #[test]
    fn test_loco_grm_and_normalize() {
        let whole = DenseMatrix::from_row_major(2, 2, &[6.0, 1.0, 1.0, 6.0]);
        let chrom = DenseMatrix::from_row_major(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let k = loco_grm(&whole, &chrom).unwrap();
        assert!((k.get(0, 0) - 1.0).abs() < 1e-12);
        assert!(k.get(0, 1).abs() < 1e-12);
        assert!(loco_grm(&chrom, &whole).is_err());

        let mut w = whole.clone();
        let d = normalize(&mut w).unwrap();
        assert_eq!(d, 6.0);
        assert!((w.get(1, 0) - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_loco_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("g").to_string_lossy().to_string();
        write_loco_index(&prefix, &["1".to_string(), "X".to_string()]).unwrap();
        assert_eq!(read_loco_index(&prefix).unwrap(), vec!["1", "X"]);
        assert_eq!(chrom_prefix("g", "X"), "g.chrX");
    }
}
