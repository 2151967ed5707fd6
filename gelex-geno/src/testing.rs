//! Synthetic PLINK trios for tests.

use std::io::{self, Write};
use std::path::Path;

use crate::plink::{Bfile, BED_MAGIC};

/// Write `<prefix>.{bed,bim,fam}` from marker-major A1 counts (`-1` is a
/// missing call). Samples are `F<i> S<i>`, all markers on chromosome 1.
pub fn write_bfile(prefix: &Path, geno: &[Vec<i32>]) -> io::Result<Bfile> {
    let chroms = vec!["1".to_string(); geno.len()];
    write_bfile_with(prefix, geno, &chroms)
}

/// Like [`write_bfile`] with an explicit chromosome per marker.
pub fn write_bfile_with(
    prefix: &Path,
    geno: &[Vec<i32>],
    chroms: &[String],
) -> io::Result<Bfile> {
    let bfile = Bfile::new(&prefix.to_string_lossy());
    let n = geno.first().map(|g| g.len()).unwrap_or(0);

    let mut fam = std::fs::File::create(&bfile.fam)?;
    for i in 0..n {
        writeln!(fam, "F{i} S{i} 0 0 1 -9")?;
    }

    let mut bim = std::fs::File::create(&bfile.bim)?;
    for (j, chrom) in chroms.iter().enumerate().take(geno.len()) {
        writeln!(bim, "{}\trs{}\t0\t{}\tA\tG", chrom, j, 1000 * (j + 1))?;
    }

    let mut bytes = BED_MAGIC.to_vec();
    for marker in geno {
        assert_eq!(marker.len(), n);
        let mut block = vec![0u8; n.div_ceil(4)];
        for (i, &g) in marker.iter().enumerate() {
            let code: u8 = match g {
                2 => 0b00,
                1 => 0b10,
                0 => 0b11,
                _ => 0b01,
            };
            block[i / 4] |= code << ((i % 4) * 2);
        }
        bytes.extend_from_slice(&block);
    }
    std::fs::write(&bfile.bed, bytes)?;
    Ok(bfile)
}
