//! GWAS output rows.

use std::io::Write;

use anyhow::Result;
use gelex_geno::MarkerInfo;

use super::wald::{JointResult, WaldResult};
use crate::util::format::{general, scientific};

pub fn write_header(writer: &mut impl Write, joint: bool) -> Result<()> {
    if joint {
        writeln!(
            writer,
            "CHR\tSNP\tBP\tA1\tA2\tA1FREQ\tBETA_A\tSE_A\tBETA_D\tSE_D\tCHISQ\tP"
        )?;
    } else {
        writeln!(writer, "CHR\tSNP\tBP\tA1\tA2\tA1FREQ\tBETA\tSE\tP")?;
    }
    Ok(())
}

fn write_marker(writer: &mut impl Write, marker: &MarkerInfo, freq: f64) -> Result<()> {
    write!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}",
        marker.chrom,
        marker.id,
        marker.pos,
        marker.a1,
        marker.a2,
        general(freq)
    )?;
    Ok(())
}

pub fn write_row(
    writer: &mut impl Write,
    marker: &MarkerInfo,
    freq: f64,
    result: &WaldResult,
) -> Result<()> {
    write_marker(writer, marker, freq)?;
    writeln!(
        writer,
        "\t{}\t{}\t{}",
        general(result.beta),
        general(result.se),
        scientific(result.p)
    )?;
    Ok(())
}

pub fn write_joint_row(
    writer: &mut impl Write,
    marker: &MarkerInfo,
    freq: f64,
    result: &JointResult,
) -> Result<()> {
    write_marker(writer, marker, freq)?;
    writeln!(
        writer,
        "\t{}\t{}\t{}\t{}\t{}\t{}",
        general(result.beta_a),
        general(result.se_a),
        general(result.beta_d),
        general(result.se_d),
        general(result.chisq),
        scientific(result.p)
    )?;
    Ok(())
}
