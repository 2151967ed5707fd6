//! Tab-delimited outputs of a Bayes run: `.param`, `.snp.eff` and `.gv`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gelex_geno::{GelexError, GenotypeStore, MarkerInfo, SampleManager};
use tracing::info;

use super::model::{BayesModel, MarkerEffect};
use super::posterior::{summarize, DEFAULT_PROB};
use super::samples::{EffectSamples, McmcSamples};
use crate::util::format::{exact, general};

pub fn param_path(out: &str) -> PathBuf {
    PathBuf::from(format!("{}.param", out))
}

pub fn snp_eff_path(out: &str) -> PathBuf {
    PathBuf::from(format!("{}.snp.eff", out))
}

pub fn gv_path(out: &str) -> PathBuf {
    PathBuf::from(format!("{}.gv", out))
}

pub(crate) fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .map_err(|e| GelexError::resource(format!("cannot create output: {}", e)).with_file(path))?;
    Ok(BufWriter::new(file))
}

/// One row per scalar parameter, in record order.
pub fn write_param(writer: &mut impl Write, samples: &McmcSamples) -> Result<()> {
    writeln!(writer, "term\tmean\tstddev\t5%\t95%\tess\trhat")?;
    for (name, draws) in samples.params.iter() {
        let s = summarize(draws, DEFAULT_PROB);
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            name,
            exact(s.mean),
            general(s.sd),
            general(s.low),
            general(s.high),
            general(s.ess),
            general(s.rhat)
        )?;
    }
    Ok(())
}

fn effect_header(prefix: &str, samples: &EffectSamples, mixture: bool, header: &mut String) {
    header.push_str(&format!("\t{p}\t{p}SE\t{p}PVE", p = prefix));
    if mixture {
        for k in 0..samples.n_components() {
            header.push_str(&format!("\t{}_pi{}", prefix, k));
        }
        header.push_str(&format!("\t{}PIP", prefix));
    }
}

fn effect_fields<G: GenotypeStore>(
    j: usize,
    effect: &MarkerEffect<'_, G>,
    samples: &EffectSamples,
    y_var: f64,
    row: &mut String,
) {
    let mean = samples.moments.mean()[j];
    let pve = effect.col_variances[j] * mean * mean / y_var;
    row.push('\t');
    row.push_str(&exact(mean));
    row.push('\t');
    row.push_str(&general(samples.moments.sd(j)));
    row.push('\t');
    row.push_str(&general(pve));
    if effect.kind.is_mixture() {
        for k in 0..samples.n_components() {
            row.push('\t');
            row.push_str(&general(samples.component_prob(j, k)));
        }
        row.push('\t');
        row.push_str(&general(samples.pip(j)));
    }
}

/// Per-marker posterior effects. `Index` is 1-based.
pub fn write_snp_eff<G: GenotypeStore>(
    writer: &mut impl Write,
    model: &BayesModel<'_, G>,
    samples: &McmcSamples,
    markers: &[MarkerInfo],
) -> Result<()> {
    let add = &model.additive;
    if markers.len() != add.n_markers() {
        return Err(GelexError::inconsistent(format!(
            "{} marker records for {} fitted markers",
            markers.len(),
            add.n_markers()
        ))
        .into());
    }
    let mixture = model.model_type.marker.is_mixture();

    let mut header = String::from("Index\tID\tChrom\tPosition\tA1\tA2\tA1Frq");
    effect_header("Add", &samples.additive, mixture, &mut header);
    if let Some(dom) = &samples.dominance {
        effect_header("Dom", dom, mixture, &mut header);
    }
    writeln!(writer, "{}", header)?;

    let stats = add.design.stats();
    let mut row = String::new();
    for (j, marker) in markers.iter().enumerate() {
        row.clear();
        row.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            j + 1,
            marker.id,
            marker.chrom,
            marker.pos,
            marker.a1,
            marker.a2,
            exact(stats.freq(j))
        ));
        effect_fields(j, add, &samples.additive, model.y_var, &mut row);
        if let (Some(effect), Some(dom)) = (&model.dominance, &samples.dominance) {
            effect_fields(j, effect, dom, model.y_var, &mut row);
        }
        writeln!(writer, "{}", row)?;
    }
    Ok(())
}

/// Posterior mean genetic values per sample in dense order.
pub fn write_gv(
    writer: &mut impl Write,
    samples: &McmcSamples,
    sample_manager: &SampleManager,
) -> Result<()> {
    let dominance = samples.dominance_gv.as_ref();
    write!(writer, "FID\tIID\tadditive")?;
    if dominance.is_some() {
        write!(writer, "\tdominant")?;
    }
    writeln!(writer)?;
    let add = samples.additive_gv.mean();
    for i in 0..sample_manager.len() {
        let (fid, iid) = sample_manager.fid_iid(i);
        write!(writer, "{}\t{}\t{}", fid, iid, general(add[i]))?;
        if let Some(dom) = dominance {
            write!(writer, "\t{}", general(dom.mean()[i]))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write all three outputs under the prefix `out`.
pub fn write_outputs<G: GenotypeStore>(
    out: &str,
    model: &BayesModel<'_, G>,
    samples: &McmcSamples,
    markers: &[MarkerInfo],
    sample_manager: &SampleManager,
) -> Result<()> {
    let path = param_path(out);
    let mut w = create(&path)?;
    write_param(&mut w, samples)?;
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let path = snp_eff_path(out);
    let mut w = create(&path)?;
    write_snp_eff(&mut w, model, samples, markers)?;
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let path = gv_path(out);
    let mut w = create(&path)?;
    write_gv(&mut w, samples, sample_manager)?;
    w.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Wrote {}.param, {}.snp.eff and {}.gv", out, out, out);
    Ok(())
}
