//! Genetic values of a new panel from trained marker effects.

use anyhow::Result;
use gelex_geno::{BedReader, GelexError};
use rayon::prelude::*;
use tracing::debug;

use super::effects::SnpEffects;
use super::matcher::MatchPlan;
use crate::data::Policy;

/// Additive and dominance genetic values per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneticValues {
    pub additive: Vec<f64>,
    pub dominant: Vec<f64>,
}

impl GeneticValues {
    fn zeros(n: usize) -> Self {
        Self {
            additive: vec![0.0; n],
            dominant: vec![0.0; n],
        }
    }

    fn add_assign(mut self, other: GeneticValues) -> Self {
        for (a, b) in self.additive.iter_mut().zip(&other.additive) {
            *a += b;
        }
        for (a, b) in self.dominant.iter_mut().zip(&other.dominant) {
            *a += b;
        }
        self
    }
}

/// Sum `code(x, p) · effect` over matched markers. Genotypes of reversed
/// markers are read as `2 - x`; codes use the training frequencies.
pub fn genetic_values(
    reader: &BedReader,
    plan: &MatchPlan,
    effects: &SnpEffects,
    policy: Policy,
    chunk_size: usize,
) -> Result<GeneticValues> {
    if chunk_size == 0 {
        return Err(GelexError::config("chunk size must be positive").into());
    }
    if policy.is_dominance() {
        return Err(GelexError::config(format!("additive policy expected, got {}", policy)).into());
    }
    let n = reader.n_samples();
    let m = reader.n_markers();
    if plan.effect.len() != m {
        return Err(GelexError::inconsistent("match plan does not cover the panel").into());
    }
    let dom_policy = policy.dominance();
    let mut total = GeneticValues::zeros(n);
    let mut buf = Vec::new();

    let mut start = 0;
    while start < m {
        let end = (start + chunk_size).min(m);
        if plan.effect[start..end].iter().all(Option::is_none) {
            start = end;
            continue;
        }
        buf.resize(n * (end - start), 0.0);
        reader.decode_chunk_with(start, end, Some(&plan.reverse), &mut buf)?;

        let part = (start..end)
            .into_par_iter()
            .fold(
                || GeneticValues::zeros(n),
                |mut acc, j| {
                    let Some(i) = plan.effect[j] else {
                        return acc;
                    };
                    let e = effects.get(i);
                    let col = &buf[(j - start) * n..(j - start + 1) * n];
                    for (a, &x) in acc.additive.iter_mut().zip(col) {
                        *a += policy.code(x, e.freq) * e.add;
                    }
                    if let Some(d) = e.dom {
                        for (v, &x) in acc.dominant.iter_mut().zip(col) {
                            *v += dom_policy.code(x, e.freq) * d;
                        }
                    }
                    acc
                },
            )
            .reduce(|| GeneticValues::zeros(n), GeneticValues::add_assign);
        total = total.add_assign(part);
        debug!("Predicted markers [{}, {})", start, end);
        start = end;
    }
    Ok(total)
}
