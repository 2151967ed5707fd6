//! Per-marker genotype coding.
//!
//! Raw columns hold A1 counts in `[0, 2]` with missing calls already imputed
//! to the marker mean by the reader. Each policy turns a raw column into a
//! model column in place and reports the raw mean and standard deviation so
//! the coding can be reproduced later (prediction uses the stored
//! frequencies, not the new panel's).

use std::fmt;
use std::str::FromStr;

use gelex_geno::{GelexError, MarkerStats};
use rayon::prelude::*;

/// Variance below which a marker is treated as monomorphic.
pub const MONO_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// `x - 2p`
    AdditiveCentered,
    /// `(x - 2p) / sqrt(2pq)`
    AdditiveStandardized,
    /// heterozygote indicator minus `2pq`
    DominanceCentered,
    /// Yang et al. coding `{0: -2p², 1: 2pq, 2: -2q²} / (2pq)`
    DominanceStandardized,
}

impl Policy {
    pub fn is_dominance(&self) -> bool {
        matches!(self, Policy::DominanceCentered | Policy::DominanceStandardized)
    }

    pub fn is_standardized(&self) -> bool {
        matches!(
            self,
            Policy::AdditiveStandardized | Policy::DominanceStandardized
        )
    }

    /// Dominance policy with the same scaling as `self`.
    pub fn dominance(&self) -> Policy {
        if self.is_standardized() {
            Policy::DominanceStandardized
        } else {
            Policy::DominanceCentered
        }
    }

    /// Code one value given the A1 frequency `p`. Values that are not a
    /// genotype call (imputed means) map to the column expectation, zero.
    pub fn code(&self, x: f64, p: f64) -> f64 {
        let q = 1.0 - p;
        let het = 2.0 * p * q;
        match self {
            Policy::AdditiveCentered => x - 2.0 * p,
            Policy::AdditiveStandardized => {
                if het < MONO_EPS {
                    0.0
                } else {
                    (x - 2.0 * p) / het.sqrt()
                }
            }
            Policy::DominanceCentered => match genotype_call(x) {
                Some(1) => 1.0 - het,
                Some(_) => -het,
                None => 0.0,
            },
            Policy::DominanceStandardized => {
                if het < MONO_EPS {
                    return 0.0;
                }
                let d = match genotype_call(x) {
                    Some(0) => -2.0 * p * p,
                    Some(1) => het,
                    Some(2) => -2.0 * q * q,
                    _ => return 0.0,
                };
                d / het
            }
        }
    }
}

fn genotype_call(x: f64) -> Option<u8> {
    if x == 0.0 {
        Some(0)
    } else if x == 1.0 {
        Some(1)
    } else if x == 2.0 {
        Some(2)
    } else {
        None
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Policy::AdditiveCentered => "additive-centered",
            Policy::AdditiveStandardized => "additive-standardized",
            Policy::DominanceCentered => "dominance-centered",
            Policy::DominanceStandardized => "dominance-standardized",
        };
        f.write_str(s)
    }
}

impl FromStr for Policy {
    type Err = GelexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "additive-centered" => Ok(Policy::AdditiveCentered),
            "additive-standardized" => Ok(Policy::AdditiveStandardized),
            "dominance-centered" => Ok(Policy::DominanceCentered),
            "dominance-standardized" => Ok(Policy::DominanceStandardized),
            other => Err(GelexError::config(format!(
                "unknown standardization policy '{}'",
                other
            ))),
        }
    }
}

/// Raw statistics of one column: `(mean, population stddev, monomorphic)`.
pub fn column_stats(col: &[f64]) -> (f64, f64, bool) {
    let n = col.len() as f64;
    if col.is_empty() {
        return (0.0, 0.0, true);
    }
    let mean = col.iter().sum::<f64>() / n;
    let var = col.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, var.sqrt(), var < MONO_EPS)
}

/// Code one raw column in place. Monomorphic columns become zero.
pub fn standardize_column(policy: Policy, col: &mut [f64]) -> (f64, f64, bool) {
    let (mean, sd, mono) = column_stats(col);
    if mono {
        col.fill(0.0);
    } else {
        let p = mean / 2.0;
        for x in col.iter_mut() {
            *x = policy.code(*x, p);
        }
    }
    (mean, sd, mono)
}

/// Code a column-major chunk (`n` rows) in place, in parallel over markers.
pub fn standardize_chunk(policy: Policy, n: usize, chunk: &mut [f64]) -> MarkerStats {
    if n == 0 {
        return MarkerStats::default();
    }
    let per_marker: Vec<(f64, f64, bool)> = chunk
        .par_chunks_mut(n)
        .map(|col| standardize_column(policy, col))
        .collect();

    let means = per_marker.iter().map(|s| s.0).collect();
    let stddevs = per_marker.iter().map(|s| s.1).collect();
    let mono = per_marker
        .iter()
        .enumerate()
        .filter(|(_, s)| s.2)
        .map(|(j, _)| j)
        .collect();
    MarkerStats::new(means, stddevs, mono)
}
