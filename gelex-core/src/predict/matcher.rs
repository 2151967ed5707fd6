//! Match prediction-panel markers to trained effects by id and alleles.

use gelex_geno::MarkerInfo;
use tracing::{info, warn};

use super::effects::SnpEffects;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleMatch {
    /// Same A1/A2: use the counts as read.
    Keep,
    /// A1/A2 swapped: use `2 - x`.
    Reverse,
    /// Different alleles: contributes nothing.
    Skip,
}

/// Compare allele pairs, ignoring case.
pub fn match_alleles(model: (&str, &str), panel: (&str, &str)) -> AlleleMatch {
    let eq = |a: &str, b: &str| a.eq_ignore_ascii_case(b);
    if eq(model.0, panel.0) && eq(model.1, panel.1) {
        AlleleMatch::Keep
    } else if eq(model.0, panel.1) && eq(model.1, panel.0) {
        AlleleMatch::Reverse
    } else {
        AlleleMatch::Skip
    }
}

/// Per panel marker: the matched effect index, and whether to flip.
#[derive(Debug, Clone, Default)]
pub struct MatchPlan {
    pub effect: Vec<Option<usize>>,
    pub reverse: Vec<bool>,
    pub n_keep: usize,
    pub n_reverse: usize,
    pub n_skip: usize,
    /// Panel markers absent from the effect table.
    pub n_absent: usize,
}

impl MatchPlan {
    pub fn new(markers: &[MarkerInfo], effects: &SnpEffects) -> Self {
        let mut plan = MatchPlan {
            effect: vec![None; markers.len()],
            reverse: vec![false; markers.len()],
            ..Default::default()
        };
        for (j, marker) in markers.iter().enumerate() {
            let Some(i) = effects.position(&marker.id) else {
                plan.n_absent += 1;
                continue;
            };
            let e = effects.get(i);
            let model = (e.a1.as_str(), e.a2.as_str());
            match match_alleles(model, (marker.a1.as_str(), marker.a2.as_str())) {
                AlleleMatch::Keep => {
                    plan.effect[j] = Some(i);
                    plan.n_keep += 1;
                }
                AlleleMatch::Reverse => {
                    plan.effect[j] = Some(i);
                    plan.reverse[j] = true;
                    plan.n_reverse += 1;
                }
                AlleleMatch::Skip => plan.n_skip += 1,
            }
        }
        info!(
            "Matched markers: {} kept, {} reversed, {} skipped, {} not in model",
            plan.n_keep, plan.n_reverse, plan.n_skip, plan.n_absent
        );
        if plan.n_keep + plan.n_reverse == 0 {
            warn!("No prediction marker matches the effect table");
        }
        plan
    }

    pub fn n_used(&self) -> usize {
        self.n_keep + self.n_reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_alleles() {
        assert_eq!(match_alleles(("A", "G"), ("a", "g")), AlleleMatch::Keep);
        assert_eq!(match_alleles(("A", "G"), ("G", "A")), AlleleMatch::Reverse);
        assert_eq!(match_alleles(("A", "G"), ("A", "T")), AlleleMatch::Skip);
    }
}
