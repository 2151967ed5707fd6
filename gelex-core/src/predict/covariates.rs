//! Covariate coefficients taken from a `.param` file.
//!
//! Rows named `Intercept`, a quantitative covariate, or `name_level` for a
//! categorical level carry fixed-effect coefficients; every other row
//! (variances, heritabilities, mixture proportions) is ignored.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use gelex_geno::table::Table;
use gelex_geno::GelexError;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CovariateEffects {
    coefs: HashMap<String, f64>,
}

/// One named column of per-sample contributions.
pub type CovariateTerm = (String, Vec<f64>);

impl CovariateEffects {
    pub fn read(path: &Path) -> Result<Self> {
        let table = Table::read(path)?;
        let (Some(term), Some(mean)) = (
            table.header.iter().position(|h| h == "term"),
            table.header.iter().position(|h| h == "mean"),
        ) else {
            return Err(GelexError::malformed("expected 'term' and 'mean' columns")
                .with_file(path)
                .with_line(1)
                .into());
        };
        let mut coefs = HashMap::new();
        for (line, row) in &table.rows {
            let value = row[mean].parse::<f64>().map_err(|_| {
                GelexError::malformed(format!("'{}' is not a number", row[mean]))
                    .with_file(path)
                    .with_line(*line)
            })?;
            coefs.insert(row[term].clone(), value);
        }
        debug!("Read {} parameter rows from {}", coefs.len(), path.display());
        Ok(Self { coefs })
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.coefs.get(term).copied()
    }

    /// Per-term contributions for `n` samples, with covariates already in
    /// sample order. Categorical levels without a coefficient (the
    /// reference level) contribute zero.
    pub fn apply(
        &self,
        n: usize,
        qnames: &[String],
        qvalues: &[Vec<f64>],
        dnames: &[String],
        dvalues: &[Vec<String>],
    ) -> Vec<CovariateTerm> {
        let mut terms = Vec::new();
        if let Some(b0) = self.get("Intercept") {
            terms.push(("Intercept".to_string(), vec![b0; n]));
        }
        for (k, name) in qnames.iter().enumerate() {
            match self.get(name) {
                Some(b) => terms.push((name.clone(), qvalues.iter().map(|row| b * row[k]).collect())),
                None => warn!("No coefficient for covariate '{}'", name),
            }
        }
        for (k, name) in dnames.iter().enumerate() {
            let prefix = format!("{}_", name);
            if !self.coefs.keys().any(|t| t.starts_with(&prefix)) {
                warn!("No coefficient for any level of '{}'", name);
                continue;
            }
            let col = dvalues
                .iter()
                .map(|row| self.get(&format!("{}{}", prefix, row[k])).unwrap_or(0.0))
                .collect();
            terms.push((name.clone(), col));
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.param");
        std::fs::write(
            &path,
            "term\tmean\tstddev\t5%\t95%\tess\trhat\n\
             Intercept\t1.5\t0\t0\t0\t1\t1\n\
             age\t0.5\t0\t0\t0\t1\t1\n\
             sex_M\t-0.5\t0\t0\t0\t1\t1\n\
             add_var\t3\t0\t0\t0\t1\t1\n\
             residual\t1\t0\t0\t0\t1\t1\n",
        )
        .unwrap();
        let effects = CovariateEffects::read(&path).unwrap();
        let terms = effects.apply(
            2,
            &["age".to_string()],
            &[vec![30.0], vec![40.0]],
            &["sex".to_string()],
            &[vec!["F".to_string()], vec!["M".to_string()]],
        );
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], ("Intercept".to_string(), vec![1.5, 1.5]));
        assert_eq!(terms[1].1, vec![15.0, 20.0]);
        assert_eq!(terms[2].1, vec![0.0, -0.5]);
    }
}
