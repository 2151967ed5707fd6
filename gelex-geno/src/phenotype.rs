//! Phenotype and covariate file parsers.
//!
//! All three files are whitespace-delimited with a header row whose first
//! two columns are FID and IID. Values are keyed by the sample key
//! (see [`crate::sample::sample_key`]) so they can be intersected and
//! aligned by the sample manager. Rows with a missing cell are dropped.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::error::GelexError;
use crate::sample::sample_key;
use crate::table::{is_missing, Table};

/// A single phenotype column keyed by sample.
#[derive(Debug, Clone)]
pub struct Phenotype {
    pub name: String,
    pub values: HashMap<String, f64>,
}

/// Quantitative covariates keyed by sample; one value per name.
#[derive(Debug, Clone, Default)]
pub struct QuantCovariates {
    pub names: Vec<String>,
    pub values: HashMap<String, Vec<f64>>,
}

/// Categorical covariates keyed by sample; one level per name.
#[derive(Debug, Clone, Default)]
pub struct CatCovariates {
    pub names: Vec<String>,
    pub values: HashMap<String, Vec<String>>,
}

impl CatCovariates {
    /// Split off the named columns, e.g. those modelled as random effects.
    pub fn split_off(&mut self, names: &[String]) -> Result<CatCovariates> {
        let mut take = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.names.iter().position(|n| n == name).ok_or_else(|| {
                GelexError::config(format!("categorical covariate '{}' not found", name))
            })?;
            take.push(idx);
        }
        let keep: Vec<usize> = (0..self.names.len()).filter(|i| !take.contains(i)).collect();

        let split = CatCovariates {
            names: take.iter().map(|&i| self.names[i].clone()).collect(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), take.iter().map(|&i| v[i].clone()).collect()))
                .collect(),
        };
        self.names = keep.iter().map(|&i| self.names[i].clone()).collect();
        for v in self.values.values_mut() {
            *v = keep.iter().map(|&i| v[i].clone()).collect();
        }
        Ok(split)
    }
}

fn key_of(fields: &[String], iid_only: bool) -> String {
    sample_key(&fields[0], &fields[1], iid_only)
}

fn parse_number(s: &str, path: &Path, line: usize) -> Result<f64> {
    s.parse::<f64>().map_err(|_| {
        GelexError::malformed(format!("non-numeric value '{}'", s))
            .with_file(path)
            .with_line(line)
            .into()
    })
}

/// Read one phenotype column. `column` is 0-based, counted from the third
/// column (the first after FID and IID).
pub fn read_phenotype(path: &Path, column: usize, iid_only: bool) -> Result<Phenotype> {
    let table = Table::read(path)?;
    let idx = column + 2;
    if idx >= table.header.len() {
        return Err(GelexError::config(format!(
            "phenotype column {} requested, file has {}",
            column,
            table.header.len() - 2
        ))
        .with_file(path)
        .into());
    }

    let mut values = HashMap::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let cell = &fields[idx];
        if is_missing(cell) {
            continue;
        }
        let v = parse_number(cell, path, *line)?;
        if !v.is_finite() {
            continue;
        }
        values.insert(key_of(fields, iid_only), v);
    }

    let name = table.header[idx].clone();
    debug!(
        "Phenotype '{}': {} non-missing samples from {}",
        name,
        values.len(),
        path.display()
    );
    if values.is_empty() {
        warn!("Phenotype '{}' has no non-missing values", name);
    }
    Ok(Phenotype { name, values })
}

/// Read all quantitative covariate columns.
pub fn read_qcovar(path: &Path, iid_only: bool) -> Result<QuantCovariates> {
    let table = Table::read(path)?;
    let names = table.header[2..].to_vec();
    let mut values = HashMap::with_capacity(table.rows.len());
    'rows: for (line, fields) in &table.rows {
        let mut row = Vec::with_capacity(names.len());
        for cell in &fields[2..] {
            if is_missing(cell) {
                continue 'rows;
            }
            row.push(parse_number(cell, path, *line)?);
        }
        values.insert(key_of(fields, iid_only), row);
    }
    debug!(
        "Quantitative covariates {:?}: {} samples",
        names,
        values.len()
    );
    Ok(QuantCovariates { names, values })
}

/// Read all categorical covariate columns.
pub fn read_dcovar(path: &Path, iid_only: bool) -> Result<CatCovariates> {
    let table = Table::read(path)?;
    let names = table.header[2..].to_vec();
    let mut values = HashMap::with_capacity(table.rows.len());
    for (_, fields) in &table.rows {
        if fields[2..].iter().any(|c| is_missing(c)) {
            continue;
        }
        values.insert(key_of(fields, iid_only), fields[2..].to_vec());
    }
    debug!(
        "Categorical covariates {:?}: {} samples",
        names,
        values.len()
    );
    Ok(CatCovariates { names, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_phenotype_column_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "p.txt",
            "FID\tIID\ty1\ty2\nF1\tS1\t1.5\t3\nF2\tS2\tNA\t4\nF3\tS3\t2\t.\n",
        );
        let p = read_phenotype(&path, 0, false).unwrap();
        assert_eq!(p.name, "y1");
        assert_eq!(p.values.len(), 2);
        assert_eq!(p.values["F1_S1"], 1.5);

        let p = read_phenotype(&path, 1, true).unwrap();
        assert_eq!(p.name, "y2");
        assert_eq!(p.values["S2"], 4.0);
        assert!(!p.values.contains_key("S3"));

        assert!(read_phenotype(&path, 2, true).is_err());
    }

    #[test]
    fn test_qcovar_non_numeric_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "q.txt", "FID IID age\nF1 S1 40\nF2 S2 old\n");
        let err = read_qcovar(&path, false).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::InputMalformed));
    }

    #[test]
    fn test_qcovar_drops_missing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "q.txt", "FID IID age bmi\nF1 S1 40 22\nF2 S2 NA 25\n");
        let q = read_qcovar(&path, true).unwrap();
        assert_eq!(q.names, vec!["age", "bmi"]);
        assert_eq!(q.values.len(), 1);
        assert_eq!(q.values["S1"], vec![40.0, 22.0]);
    }

    #[test]
    fn test_dcovar_split_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "d.txt", "FID IID sex herd\nF1 S1 M h1\nF2 S2 F h2\n");
        let mut d = read_dcovar(&path, true).unwrap();
        let r = d.split_off(&["herd".to_string()]).unwrap();
        assert_eq!(d.names, vec!["sex"]);
        assert_eq!(r.names, vec!["herd"]);
        assert_eq!(d.values["S2"], vec!["F"]);
        assert_eq!(r.values["S2"], vec!["h2"]);
        assert!(d.split_off(&["nope".to_string()]).is_err());
    }
}
