//! Marker effect table read back from a `.snp.eff` file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use gelex_geno::table::Table;
use gelex_geno::GelexError;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct SnpEffect {
    pub id: String,
    pub a1: String,
    pub a2: String,
    /// A1 frequency in the training panel.
    pub freq: f64,
    pub add: f64,
    pub dom: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SnpEffects {
    effects: Vec<SnpEffect>,
    index: HashMap<String, usize>,
    has_dominance: bool,
}

fn column(table: &Table, name: &str, path: &Path) -> Result<usize> {
    table.header.iter().position(|h| h == name).ok_or_else(|| {
        GelexError::malformed(format!("missing column '{}'", name))
            .with_file(path)
            .with_line(1)
            .into()
    })
}

impl SnpEffects {
    pub fn new(effects: Vec<SnpEffect>) -> Result<Self> {
        let mut index = HashMap::with_capacity(effects.len());
        for (i, e) in effects.iter().enumerate() {
            if index.insert(e.id.clone(), i).is_some() {
                return Err(
                    GelexError::inconsistent(format!("duplicate marker id {}", e.id)).into(),
                );
            }
        }
        let has_dominance = effects.first().is_some_and(|e| e.dom.is_some());
        if effects.iter().any(|e| e.dom.is_some() != has_dominance) {
            return Err(GelexError::inconsistent("dominance effects given for some markers only").into());
        }
        Ok(Self {
            effects,
            index,
            has_dominance,
        })
    }

    /// Columns `ID`, `A1`, `A2`, `A1Frq`, `Add` and optionally `Dom`.
    pub fn read(path: &Path) -> Result<Self> {
        let table = Table::read(path)?;
        let id = column(&table, "ID", path)?;
        let a1 = column(&table, "A1", path)?;
        let a2 = column(&table, "A2", path)?;
        let freq = column(&table, "A1Frq", path)?;
        let add = column(&table, "Add", path)?;
        let dom = table.header.iter().position(|h| h == "Dom");

        let number = |s: &str, line: usize| -> Result<f64> {
            s.parse::<f64>().map_err(|_| {
                GelexError::malformed(format!("'{}' is not a number", s))
                    .with_file(path)
                    .with_line(line)
                    .into()
            })
        };

        let mut effects = Vec::with_capacity(table.rows.len());
        for (line, row) in &table.rows {
            effects.push(SnpEffect {
                id: row[id].clone(),
                a1: row[a1].clone(),
                a2: row[a2].clone(),
                freq: number(&row[freq], *line)?,
                add: number(&row[add], *line)?,
                dom: match dom {
                    Some(c) => Some(number(&row[c], *line)?),
                    None => None,
                },
            });
        }
        info!(
            "Loaded {} marker effects from {}{}",
            effects.len(),
            path.display(),
            if dom.is_some() { " (with dominance)" } else { "" }
        );
        Self::new(effects)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn has_dominance(&self) -> bool {
        self.has_dominance
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, i: usize) -> &SnpEffect {
        &self.effects[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_snp_eff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.snp.eff");
        std::fs::write(
            &path,
            "Index\tID\tChrom\tPosition\tA1\tA2\tA1Frq\tAdd\tAddSE\tAddPVE\n\
             1\trs1\t1\t100\tA\tG\t0.25\t0.5\t0.1\t0.01\n\
             2\trs2\t1\t200\tC\tT\t0.5\t-0.125\t0.1\t0.01\n",
        )
        .unwrap();
        let effects = SnpEffects::read(&path).unwrap();
        assert_eq!(effects.len(), 2);
        assert!(!effects.has_dominance());
        let e = effects.get(effects.position("rs2").unwrap());
        assert_eq!(e.freq, 0.5);
        assert_eq!(e.add, -0.125);
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.snp.eff");
        std::fs::write(&path, "ID\tA1\tA2\nrs1\tA\tG\n").unwrap();
        assert!(SnpEffects::read(&path).is_err());
    }
}
