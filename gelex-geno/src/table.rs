//! Whitespace-delimited text table helpers.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::GelexError;

/// Read an input text file. A missing file is a malformed input, other
/// I/O failures are resource failures.
pub fn read_input(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(GelexError::malformed("file not found").with_file(path).into())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// A header row plus data rows, each tagged with its 1-based line number.
#[derive(Debug, Clone)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    /// Parse a file whose first non-empty line is a header. Every data row
    /// must have exactly as many fields as the header.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = read_input(path)?;
        let mut lines = contents
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let header: Vec<String> = match lines.next() {
            Some((_, l)) => l.split_whitespace().map(String::from).collect(),
            None => return Err(GelexError::malformed("empty file").with_file(path).into()),
        };
        if header.len() < 2 {
            return Err(GelexError::malformed("header needs FID and IID columns")
                .with_file(path)
                .with_line(1)
                .into());
        }

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<String> = line.split_whitespace().map(String::from).collect();
            if fields.len() != header.len() {
                return Err(GelexError::malformed(format!(
                    "expected {} fields, found {}",
                    header.len(),
                    fields.len()
                ))
                .with_file(path)
                .with_line(line_no)
                .into());
            }
            rows.push((line_no, fields));
        }
        Ok(Self { header, rows })
    }
}

/// Missing-value markers in phenotype and covariate cells.
pub fn is_missing(s: &str) -> bool {
    matches!(s, "NA" | "na" | "Na" | "." | "" | "NaN" | "nan")
}
