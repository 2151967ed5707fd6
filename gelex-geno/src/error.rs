//! Typed error carrier shared by every gelex crate.
//!
//! Fallible functions return `anyhow::Result`; domain failures are raised
//! as a [`GelexError`] so the binary can recover the [`ErrorKind`] from the
//! chain and report it on a single line.

use std::fmt;
use std::path::{Path, PathBuf};

use gelex_linalg::LinalgError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing file, bad magic, wrong column count, non-numeric cell.
    InputMalformed,
    /// Inputs that are individually valid but disagree with each other.
    InputInconsistent,
    ConfigInvalid,
    Numerical,
    Resource,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InputMalformed => "input-malformed",
            ErrorKind::InputInconsistent => "input-inconsistent",
            ErrorKind::ConfigInvalid => "config-invalid",
            ErrorKind::Numerical => "numerical",
            ErrorKind::Resource => "resource",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
#[error("{message}{}", location(.file, .line))]
pub struct GelexError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
}

fn location(file: &Option<PathBuf>, line: &Option<usize>) -> String {
    match (file, line) {
        (Some(f), Some(l)) => format!(" ({}:{})", f.display(), l),
        (Some(f), None) => format!(" ({})", f.display()),
        (None, Some(l)) => format!(" (line {})", l),
        (None, None) => String::new(),
    }
}

impl GelexError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputMalformed, message)
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputInconsistent, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Numerical, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }

    pub fn with_file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self
    }

    /// 1-based line number.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Recover the error kind from an `anyhow` chain.
///
/// The first [`GelexError`] found wins. Bare linear-algebra failures count as
/// numerical, bare I/O failures as resource failures.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<GelexError>() {
            return Some(e.kind);
        }
        if cause.downcast_ref::<LinalgError>().is_some() {
            return Some(ErrorKind::Numerical);
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return Some(ErrorKind::Resource);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display_with_location() {
        let e = GelexError::malformed("expected 6 fields").with_file("x.fam").with_line(3);
        assert_eq!(e.to_string(), "expected 6 fields (x.fam:3)");
        let e = GelexError::config("burn-in too large");
        assert_eq!(e.to_string(), "burn-in too large");
    }

    #[test]
    fn test_error_kind_through_context() {
        let err: anyhow::Error = GelexError::inconsistent("no common samples").into();
        let err = err.context("loading phenotype");
        assert_eq!(error_kind(&err), Some(ErrorKind::InputInconsistent));
    }

    #[test]
    fn test_error_kind_linalg_and_io() {
        let r: Result<(), LinalgError> = Err(LinalgError::NotPositiveDefinite {
            pivot: 0,
            value: -1.0,
        });
        let err = r.context("factorizing V").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Numerical));

        let r = std::fs::read("/definitely/not/here").context("reading");
        assert_eq!(error_kind(&r.unwrap_err()), Some(ErrorKind::Resource));

        assert_eq!(error_kind(&anyhow::anyhow!("plain")), None);
    }
}
