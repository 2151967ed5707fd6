//! Model serialization and deserialization.
//!
//! Format: bincode payload whose leading fields are the magic bytes (GLRM)
//! and a version. Optional JSON sidecar for human inspection.

use std::path::Path;

use anyhow::{Context, Result};
use gelex_geno::GelexError;

use super::reml_model::RemlModel;

/// Save a fitted model to a binary file (.reml.model).
pub fn save_model(model: &RemlModel, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(model)?;
    std::fs::write(path, &encoded)
        .map_err(|e| GelexError::resource(format!("cannot write model: {}", e)).with_file(path))?;
    Ok(())
}

/// Load a model from a binary file (.reml.model).
pub fn load_model(path: &Path) -> Result<RemlModel> {
    let data = std::fs::read(path)
        .map_err(|e| GelexError::resource(format!("cannot read model: {}", e)).with_file(path))?;
    let model: RemlModel = bincode::deserialize(&data)
        .map_err(|e| GelexError::malformed(format!("not a model file: {}", e)).with_file(path))?;

    if model.magic != RemlModel::MAGIC {
        return Err(GelexError::malformed(format!(
            "invalid model file: expected magic bytes {:?}, got {:?}",
            RemlModel::MAGIC,
            model.magic
        ))
        .with_file(path)
        .into());
    }
    if model.version > RemlModel::VERSION {
        return Err(GelexError::malformed(format!(
            "model version {} is newer than supported ({})",
            model.version,
            RemlModel::VERSION
        ))
        .with_file(path)
        .into());
    }
    if model.sigma.len() != model.grms.len() + 1 || model.beta.len() != model.fixed_names.len() {
        return Err(GelexError::inconsistent("model component counts disagree")
            .with_file(path)
            .into());
    }
    Ok(model)
}

/// Save a JSON sidecar for inspection (.reml.model.json).
pub fn save_model_json(model: &RemlModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn model_summary(model: &RemlModel) -> String {
    let mut s = format!(
        "REML model v{}\n\
         Samples: {}\n\
         Fixed effects: {}\n\
         Log-likelihood: {:.4}\n\
         Converged: {} ({} iterations)",
        model.version,
        model.n_samples(),
        model.fixed_names.len(),
        model.loglike,
        if model.converged { "yes" } else { "no" },
        model.iterations,
    );
    for (k, grm) in model.grms.iter().enumerate() {
        s.push_str(&format!(
            "\nV({}): {:.6} (se {:.6}), h2 {:.4} (se {:.4})",
            grm, model.sigma[k], model.sigma_se[k], model.h2[k], model.h2_se[k]
        ));
    }
    let r = model.sigma.len() - 1;
    s.push_str(&format!(
        "\nV(e): {:.6} (se {:.6})",
        model.sigma[r], model.sigma_se[r]
    ));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> RemlModel {
        RemlModel {
            magic: RemlModel::MAGIC,
            version: RemlModel::VERSION,
            sample_ids: vec!["F0_S0".into(), "F1_S1".into()],
            grms: vec!["g".into()],
            fixed_names: vec!["Intercept".into()],
            sigma: vec![0.6, 0.4],
            sigma_se: vec![0.1, 0.05],
            h2: vec![0.6],
            h2_se: vec![0.08],
            beta: vec![1.25],
            loglike: -12.5,
            iterations: 7,
            converged: true,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.reml.model");

        save_model(&model(), &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.n_samples(), 2);
        assert_eq!(loaded.sigma, vec![0.6, 0.4]);
        assert_eq!(loaded.sample_ids, vec!["F0_S0", "F1_S1"]);
        assert!(model_summary(&loaded).contains("V(g): 0.600000"));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.reml.model");
        let mut m = model();
        m.magic = *b"XXXX";
        save_model(&m, &path).unwrap();
        let err = load_model(&path).unwrap_err();
        assert_eq!(
            gelex_geno::error_kind(&err),
            Some(gelex_geno::ErrorKind::InputMalformed)
        );
    }
}
