//! Fixed-effect and random-effect design matrices.

use std::collections::BTreeSet;

use gelex_linalg::DenseMatrix;

/// Intercept, quantitative covariates, then one-hot categorical levels.
#[derive(Debug, Clone)]
pub struct FixedDesign {
    /// Column term names: `Intercept`, covariate names, `name_level`.
    pub names: Vec<String>,
    pub x: DenseMatrix,
}

impl FixedDesign {
    /// Intercept-only design for `n` samples.
    pub fn intercept(n: usize) -> Self {
        let mut x = DenseMatrix::zeros(n, 1);
        x.set_col(0, &vec![1.0; n]);
        Self {
            names: vec!["Intercept".to_string()],
            x,
        }
    }

    /// Build the design from covariates already aligned to dense sample
    /// order. Each categorical covariate contributes one column per sorted
    /// level except the first, which is the reference.
    pub fn build(
        n: usize,
        qnames: &[String],
        qvalues: &[Vec<f64>],
        dnames: &[String],
        dvalues: &[Vec<String>],
    ) -> Self {
        let mut names = vec!["Intercept".to_string()];
        let mut cols: Vec<Vec<f64>> = vec![vec![1.0; n]];

        for (k, name) in qnames.iter().enumerate() {
            names.push(name.clone());
            cols.push(qvalues.iter().map(|row| row[k]).collect());
        }

        for (k, name) in dnames.iter().enumerate() {
            let levels = sorted_levels(dvalues.iter().map(|row| row[k].as_str()));
            for level in levels.iter().skip(1) {
                names.push(format!("{}_{}", name, level));
                cols.push(
                    dvalues
                        .iter()
                        .map(|row| if &row[k] == level { 1.0 } else { 0.0 })
                        .collect(),
                );
            }
        }

        let mut x = DenseMatrix::zeros(n, cols.len());
        for (j, col) in cols.iter().enumerate() {
            x.set_col(j, col);
        }
        Self { names, x }
    }

    pub fn ncols(&self) -> usize {
        self.names.len()
    }
}

/// Incidence matrix of one categorical covariate modelled as random.
#[derive(Debug, Clone)]
pub struct RandomDesign {
    pub name: String,
    /// Sorted levels, one column each.
    pub levels: Vec<String>,
    pub z: DenseMatrix,
}

impl RandomDesign {
    pub fn build(name: &str, values: &[String]) -> Self {
        let levels = sorted_levels(values.iter().map(|s| s.as_str()));
        let mut z = DenseMatrix::zeros(values.len(), levels.len());
        for (i, v) in values.iter().enumerate() {
            if let Ok(j) = levels.binary_search(v) {
                z.set(i, j, 1.0);
            }
        }
        Self {
            name: name.to_string(),
            levels,
            z,
        }
    }
}

fn sorted_levels<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_fixed_design_one_hot() {
        let qvalues = vec![vec![40.0], vec![50.0], vec![60.0]];
        let dvalues = vec![s(&["b"]), s(&["a"]), s(&["c"])];
        let d = FixedDesign::build(3, &s(&["age"]), &qvalues, &s(&["herd"]), &dvalues);
        assert_eq!(d.names, s(&["Intercept", "age", "herd_b", "herd_c"]));
        assert_eq!(d.x.col(0), vec![1.0, 1.0, 1.0]);
        assert_eq!(d.x.col(1), vec![40.0, 50.0, 60.0]);
        assert_eq!(d.x.col(2), vec![1.0, 0.0, 0.0]);
        assert_eq!(d.x.col(3), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_single_level_adds_no_column() {
        let dvalues = vec![s(&["x"]), s(&["x"])];
        let d = FixedDesign::build(2, &[], &[], &s(&["batch"]), &dvalues);
        assert_eq!(d.ncols(), 1);
    }

    #[test]
    fn test_random_incidence() {
        let r = RandomDesign::build("pen", &s(&["p2", "p1", "p2"]));
        assert_eq!(r.levels, s(&["p1", "p2"]));
        assert_eq!(r.z.col(0), vec![0.0, 1.0, 0.0]);
        assert_eq!(r.z.col(1), vec![1.0, 0.0, 1.0]);
    }
}
