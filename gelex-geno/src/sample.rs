//! Sample ID intersection and dense index assignment.
//!
//! A [`SampleResolver`] starts from the FAM sample list, is narrowed by
//! every participating input (phenotype, covariates, GRMs), and is frozen
//! into a [`SampleManager`]. Dense indices follow FAM order, so the
//! assignment is stable across runs regardless of the order other files
//! list their samples in.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::debug;

use crate::error::GelexError;
use crate::plink::FamEntry;

/// Marks a raw FAM slot that is not part of the finalized sample set.
pub const DROP: usize = usize::MAX;

/// Join key for a sample: `FID_IID`, or `IID` in individual-only mode.
pub fn sample_key(fid: &str, iid: &str, iid_only: bool) -> String {
    if iid_only {
        iid.to_string()
    } else {
        format!("{}_{}", fid, iid)
    }
}

/// Mutable stage of sample resolution.
#[derive(Debug, Clone)]
pub struct SampleResolver {
    fam: Vec<(String, String)>,
    raw_keys: Vec<String>,
    common: HashSet<String>,
    iid_only: bool,
}

impl SampleResolver {
    /// Initialize the common set to the FAM sample set.
    pub fn new(fam: &[FamEntry], iid_only: bool) -> Self {
        let fam: Vec<(String, String)> = fam
            .iter()
            .map(|f| (f.fid.clone(), f.iid.clone()))
            .collect();
        let raw_keys: Vec<String> = fam
            .iter()
            .map(|(fid, iid)| sample_key(fid, iid, iid_only))
            .collect();
        let common = raw_keys.iter().cloned().collect();
        Self {
            fam,
            raw_keys,
            common,
            iid_only,
        }
    }

    pub fn iid_only(&self) -> bool {
        self.iid_only
    }

    /// Retain only the samples whose key appears in `ids`.
    pub fn intersect<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let other: HashSet<&str> = ids.into_iter().collect();
        let before = self.common.len();
        self.common.retain(|k| other.contains(k.as_str()));
        debug!(
            "Sample intersection: {} -> {} samples",
            before,
            self.common.len()
        );
    }

    pub fn len(&self) -> usize {
        self.common.len()
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
    }

    /// Assign dense indices in FAM order and freeze.
    pub fn finalize(self) -> Result<SampleManager> {
        if self.common.is_empty() {
            return Err(GelexError::inconsistent("no samples in common between inputs").into());
        }

        let mut ids = Vec::with_capacity(self.common.len());
        let mut fid_iid = Vec::with_capacity(self.common.len());
        let mut id_map = HashMap::with_capacity(self.common.len());
        let mut raw_to_dense = vec![DROP; self.raw_keys.len()];

        for (raw, key) in self.raw_keys.iter().enumerate() {
            if !self.common.contains(key) || id_map.contains_key(key) {
                continue;
            }
            let dense = ids.len();
            id_map.insert(key.clone(), dense);
            raw_to_dense[raw] = dense;
            ids.push(key.clone());
            fid_iid.push(self.fam[raw].clone());
        }

        Ok(SampleManager {
            ids,
            fid_iid,
            id_map,
            raw_to_dense,
            iid_only: self.iid_only,
        })
    }
}

/// Finalized sample set. Immutable; every consumer sees the same ordering.
#[derive(Debug, Clone)]
pub struct SampleManager {
    ids: Vec<String>,
    fid_iid: Vec<(String, String)>,
    id_map: HashMap<String, usize>,
    raw_to_dense: Vec<usize>,
    iid_only: bool,
}

impl SampleManager {
    /// All FAM samples, no further intersection.
    pub fn from_fam(fam: &[FamEntry], iid_only: bool) -> Result<Self> {
        SampleResolver::new(fam, iid_only).finalize()
    }

    pub fn common_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id_map(&self) -> &HashMap<String, usize> {
        &self.id_map
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.id_map.get(key).copied()
    }

    /// `(FID, IID)` of the sample at a dense index.
    pub fn fid_iid(&self, dense: usize) -> (&str, &str) {
        let (f, i) = &self.fid_iid[dense];
        (f.as_str(), i.as_str())
    }

    /// Raw FAM slot to dense index, [`DROP`] for excluded samples.
    pub fn raw_to_dense(&self) -> &[usize] {
        &self.raw_to_dense
    }

    pub fn n_raw(&self) -> usize {
        self.raw_to_dense.len()
    }

    pub fn iid_only(&self) -> bool {
        self.iid_only
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Gather keyed values into dense order. Every finalized sample must be
    /// present in `values`.
    pub fn align<T: Clone>(&self, values: &HashMap<String, T>) -> Result<Vec<T>> {
        self.ids
            .iter()
            .map(|id| {
                values.get(id).cloned().ok_or_else(|| {
                    anyhow::Error::from(GelexError::inconsistent(format!(
                        "sample {} has no value",
                        id
                    )))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fam(ids: &[(&str, &str)]) -> Vec<FamEntry> {
        ids.iter()
            .map(|(f, i)| FamEntry {
                fid: f.to_string(),
                iid: i.to_string(),
                father: "0".into(),
                mother: "0".into(),
                sex: 0,
                pheno: f64::NAN,
            })
            .collect()
    }

    #[test]
    fn test_finalize_keeps_fam_order() {
        let fam = fam(&[("F", "A"), ("F", "B"), ("F", "C"), ("F", "D")]);
        let mut r = SampleResolver::new(&fam, false);
        r.intersect(["F_C", "F_A", "F_E"].iter().copied());
        let sm = r.finalize().unwrap();
        assert_eq!(sm.common_ids(), &["F_A".to_string(), "F_C".to_string()]);
        assert_eq!(sm.index_of("F_C"), Some(1));
        assert_eq!(sm.raw_to_dense(), &[0, DROP, 1, DROP]);
        assert_eq!(sm.fid_iid(1), ("F", "C"));
    }

    #[test]
    fn test_id_map_is_dense_bijection() {
        let fam = fam(&[("1", "a"), ("2", "b"), ("3", "c")]);
        let mut r = SampleResolver::new(&fam, true);
        r.intersect(["c", "a", "b"].iter().copied());
        r.intersect(["b", "c"].iter().copied());
        let sm = r.finalize().unwrap();
        let mut image: Vec<usize> = sm.id_map().values().copied().collect();
        image.sort_unstable();
        assert_eq!(image, vec![0, 1]);
        for (k, id) in sm.common_ids().iter().enumerate() {
            assert_eq!(sm.id_map()[id], k);
        }
    }

    #[test]
    fn test_empty_intersection_fails() {
        let fam = fam(&[("F", "A")]);
        let mut r = SampleResolver::new(&fam, false);
        r.intersect(["F_B"].iter().copied());
        assert!(r.finalize().is_err());
    }

    #[test]
    fn test_align() {
        let fam = fam(&[("F", "A"), ("F", "B")]);
        let sm = SampleManager::from_fam(&fam, true).unwrap();
        let mut values = HashMap::new();
        values.insert("B".to_string(), 2.0);
        values.insert("A".to_string(), 1.0);
        assert_eq!(sm.align(&values).unwrap(), vec![1.0, 2.0]);
        values.remove("A");
        assert!(sm.align(&values).is_err());
    }
}
