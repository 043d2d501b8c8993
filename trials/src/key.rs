use std::path::Path;

use tracing::debug;

use crate::catalog::IdCatalog;
use crate::io::{self, Format};
use crate::matrix::{Mat, check_shape};
use crate::ndx::{TrialNdx, TrialView};
use crate::partition::{block_bounds, union_maps};
use crate::{TrialsError, TrialsResult};

/// Labeled trial key over a model x segment grid.
///
/// `tar` marks trials where model and segment share the same identity,
/// `non` marks confirmed different identities. A pair is never both; the
/// logical trial mask is `tar OR non`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialKey {
    model_set: IdCatalog,
    seg_set: IdCatalog,
    tar: Mat<bool>,
    non: Mat<bool>,
}

impl TrialKey {
    /// Creates a key, checking mask shapes and the mutual-exclusivity
    /// invariant (no pair labeled both target and non-target).
    pub fn new(
        model_set: IdCatalog,
        seg_set: IdCatalog,
        tar: Mat<bool>,
        non: Mat<bool>,
    ) -> TrialsResult<Self> {
        check_shape(model_set.len(), seg_set.len(), tar.shape())?;
        check_shape(model_set.len(), seg_set.len(), non.shape())?;
        let key = Self {
            model_set,
            seg_set,
            tar,
            non,
        };
        key.validate()?;
        Ok(key)
    }

    /// Checks that no pair is labeled both target and non-target.
    pub fn validate(&self) -> TrialsResult<()> {
        for i in 0..self.model_set.len() {
            for j in 0..self.seg_set.len() {
                if self.tar[(i, j)] && self.non[(i, j)] {
                    return Err(TrialsError::LabelConflict {
                        model: self.model_set.get(i).to_string(),
                        segment: self.seg_set.get(j).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn model_set(&self) -> &IdCatalog {
        &self.model_set
    }

    pub fn seg_set(&self) -> &IdCatalog {
        &self.seg_set
    }

    /// Target-trial mask.
    pub fn tar(&self) -> &Mat<bool> {
        &self.tar
    }

    /// Non-target-trial mask.
    pub fn non(&self) -> &Mat<bool> {
        &self.non
    }

    /// Derives the unlabeled index whose mask is `tar OR non`.
    pub fn to_ndx(&self) -> TrialNdx {
        TrialNdx::new(
            self.model_set.clone(),
            self.seg_set.clone(),
            self.required(),
        )
        .expect("key masks match key catalogs")
    }

    /// Reorders both axes into lexical order, permuting both masks with the
    /// same two independent permutations.
    pub fn sort(&mut self) {
        let (models, m_idx) = self.model_set.sort();
        let (segs, s_idx) = self.seg_set.sort();
        self.tar = self.tar.select(&m_idx, &s_idx);
        self.non = self.non.select(&m_idx, &s_idx);
        self.model_set = models;
        self.seg_set = segs;
    }

    /// Restricts the key to the given model and segment subsets; see
    /// [`TrialNdx::filter`] for the `keep` semantics. Both masks are
    /// gathered with the same index arrays.
    pub fn filter(
        &self,
        model_set: &IdCatalog,
        seg_set: &IdCatalog,
        keep: bool,
    ) -> TrialsResult<TrialKey> {
        let (model_set, seg_set) = if keep {
            (model_set.clone(), seg_set.clone())
        } else {
            (
                self.model_set.set_difference(model_set),
                self.seg_set.set_difference(seg_set),
            )
        };
        let m_idx = self.model_set.indices_of(model_set.ids())?;
        let s_idx = self.seg_set.indices_of(seg_set.ids())?;
        Ok(TrialKey {
            model_set,
            seg_set,
            tar: self.tar.select(&m_idx, &s_idx),
            non: self.non.select(&m_idx, &s_idx),
        })
    }

    /// Extracts one deterministic block of the grid; see [`TrialNdx::split`].
    pub fn split(
        &self,
        model_part: usize,
        num_model_parts: usize,
        seg_part: usize,
        num_seg_parts: usize,
    ) -> TrialKey {
        let m_idx: Vec<usize> =
            block_bounds(self.model_set.len(), model_part, num_model_parts).collect();
        let s_idx: Vec<usize> =
            block_bounds(self.seg_set.len(), seg_part, num_seg_parts).collect();
        TrialKey {
            model_set: self.model_set.gather(&m_idx),
            seg_set: self.seg_set.gather(&s_idx),
            tar: self.tar.select(&m_idx, &s_idx),
            non: self.non.select(&m_idx, &s_idx),
        }
    }

    /// Merges keys with possibly different but overlapping catalogs.
    ///
    /// Works like [`TrialNdx::merge`], propagated to both masks with the
    /// same gathered indices. Two inputs marking the same pair in the same
    /// mask is a [`TrialsError::LabelConflict`], as is a pair that ends up
    /// both target and non-target across inputs.
    pub fn merge(parts: &[TrialKey]) -> TrialsResult<TrialKey> {
        assert!(!parts.is_empty(), "merge requires at least one input");
        if parts.len() == 1 {
            return Ok(parts[0].clone());
        }

        let models: Vec<&IdCatalog> = parts.iter().map(|p| &p.model_set).collect();
        let segs: Vec<&IdCatalog> = parts.iter().map(|p| &p.seg_set).collect();
        let (model_set, m_maps) = union_maps(&models);
        let (seg_set, s_maps) = union_maps(&segs);

        let mut tar = Mat::zeros(model_set.len(), seg_set.len());
        let mut non = Mat::zeros(model_set.len(), seg_set.len());
        for (part, (m_map, s_map)) in parts.iter().zip(m_maps.iter().zip(&s_maps)) {
            let (m_union, m_part) = m_map;
            let (s_union, s_part) = s_map;
            for (dst, src) in [(&mut tar, &part.tar), (&mut non, &part.non)] {
                let gathered = src.select(m_part, s_part);
                if let Some((r, c)) = dst.scatter_or_exclusive(m_union, s_union, &gathered) {
                    return Err(TrialsError::LabelConflict {
                        model: model_set.get(r).to_string(),
                        segment: seg_set.get(c).to_string(),
                    });
                }
            }
        }
        debug!(
            parts = parts.len(),
            rows = model_set.len(),
            cols = seg_set.len(),
            "merged trial keys"
        );
        let key = TrialKey {
            model_set,
            seg_set,
            tar,
            non,
        };
        key.validate()?;
        Ok(key)
    }

    /// Saves in the format implied by the file extension (`.txt` is text,
    /// anything else the binary container).
    pub fn save(&self, path: impl AsRef<Path>) -> TrialsResult<()> {
        let path = path.as_ref();
        self.save_as(path, Format::from_path(path))
    }

    /// Saves in an explicitly chosen format.
    pub fn save_as(&self, path: impl AsRef<Path>, format: Format) -> TrialsResult<()> {
        io::save_key(self, path.as_ref(), format)
    }

    /// Loads from the format implied by the file extension.
    pub fn load(path: impl AsRef<Path>) -> TrialsResult<Self> {
        let path = path.as_ref();
        Self::load_as(path, Format::from_path(path))
    }

    /// Loads from an explicitly chosen format.
    pub fn load_as(path: impl AsRef<Path>, format: Format) -> TrialsResult<Self> {
        io::load_key(path.as_ref(), format)
    }
}

impl TrialView for TrialKey {
    fn models(&self) -> &IdCatalog {
        &self.model_set
    }

    fn segments(&self) -> &IdCatalog {
        &self.seg_set
    }

    fn required(&self) -> Mat<bool> {
        let mut mask = self.tar.clone();
        for i in 0..mask.rows() {
            for j in 0..mask.cols() {
                if self.non[(i, j)] {
                    mask[(i, j)] = true;
                }
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(ids: &[&str]) -> IdCatalog {
        IdCatalog::new(ids.iter().copied()).unwrap()
    }

    fn sample() -> TrialKey {
        let models = catalog(&["m2", "m1"]);
        let segs = catalog(&["s2", "s1", "s3"]);
        let tar = Mat::from_vec(2, 3, vec![true, false, false, false, true, false]).unwrap();
        let non = Mat::from_vec(2, 3, vec![false, true, false, true, false, true]).unwrap();
        TrialKey::new(models, segs, tar, non).unwrap()
    }

    #[test]
    fn overlapping_labels_rejected() {
        let mut tar = Mat::zeros(1, 1);
        tar[(0, 0)] = true;
        let mut non = Mat::zeros(1, 1);
        non[(0, 0)] = true;
        let err = TrialKey::new(catalog(&["m1"]), catalog(&["s1"]), tar, non).unwrap_err();
        match err {
            TrialsError::LabelConflict { model, segment } => {
                assert_eq!(model, "m1");
                assert_eq!(segment, "s1");
            }
            other => panic!("expected LabelConflict, got {other}"),
        }
    }

    #[test]
    fn to_ndx_unions_masks() {
        let key = sample();
        let ndx = key.to_ndx();
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(
                    ndx.trial_mask()[(i, j)],
                    key.tar()[(i, j)] || key.non()[(i, j)]
                );
            }
        }
    }

    #[test]
    fn sort_permutes_both_masks_together() {
        let mut key = sample();
        key.sort();
        assert_eq!(key.model_set().ids(), ["m1", "m2"]);
        assert_eq!(key.seg_set().ids(), ["s1", "s2", "s3"]);
        // Original (m1, s1) was tar; after sorting it sits at (0, 0).
        assert!(key.tar()[(0, 0)]);
        assert!(key.non()[(0, 1)]); // original (m1, s2)
        key.validate().unwrap();
    }

    #[test]
    fn split_then_merge_reconstructs() {
        let mut key = sample();
        key.sort();

        let mut parts = Vec::new();
        for i in 1..=2 {
            for j in 1..=2 {
                parts.push(key.split(i, 2, j, 2));
            }
        }
        let mut merged = TrialKey::merge(&parts).unwrap();
        merged.sort();
        assert_eq!(merged, key);
    }

    #[test]
    fn merge_detects_double_claim() {
        let key = sample();
        // Merging a key with itself claims every labeled pair twice.
        let err = TrialKey::merge(&[key.clone(), key]).unwrap_err();
        assert!(matches!(err, TrialsError::LabelConflict { .. }));
    }

    #[test]
    fn merge_detects_cross_mask_conflict() {
        let mut tar = Mat::zeros(1, 1);
        tar[(0, 0)] = true;
        let a = TrialKey::new(catalog(&["m1"]), catalog(&["s1"]), tar, Mat::zeros(1, 1)).unwrap();
        let mut non = Mat::zeros(1, 1);
        non[(0, 0)] = true;
        let b = TrialKey::new(catalog(&["m1"]), catalog(&["s1"]), Mat::zeros(1, 1), non).unwrap();
        let err = TrialKey::merge(&[a, b]).unwrap_err();
        assert!(matches!(err, TrialsError::LabelConflict { .. }));
    }

    #[test]
    fn filter_keeps_subset() {
        let key = sample();
        let sub = key
            .filter(&catalog(&["m1"]), &catalog(&["s1", "s2"]), true)
            .unwrap();
        assert_eq!(sub.model_set().ids(), ["m1"]);
        assert!(sub.tar()[(0, 0)]); // (m1, s1)
        assert!(sub.non()[(0, 1)]); // (m1, s2)
        sub.validate().unwrap();
    }
}
