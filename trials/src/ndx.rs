use std::path::Path;

use tracing::debug;

use crate::catalog::IdCatalog;
use crate::io::{self, Format};
use crate::matrix::{Mat, check_shape};
use crate::partition::{block_bounds, union_maps};
use crate::TrialsResult;

/// Common read-only view over the trial collections that define which
/// (model, segment) pairs require scores: a [`TrialNdx`] directly, or a
/// [`TrialKey`](crate::TrialKey) through the union of its target and
/// non-target masks.
pub trait TrialView {
    /// Row-axis catalog (models).
    fn models(&self) -> &IdCatalog;

    /// Column-axis catalog (segments).
    fn segments(&self) -> &IdCatalog;

    /// Logical trial mask: which pairs require a score.
    fn required(&self) -> Mat<bool>;
}

/// Boolean trial index over a model x segment grid.
///
/// `trial_mask` marks which pairs are eligible to be scored, independent of
/// ground truth. The catalogs and the mask always agree in shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialNdx {
    model_set: IdCatalog,
    seg_set: IdCatalog,
    trial_mask: Mat<bool>,
}

impl TrialNdx {
    /// Creates an index, checking the mask shape against the catalogs.
    pub fn new(
        model_set: IdCatalog,
        seg_set: IdCatalog,
        trial_mask: Mat<bool>,
    ) -> TrialsResult<Self> {
        check_shape(model_set.len(), seg_set.len(), trial_mask.shape())?;
        Ok(Self {
            model_set,
            seg_set,
            trial_mask,
        })
    }

    /// Creates an index where every pair is a valid trial.
    pub fn full(model_set: IdCatalog, seg_set: IdCatalog) -> Self {
        let trial_mask = Mat::filled(model_set.len(), seg_set.len(), true);
        Self {
            model_set,
            seg_set,
            trial_mask,
        }
    }

    pub fn model_set(&self) -> &IdCatalog {
        &self.model_set
    }

    pub fn seg_set(&self) -> &IdCatalog {
        &self.seg_set
    }

    pub fn trial_mask(&self) -> &Mat<bool> {
        &self.trial_mask
    }

    /// Reorders both axes into lexical order. The two permutations are
    /// independent; the mask is reindexed over their Cartesian product.
    pub fn sort(&mut self) {
        let (models, m_idx) = self.model_set.sort();
        let (segs, s_idx) = self.seg_set.sort();
        self.trial_mask = self.trial_mask.select(&m_idx, &s_idx);
        self.model_set = models;
        self.seg_set = segs;
    }

    /// Restricts the index to the given model and segment subsets.
    ///
    /// With `keep = false` the subsets denote exclusions and are replaced by
    /// their complement against the current catalogs. With `keep = true`
    /// every subset identifier must be present in the current catalogs,
    /// otherwise [`TrialsError::MissingIdentifier`](crate::TrialsError) is
    /// returned. The result keeps the subset's ordering.
    pub fn filter(
        &self,
        model_set: &IdCatalog,
        seg_set: &IdCatalog,
        keep: bool,
    ) -> TrialsResult<TrialNdx> {
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
        Ok(TrialNdx {
            model_set,
            seg_set,
            trial_mask: self.trial_mask.select(&m_idx, &s_idx),
        })
    }

    /// Extracts one deterministic block of the grid.
    ///
    /// Each axis is divided into contiguous near-equal blocks by position;
    /// `model_part` and `seg_part` are 1-based. The blocks tile the full
    /// matrix, so merging every block reconstructs the original.
    pub fn split(
        &self,
        model_part: usize,
        num_model_parts: usize,
        seg_part: usize,
        num_seg_parts: usize,
    ) -> TrialNdx {
        let m_idx: Vec<usize> =
            block_bounds(self.model_set.len(), model_part, num_model_parts).collect();
        let s_idx: Vec<usize> =
            block_bounds(self.seg_set.len(), seg_part, num_seg_parts).collect();
        TrialNdx {
            model_set: self.model_set.gather(&m_idx),
            seg_set: self.seg_set.gather(&s_idx),
            trial_mask: self.trial_mask.select(&m_idx, &s_idx),
        }
    }

    /// Merges indexes with possibly different but overlapping catalogs.
    ///
    /// The result covers the sorted identifier union of all inputs; each
    /// input's mask is OR-scattered into the union grid. The operation is
    /// associative and commutative, and merging the disjoint blocks produced
    /// by [`TrialNdx::split`] reconstructs the original (after sorting).
    pub fn merge(parts: &[TrialNdx]) -> TrialNdx {
        assert!(!parts.is_empty(), "merge requires at least one input");
        if parts.len() == 1 {
            return parts[0].clone();
        }

        let models: Vec<&IdCatalog> = parts.iter().map(|p| &p.model_set).collect();
        let segs: Vec<&IdCatalog> = parts.iter().map(|p| &p.seg_set).collect();
        let (model_set, m_maps) = union_maps(&models);
        let (seg_set, s_maps) = union_maps(&segs);

        let mut trial_mask = Mat::zeros(model_set.len(), seg_set.len());
        for (part, (m_map, s_map)) in parts.iter().zip(m_maps.iter().zip(&s_maps)) {
            let (m_union, m_part) = m_map;
            let (s_union, s_part) = s_map;
            let gathered = part.trial_mask.select(m_part, s_part);
            trial_mask.scatter_or(m_union, s_union, &gathered);
        }
        debug!(
            parts = parts.len(),
            rows = model_set.len(),
            cols = seg_set.len(),
            "merged trial indexes"
        );
        TrialNdx {
            model_set,
            seg_set,
            trial_mask,
        }
    }

    /// Saves in the format implied by the file extension (`.txt` is text,
    /// anything else the binary container).
    pub fn save(&self, path: impl AsRef<Path>) -> TrialsResult<()> {
        let path = path.as_ref();
        self.save_as(path, Format::from_path(path))
    }

    /// Saves in an explicitly chosen format.
    pub fn save_as(&self, path: impl AsRef<Path>, format: Format) -> TrialsResult<()> {
        io::save_ndx(self, path.as_ref(), format)
    }

    /// Loads from the format implied by the file extension.
    pub fn load(path: impl AsRef<Path>) -> TrialsResult<Self> {
        let path = path.as_ref();
        Self::load_as(path, Format::from_path(path))
    }

    /// Loads from an explicitly chosen format.
    pub fn load_as(path: impl AsRef<Path>, format: Format) -> TrialsResult<Self> {
        io::load_ndx(path.as_ref(), format)
    }
}

impl TrialView for TrialNdx {
    fn models(&self) -> &IdCatalog {
        &self.model_set
    }

    fn segments(&self) -> &IdCatalog {
        &self.seg_set
    }

    fn required(&self) -> Mat<bool> {
        self.trial_mask.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrialsError;

    fn catalog(ids: &[&str]) -> IdCatalog {
        IdCatalog::new(ids.iter().copied()).unwrap()
    }

    fn sample() -> TrialNdx {
        let models = catalog(&["m2", "m1", "m3"]);
        let segs = catalog(&["s4", "s1", "s3", "s2"]);
        let mask = Mat::from_vec(
            3,
            4,
            vec![
                true, false, true, false, //
                false, true, false, true, //
                true, true, false, false,
            ],
        )
        .unwrap();
        TrialNdx::new(models, segs, mask).unwrap()
    }

    #[test]
    fn new_rejects_shape_mismatch() {
        let err = TrialNdx::new(
            catalog(&["m1"]),
            catalog(&["s1", "s2"]),
            Mat::zeros(2, 2),
        )
        .unwrap_err();
        assert!(matches!(err, TrialsError::ShapeMismatch { .. }));
    }

    #[test]
    fn sort_reorders_both_axes() {
        let mut ndx = sample();
        let before = ndx.clone();
        ndx.sort();
        assert_eq!(ndx.model_set().ids(), ["m1", "m2", "m3"]);
        assert_eq!(ndx.seg_set().ids(), ["s1", "s2", "s3", "s4"]);
        // (m1, s2) was true in the original.
        assert!(ndx.trial_mask()[(0, 1)]);
        // Sorting twice is a no-op.
        let mut again = ndx.clone();
        again.sort();
        assert_eq!(ndx, again);
        // Original untouched semantics: sorted differs from unsorted object.
        assert_ne!(ndx, before);
    }

    #[test]
    fn filter_keep_uses_subset_order() {
        let ndx = sample();
        let sub = ndx
            .filter(&catalog(&["m3", "m1"]), &catalog(&["s4", "s3"]), true)
            .unwrap();
        assert_eq!(sub.model_set().ids(), ["m3", "m1"]);
        assert_eq!(sub.seg_set().ids(), ["s4", "s3"]);
        assert!(sub.trial_mask()[(0, 0)]); // (m3, s4)
        assert!(!sub.trial_mask()[(0, 1)]); // (m3, s3)
        assert!(!sub.trial_mask()[(1, 0)]); // (m1, s4)
        assert!(!sub.trial_mask()[(1, 1)]); // (m1, s3)
    }

    #[test]
    fn filter_missing_identifier_fails() {
        let ndx = sample();
        let err = ndx
            .filter(&catalog(&["nope"]), &catalog(&["s1"]), true)
            .unwrap_err();
        assert!(matches!(err, TrialsError::MissingIdentifier { .. }));
    }

    #[test]
    fn filter_complement_pieces_merge_back() {
        let mut ndx = sample();
        ndx.sort();
        let subset_m = catalog(&["m2"]);
        let all_s = ndx.seg_set().clone();

        let kept = ndx.filter(&subset_m, &all_s, true).unwrap();
        let dropped = ndx.filter(&subset_m, &IdCatalog::empty(), false).unwrap();

        // The row blocks are disjoint and together cover every model.
        let (common, _, _) = kept.model_set().intersect(dropped.model_set());
        assert!(common.is_empty());

        let mut merged = TrialNdx::merge(&[kept, dropped]);
        merged.sort();
        assert_eq!(merged, ndx);
    }

    #[test]
    fn split_then_merge_reconstructs() {
        let mut ndx = sample();
        ndx.sort();

        let mut parts = Vec::new();
        for i in 1..=2 {
            for j in 1..=3 {
                parts.push(ndx.split(i, 2, j, 3));
            }
        }
        let mut merged = TrialNdx::merge(&parts);
        merged.sort();
        assert_eq!(merged, ndx);
    }

    #[test]
    fn merge_row_blocks_reconstructs() {
        let mut ndx = sample();
        ndx.sort();
        let top = ndx.split(1, 2, 1, 1);
        let bottom = ndx.split(2, 2, 1, 1);
        let mut merged = TrialNdx::merge(&[top, bottom]);
        merged.sort();
        assert_eq!(merged, ndx);
    }

    #[test]
    fn merge_overlapping_inputs_ors_masks() {
        let a = TrialNdx::new(
            catalog(&["m1"]),
            catalog(&["s1", "s2"]),
            Mat::from_vec(1, 2, vec![true, false]).unwrap(),
        )
        .unwrap();
        let b = TrialNdx::new(
            catalog(&["m1"]),
            catalog(&["s1", "s2"]),
            Mat::from_vec(1, 2, vec![false, true]).unwrap(),
        )
        .unwrap();
        let merged = TrialNdx::merge(&[a, b]);
        assert!(merged.trial_mask()[(0, 0)]);
        assert!(merged.trial_mask()[(0, 1)]);
    }

    #[test]
    fn split_empty_axis() {
        let ndx = TrialNdx::full(IdCatalog::empty(), IdCatalog::empty());
        let part = ndx.split(1, 3, 1, 3);
        assert_eq!(part.model_set().len(), 0);
        assert_eq!(part.seg_set().len(), 0);
    }
}
