use std::path::Path;

use tracing::{debug, warn};

use crate::catalog::IdCatalog;
use crate::io::{self, Format};
use crate::key::TrialKey;
use crate::matrix::{Mat, check_shape};
use crate::ndx::TrialView;
use crate::partition::{block_bounds, union_maps};
use crate::{TrialsError, TrialsResult};

/// Score matrix over a model x segment grid.
///
/// `score_mask` marks which cells hold a valid computed score; masked
/// values are always finite. Cells outside the mask are unspecified and
/// ignored by every operation, including equality.
#[derive(Debug, Clone)]
pub struct TrialScores {
    model_set: IdCatalog,
    seg_set: IdCatalog,
    scores: Mat<f64>,
    score_mask: Mat<bool>,
}

impl PartialEq for TrialScores {
    fn eq(&self, other: &Self) -> bool {
        if self.model_set != other.model_set
            || self.seg_set != other.seg_set
            || self.score_mask != other.score_mask
        {
            return false;
        }
        for i in 0..self.scores.rows() {
            for j in 0..self.scores.cols() {
                if self.score_mask[(i, j)] && self.scores[(i, j)] != other.scores[(i, j)] {
                    return false;
                }
            }
        }
        true
    }
}

impl TrialScores {
    /// Creates a score container, checking matrix shapes against the
    /// catalogs and that every masked value is finite.
    pub fn new(
        model_set: IdCatalog,
        seg_set: IdCatalog,
        scores: Mat<f64>,
        score_mask: Mat<bool>,
    ) -> TrialsResult<Self> {
        check_shape(model_set.len(), seg_set.len(), scores.shape())?;
        check_shape(model_set.len(), seg_set.len(), score_mask.shape())?;
        let scr = Self {
            model_set,
            seg_set,
            scores,
            score_mask,
        };
        scr.validate()?;
        Ok(scr)
    }

    /// Creates an empty container (no valid scores) over the given catalogs.
    /// External scorers fill it with [`TrialScores::set_score`].
    pub fn empty(model_set: IdCatalog, seg_set: IdCatalog) -> Self {
        let scores = Mat::zeros(model_set.len(), seg_set.len());
        let score_mask = Mat::zeros(model_set.len(), seg_set.len());
        Self {
            model_set,
            seg_set,
            scores,
            score_mask,
        }
    }

    /// Checks that every masked score is finite.
    pub fn validate(&self) -> TrialsResult<()> {
        for i in 0..self.scores.rows() {
            for j in 0..self.scores.cols() {
                let v = self.scores[(i, j)];
                if self.score_mask[(i, j)] && !v.is_finite() {
                    return Err(TrialsError::NonFiniteScore {
                        model: self.model_set.get(i).to_string(),
                        segment: self.seg_set.get(j).to_string(),
                        value: v,
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

    pub fn scores(&self) -> &Mat<f64> {
        &self.scores
    }

    pub fn score_mask(&self) -> &Mat<bool> {
        &self.score_mask
    }

    /// Records the score for one (model, segment) pair and marks it valid.
    pub fn set_score(&mut self, model: &str, segment: &str, value: f64) -> TrialsResult<()> {
        let i = self
            .model_set
            .position(model)
            .ok_or_else(|| TrialsError::MissingIdentifier {
                id: model.to_string(),
            })?;
        let j = self
            .seg_set
            .position(segment)
            .ok_or_else(|| TrialsError::MissingIdentifier {
                id: segment.to_string(),
            })?;
        if !value.is_finite() {
            return Err(TrialsError::NonFiniteScore {
                model: model.to_string(),
                segment: segment.to_string(),
                value,
            });
        }
        self.scores[(i, j)] = value;
        self.score_mask[(i, j)] = true;
        Ok(())
    }

    /// Reorders both axes into lexical order, permuting scores and mask with
    /// the same two independent permutations.
    pub fn sort(&mut self) {
        let (models, m_idx) = self.model_set.sort();
        let (segs, s_idx) = self.seg_set.sort();
        self.scores = self.scores.select(&m_idx, &s_idx);
        self.score_mask = self.score_mask.select(&m_idx, &s_idx);
        self.model_set = models;
        self.seg_set = segs;
    }

    /// Restricts the container to the given model and segment subsets; see
    /// [`TrialNdx::filter`](crate::TrialNdx::filter) for the `keep`
    /// semantics.
    pub fn filter(
        &self,
        model_set: &IdCatalog,
        seg_set: &IdCatalog,
        keep: bool,
    ) -> TrialsResult<TrialScores> {
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
        Ok(TrialScores {
            model_set,
            seg_set,
            scores: self.scores.select(&m_idx, &s_idx),
            score_mask: self.score_mask.select(&m_idx, &s_idx),
        })
    }

    /// Extracts one deterministic block of the grid; see
    /// [`TrialNdx::split`](crate::TrialNdx::split).
    pub fn split(
        &self,
        model_part: usize,
        num_model_parts: usize,
        seg_part: usize,
        num_seg_parts: usize,
    ) -> TrialScores {
        let m_idx: Vec<usize> =
            block_bounds(self.model_set.len(), model_part, num_model_parts).collect();
        let s_idx: Vec<usize> =
            block_bounds(self.seg_set.len(), seg_part, num_seg_parts).collect();
        TrialScores {
            model_set: self.model_set.gather(&m_idx),
            seg_set: self.seg_set.gather(&s_idx),
            scores: self.scores.select(&m_idx, &s_idx),
            score_mask: self.score_mask.select(&m_idx, &s_idx),
        }
    }

    /// Merges score containers with possibly different but overlapping
    /// catalogs.
    ///
    /// Uses the same union/gather strategy as
    /// [`TrialNdx::merge`](crate::TrialNdx::merge). Two inputs both claiming
    /// validity for the same pair is a [`TrialsError::LabelConflict`]; each
    /// valid cell takes its value from the single input that claims it.
    pub fn merge(parts: &[TrialScores]) -> TrialsResult<TrialScores> {
        assert!(!parts.is_empty(), "merge requires at least one input");
        if parts.len() == 1 {
            return Ok(parts[0].clone());
        }

        let models: Vec<&IdCatalog> = parts.iter().map(|p| &p.model_set).collect();
        let segs: Vec<&IdCatalog> = parts.iter().map(|p| &p.seg_set).collect();
        let (model_set, m_maps) = union_maps(&models);
        let (seg_set, s_maps) = union_maps(&segs);

        let mut scores = Mat::zeros(model_set.len(), seg_set.len());
        let mut score_mask: Mat<bool> = Mat::zeros(model_set.len(), seg_set.len());
        for (part, (m_map, s_map)) in parts.iter().zip(m_maps.iter().zip(&s_maps)) {
            let (m_union, m_part) = m_map;
            let (s_union, s_part) = s_map;
            let vals = part.scores.select(m_part, s_part);
            let mask = part.score_mask.select(m_part, s_part);
            for (i, &r) in m_union.iter().enumerate() {
                for (j, &c) in s_union.iter().enumerate() {
                    if !mask[(i, j)] {
                        continue;
                    }
                    if score_mask[(r, c)] {
                        return Err(TrialsError::LabelConflict {
                            model: model_set.get(r).to_string(),
                            segment: seg_set.get(c).to_string(),
                        });
                    }
                    scores[(r, c)] = vals[(i, j)];
                    score_mask[(r, c)] = true;
                }
            }
        }
        debug!(
            parts = parts.len(),
            rows = model_set.len(),
            cols = seg_set.len(),
            "merged trial scores"
        );
        Ok(TrialScores {
            model_set,
            seg_set,
            scores,
            score_mask,
        })
    }

    /// Aligns the container against a reference index or key.
    ///
    /// Filters down to the reference's catalogs (coverage required), then
    /// intersects the reference's logical trial mask with the score mask.
    /// With `missing_raise = true`, any required trial without a score is a
    /// [`TrialsError::MissingScores`]; each offending pair is logged before
    /// the error returns. With `missing_raise = false` the partial result is
    /// returned as-is.
    pub fn align_with_ndx<V: TrialView>(
        &self,
        reference: &V,
        missing_raise: bool,
    ) -> TrialsResult<TrialScores> {
        let mut scr = self.filter(reference.models(), reference.segments(), true)?;
        let required = reference.required();
        for i in 0..scr.score_mask.rows() {
            for j in 0..scr.score_mask.cols() {
                if !required[(i, j)] {
                    scr.score_mask[(i, j)] = false;
                }
            }
        }
        if missing_raise {
            let mut missing = Vec::new();
            for i in 0..required.rows() {
                for j in 0..required.cols() {
                    if required[(i, j)] && !scr.score_mask[(i, j)] {
                        missing.push((
                            scr.model_set.get(i).to_string(),
                            scr.seg_set.get(j).to_string(),
                        ));
                    }
                }
            }
            if !missing.is_empty() {
                for (model, segment) in &missing {
                    warn!(model, segment, "missing score for required trial");
                }
                return Err(TrialsError::MissingScores {
                    count: missing.len(),
                    missing,
                });
            }
        }
        Ok(scr)
    }

    /// Aligns against `key` and partitions the masked scores into flat
    /// target and non-target sequences, the canonical extraction for
    /// verification-cost metrics.
    pub fn get_tar_non(&self, key: &TrialKey) -> TrialsResult<(Vec<f64>, Vec<f64>)> {
        let scr = self.align_with_ndx(key, true)?;
        let mut tar = Vec::new();
        let mut non = Vec::new();
        for i in 0..scr.scores.rows() {
            for j in 0..scr.scores.cols() {
                if !scr.score_mask[(i, j)] {
                    continue;
                }
                if key.tar()[(i, j)] {
                    tar.push(scr.scores[(i, j)]);
                } else if key.non()[(i, j)] {
                    non.push(scr.scores[(i, j)]);
                }
            }
        }
        Ok((tar, non))
    }

    /// Aligns against the reference without raising, then fills every
    /// required-but-unscored pair with `value` and marks it valid. Returns a
    /// fully covered container.
    pub fn set_missing_to_value<V: TrialView>(
        &self,
        reference: &V,
        value: f64,
    ) -> TrialsResult<TrialScores> {
        let mut scr = self.align_with_ndx(reference, false)?;
        let required = reference.required();
        for i in 0..required.rows() {
            for j in 0..required.cols() {
                if required[(i, j)] && !scr.score_mask[(i, j)] {
                    scr.scores[(i, j)] = value;
                    scr.score_mask[(i, j)] = true;
                }
            }
        }
        scr.validate()?;
        Ok(scr)
    }

    /// Applies a pure scalar function to every score under the mask, in
    /// place. Cells outside the mask are untouched.
    pub fn transform<F: Fn(f64) -> f64>(&mut self, f: F) {
        for i in 0..self.scores.rows() {
            for j in 0..self.scores.cols() {
                if self.score_mask[(i, j)] {
                    self.scores[(i, j)] = f(self.scores[(i, j)]);
                }
            }
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
        io::save_scores(self, path.as_ref(), format)
    }

    /// Loads from the format implied by the file extension.
    pub fn load(path: impl AsRef<Path>) -> TrialsResult<Self> {
        let path = path.as_ref();
        Self::load_as(path, Format::from_path(path))
    }

    /// Loads from an explicitly chosen format.
    pub fn load_as(path: impl AsRef<Path>, format: Format) -> TrialsResult<Self> {
        io::load_scores(path.as_ref(), format)
    }
}
