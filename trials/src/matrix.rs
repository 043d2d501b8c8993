use std::ops::{Index, IndexMut};

use crate::{TrialsError, TrialsResult};

/// Dense row-major matrix of `Copy` cells.
///
/// Rows correspond to models and columns to segments everywhere in this
/// crate. Cells are addressed as `(row, col)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mat<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Mat<T> {
    /// Creates a matrix filled with `T::default()` (`false` / `0.0`).
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::default())
    }
}

impl<T: Copy> Mat<T> {
    /// Creates a matrix filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Creates a matrix from a row-major vector.
    /// Returns `None` when `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Row-major view of all cells.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Gathers the submatrix at the Cartesian product `rows` x `cols`.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Mat<T> {
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for &r in rows {
            for &c in cols {
                data.push(self[(r, c)]);
            }
        }
        Mat {
            rows: rows.len(),
            cols: cols.len(),
            data,
        }
    }
}

impl Mat<bool> {
    /// Number of true cells.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// OR-combines `src` into the Cartesian product `rows` x `cols`.
    /// `src` must have shape `(rows.len(), cols.len())`.
    pub fn scatter_or(&mut self, rows: &[usize], cols: &[usize], src: &Mat<bool>) {
        debug_assert_eq!(src.shape(), (rows.len(), cols.len()));
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                if src[(i, j)] {
                    self[(r, c)] = true;
                }
            }
        }
    }

    /// Like [`Mat::scatter_or`], but stops at the first destination cell
    /// that is already true and returns its position.
    pub fn scatter_or_exclusive(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        src: &Mat<bool>,
    ) -> Option<(usize, usize)> {
        debug_assert_eq!(src.shape(), (rows.len(), cols.len()));
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                if src[(i, j)] {
                    if self[(r, c)] {
                        return Some((r, c));
                    }
                    self[(r, c)] = true;
                }
            }
        }
        None
    }
}

impl<T> Index<(usize, usize)> for Mat<T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<T> IndexMut<(usize, usize)> for Mat<T> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r * self.cols + c]
    }
}

/// Checks a payload matrix shape against the catalog sizes of its owner.
pub(crate) fn check_shape(
    expected_rows: usize,
    expected_cols: usize,
    shape: (usize, usize),
) -> TrialsResult<()> {
    if shape != (expected_rows, expected_cols) {
        return Err(TrialsError::ShapeMismatch {
            expected_rows,
            expected_cols,
            got_rows: shape.0,
            got_cols: shape.1,
        });
    }
    Ok(())
}
