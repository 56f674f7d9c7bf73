use serde::{Deserialize, Serialize};

use crate::error::{AngleVarError, Result};

/// Immutable set of `n` points sharing one dimensionality `d`.
///
/// Rows are stored contiguously (row-major) so projections stream through
/// memory once per direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    dim: usize,
    data: Vec<f64>,
}

impl PointSet {
    /// Build a point set from owned rows.
    ///
    /// Every row must have the same non-zero length and finite coordinates.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(AngleVarError::invalid("point set is empty"));
        };
        let dim = first.len();
        if dim == 0 {
            return Err(AngleVarError::invalid("points must have at least one dimension"));
        }

        let mut data = Vec::with_capacity(rows.len() * dim);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(AngleVarError::DimensionMismatch {
                    index,
                    expected: dim,
                    found: row.len(),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(AngleVarError::NonFiniteCoordinate { index });
            }
            data.extend_from_slice(row);
        }

        Ok(Self { dim, data })
    }

    /// Build a point set from a flat row-major buffer.
    pub fn from_flat(dim: usize, data: Vec<f64>) -> Result<Self> {
        if dim == 0 {
            return Err(AngleVarError::invalid("points must have at least one dimension"));
        }
        if data.is_empty() {
            return Err(AngleVarError::invalid("point set is empty"));
        }
        if data.len() % dim != 0 {
            return Err(AngleVarError::invalid(format!(
                "flat buffer of length {} is not a multiple of dimension {}",
                data.len(),
                dim
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(AngleVarError::NonFiniteCoordinate { index: pos / dim });
        }
        Ok(Self { dim, data })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Dimensionality shared by every point.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Coordinates of point `index`.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn point(&self, index: usize) -> &[f64] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.dim)
    }

    /// A copy of this set with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        Self::from_flat(self.dim, self.data.iter().map(|v| v * factor).collect())
    }

    /// A copy of this set whose row `i` is row `order[i]` of `self`.
    pub fn reordered(&self, order: &[usize]) -> Result<Self> {
        if order.len() != self.len() {
            return Err(AngleVarError::invalid(format!(
                "reorder permutation has length {}, expected {}",
                order.len(),
                self.len()
            )));
        }
        let mut seen = vec![false; order.len()];
        let mut data = Vec::with_capacity(self.data.len());
        for &src in order {
            if src >= seen.len() || seen[src] {
                return Err(AngleVarError::invalid("reorder indices must form a permutation"));
            }
            seen[src] = true;
            data.extend_from_slice(self.point(src));
        }
        Ok(Self { dim: self.dim, data })
    }
}
