//! Random 1-D projections of a point set.
//!
//! A [`Projection`] is the ascending order of the points along one line.
//! [`GaussianProjector`] draws each line direction from i.i.d. standard
//! normals, which makes the direction uniformly distributed on the sphere.

use std::cmp::Ordering;

use anglevar_core::{AngleVarError, PointSet, Result};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::trace;

use crate::rng;

/// One projection: point indices in ascending order of projected value.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    order: Vec<usize>,
    values: Vec<f64>,
    tied_pairs: usize,
}

impl Projection {
    /// Sort points by their projected coordinate (`values[i]` belongs to point `i`).
    ///
    /// Equal values are ordered by original index, so the result is always a
    /// valid permutation.
    pub fn from_values(values: &[f64]) -> Self {
        // -0.0 and 0.0 compare equal, so they must tie under the sort too.
        let key = |i: usize| if values[i] == 0.0 { 0.0 } else { values[i] };
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| match key(a).total_cmp(&key(b)) {
            Ordering::Equal => a.cmp(&b),
            other => other,
        });

        let sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        let tied_pairs = sorted.windows(2).filter(|w| w[0] == w[1]).count();

        Self {
            order,
            values: sorted,
            tied_pairs,
        }
    }

    /// Build from `(point_index, projected_value)` pairs already sorted ascending.
    ///
    /// `index` is the projection's position, used only in error reports.
    pub fn from_pairs(index: usize, pairs: Vec<(usize, f64)>) -> Result<Self> {
        let n = pairs.len();
        let mut seen = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut tied_pairs = 0;

        for (pos, (point, value)) in pairs.into_iter().enumerate() {
            if point >= n || seen[point] {
                return Err(AngleVarError::MalformedProjection {
                    index,
                    reason: format!("point {point} at rank {pos} is out of range or repeated"),
                });
            }
            if let Some(&prev) = values.last() {
                if value < prev {
                    return Err(AngleVarError::MalformedProjection {
                        index,
                        reason: format!("values are not ascending at rank {pos}"),
                    });
                }
                if value == prev {
                    tied_pairs += 1;
                }
            }
            seen[point] = true;
            order.push(point);
            values.push(value);
        }

        Ok(Self {
            order,
            values,
            tied_pairs,
        })
    }

    /// Build from a bare ordering; projected values are taken to be the ranks.
    pub fn from_order(index: usize, order: Vec<usize>) -> Result<Self> {
        let pairs = order
            .into_iter()
            .enumerate()
            .map(|(rank, point)| (point, rank as f64))
            .collect();
        Self::from_pairs(index, pairs)
    }

    /// Number of points in the ordering.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Point indices, lowest projected value first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// `(point_index, projected_value)` pairs in ascending order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.order.iter().copied().zip(self.values.iter().copied())
    }

    /// Adjacent pairs in the ordering whose projected values are equal.
    pub fn tied_pairs(&self) -> usize {
        self.tied_pairs
    }
}

/// Source of independent 1-D projections.
pub trait Projector: Sync {
    /// Build projection number `index` of `points`.
    ///
    /// Must be deterministic in `(points, index)` so projections can be
    /// regenerated or built on any worker.
    fn projection(&self, points: &PointSet, index: usize) -> Result<Projection>;

    /// Build `t` projections on the calling thread.
    fn project(&self, points: &PointSet, t: usize) -> Result<Vec<Projection>> {
        (0..t).map(|i| self.projection(points, i)).collect()
    }

    /// Build `t` projections on rayon workers. Output order matches [`Projector::project`].
    fn project_parallel(&self, points: &PointSet, t: usize) -> Result<Vec<Projection>> {
        (0..t)
            .into_par_iter()
            .map(|i| self.projection(points, i))
            .collect()
    }
}

/// Projects onto directions with i.i.d. standard normal components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaussianProjector {
    seed: u64,
}

impl GaussianProjector {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Direction vector of projection `index` in `dim` dimensions.
    pub fn direction(&self, dim: usize, index: usize) -> Vec<f64> {
        let mut rng = rng::projection_rng(self.seed, index);
        (0..dim)
            .map(|_| -> f64 { StandardNormal.sample(&mut rng) })
            .collect()
    }
}

impl Projector for GaussianProjector {
    fn projection(&self, points: &PointSet, index: usize) -> Result<Projection> {
        let direction = self.direction(points.dim(), index);
        let values: Vec<f64> = points
            .iter()
            .map(|p| p.iter().zip(&direction).map(|(x, w)| x * w).sum::<f64>())
            .collect();
        trace!(projection = index, "projected {} points", values.len());
        Ok(Projection::from_values(&values))
    }
}

/// Projections supplied up front by the caller.
#[derive(Debug, Clone)]
pub struct PrecomputedProjections {
    projections: Vec<Projection>,
}

impl PrecomputedProjections {
    pub fn new(projections: Vec<Projection>) -> Self {
        Self { projections }
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

impl Projector for PrecomputedProjections {
    fn projection(&self, points: &PointSet, index: usize) -> Result<Projection> {
        let projection = self.projections.get(index).ok_or_else(|| {
            AngleVarError::invalid(format!(
                "projection {index} requested but only {} were supplied",
                self.projections.len()
            ))
        })?;
        if projection.len() != points.len() {
            return Err(AngleVarError::MalformedProjection {
                index,
                reason: format!(
                    "orders {} points but the point set has {}",
                    projection.len(),
                    points.len()
                ),
            });
        }
        Ok(projection.clone())
    }
}
