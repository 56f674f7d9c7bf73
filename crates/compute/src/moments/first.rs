//! First-moment estimator.
//!
//! For a uniformly random direction, point `p` lies between points `a` and
//! `b` in projected order with probability `θ_apb / π`. Summing `cl·cr`
//! (points before × points after) over many directions therefore estimates
//! the sum of angles at `p`, and the scale below turns that into the mean
//! angle over pairs of other points.

use std::f64::consts::PI;

use anglevar_core::{AngleVarError, Result};
use rayon::prelude::*;

use super::check_projections;
use crate::projection::Projection;

/// `2π / (t·(n−1)·(n−2))`.
pub fn first_moment_scale(t: usize, n: usize) -> f64 {
    2.0 * PI / (t as f64 * (n - 1) as f64 * (n - 2) as f64)
}

/// Running `Σ cl·cr` per point across projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstMomentAccumulator {
    counts: Vec<u64>,
    projections: usize,
}

impl FirstMomentAccumulator {
    pub fn new(n: usize) -> Self {
        Self {
            counts: vec![0; n],
            projections: 0,
        }
    }

    /// Fold one projection in. The point at rank `j` has `cl = j` and `cr = n − 1 − j`.
    pub fn add(&mut self, projection: &Projection) {
        let last = projection.len().saturating_sub(1);
        for (rank, &point) in projection.order().iter().enumerate() {
            self.counts[point] += (rank * (last - rank)) as u64;
        }
        self.projections += 1;
    }

    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self.projections += other.projections;
        self
    }

    /// Unscaled betweenness counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn projections(&self) -> usize {
        self.projections
    }

    /// Scaled first-moment vector over the projections folded so far.
    pub fn finish(&self) -> Result<Vec<f64>> {
        let n = self.counts.len();
        if n < 3 {
            return Err(AngleVarError::invalid(format!(
                "first moment needs at least 3 points, got {n}"
            )));
        }
        if self.projections == 0 {
            return Err(AngleVarError::invalid("first moment needs at least one projection"));
        }
        let scale = first_moment_scale(self.projections, n);
        Ok(self.counts.iter().map(|&c| c as f64 * scale).collect())
    }
}

/// Mean-angle estimate per point from `t = projections.len()` projections.
///
/// With `parallel`, projections are folded into per-worker partial
/// accumulators that are reduced at the end.
pub fn first_moment(projections: &[Projection], n: usize, parallel: bool) -> Result<Vec<f64>> {
    check_projections(projections, n)?;

    let acc = if parallel {
        projections
            .par_iter()
            .fold(
                || FirstMomentAccumulator::new(n),
                |mut acc, p| {
                    acc.add(p);
                    acc
                },
            )
            .reduce(|| FirstMomentAccumulator::new(n), FirstMomentAccumulator::merge)
    } else {
        let mut acc = FirstMomentAccumulator::new(n);
        for p in projections {
            acc.add(p);
        }
        acc
    };

    acc.finish()
}
