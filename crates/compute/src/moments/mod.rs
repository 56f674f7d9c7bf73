//! Moment estimators over a set of projections.
//!
//! Sub-modules:
//! - [`first`]: betweenness counts `Σ cl·cr`, scaled to the mean angle
//! - [`sketch`]: AMS sign sketch of the squared betweenness counts
//! - [`trials`]: `s1 × s2` repetition of the sketch and trial reduction
//!
//! Per-pass accumulation is exact integer arithmetic, so results are the
//! same whether projections are folded sequentially or on rayon workers.

pub mod first;
pub mod sketch;
pub mod trials;

use anglevar_core::{AngleVarError, Result};

use crate::projection::Projection;

pub use first::{first_moment, first_moment_scale, FirstMomentAccumulator};
pub use sketch::{
    frobenius_estimate, sign_sketch_pass, sketch_estimate, SignPair, SignVector, SketchAccumulator,
};
pub use trials::{second_moment, TrialMatrix, TrialPlan};

/// Every projection must order exactly the `n` points being scored.
pub(crate) fn check_projections(projections: &[Projection], n: usize) -> Result<()> {
    if projections.is_empty() {
        return Err(AngleVarError::invalid("at least one projection is required"));
    }
    for (index, p) in projections.iter().enumerate() {
        check_projection(index, p, n)?;
    }
    Ok(())
}

pub(crate) fn check_projection(index: usize, projection: &Projection, n: usize) -> Result<()> {
    if projection.len() != n {
        return Err(AngleVarError::MalformedProjection {
            index,
            reason: format!("orders {} points, expected {}", projection.len(), n),
        });
    }
    Ok(())
}
