//! Score combination and ranking.
//!
//! `Var(X) = E[X²] − E[X]²` with both moments taken from the independent
//! estimators. Negative results are passed through unchanged.

use std::f64::consts::PI;

use anglevar_core::{AngleVarError, RankOrder, Result};

/// `4π² / (t·(t−1)·(n−1)·(n−2))`.
pub fn second_moment_scale(t: usize, n: usize) -> f64 {
    4.0 * PI * PI / (t as f64 * (t - 1) as f64 * (n - 1) as f64 * (n - 2) as f64)
}

fn check_shape(f1: &[f64], f2: &[f64], n: usize, t: usize) -> Result<()> {
    if n < 3 {
        return Err(AngleVarError::invalid(format!("need at least 3 points, got {n}")));
    }
    if t < 2 {
        return Err(AngleVarError::invalid(format!(
            "need at least 2 projections to combine moments, got {t}"
        )));
    }
    if f1.len() != n || f2.len() != n {
        return Err(AngleVarError::invalid(format!(
            "moment vectors have lengths {} and {}, expected {}",
            f1.len(),
            f2.len(),
            n
        )));
    }
    Ok(())
}

/// Scaled second moment `E[X²]` per point.
///
/// `f2` is the combined (unscaled) sketch estimate and `f1` the scaled first
/// moment; the `2π·f1 / (t−1)` term removes the per-pair counting bias.
pub fn scaled_second_moment(f1: &[f64], f2: &[f64], n: usize, t: usize) -> Result<Vec<f64>> {
    check_shape(f1, f2, n, t)?;
    let scale = second_moment_scale(t, n);
    let correction = 2.0 * PI / (t - 1) as f64;
    Ok(f1
        .iter()
        .zip(f2)
        .map(|(&m1, &m2)| scale * m2 - correction * m1)
        .collect())
}

/// Variance score per point: `f2_scaled − f1²`.
pub fn combine_scores(f1: &[f64], f2: &[f64], n: usize, t: usize) -> Result<Vec<f64>> {
    let second = scaled_second_moment(f1, f2, n, t)?;
    Ok(variance_from_moments(f1, &second))
}

pub(crate) fn variance_from_moments(f1: &[f64], second: &[f64]) -> Vec<f64> {
    f1.iter().zip(second).map(|(&m1, &m2)| m2 - m1 * m1).collect()
}

/// Point indices ordered by score.
///
/// `Highest` sorts ascending (stable) and reverses, so among equal scores
/// the larger index comes first. `Lowest` is the plain ascending order.
pub fn rank_scores(scores: &[f64], order: RankOrder) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..scores.len()).collect();
    ranked.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    if order == RankOrder::Highest {
        ranked.reverse();
    }
    ranked
}
