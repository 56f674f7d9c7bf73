//! Variance reduction for the sign sketch.
//!
//! `s1` sketch passes are averaged into one trial, `s2` trials form a
//! [`TrialMatrix`], and the matrix is reduced per point by mean (default)
//! or median.

use anglevar_core::{AngleVarError, Result, SketchMode, TrialCombine};
use rayon::prelude::*;
use tracing::debug;

use super::check_projections;
use super::sketch::{sketch_estimate, SignPair};
use crate::projection::Projection;
use crate::rng;

/// Shape and seed of the repeated sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPlan {
    /// Passes averaged per trial (`s1`).
    pub inner: usize,
    /// Trials (`s2`).
    pub outer: usize,
    pub seed: u64,
    /// What each pass contributes to its trial.
    pub sketch: SketchMode,
}

impl TrialPlan {
    pub fn new(inner: usize, outer: usize, seed: u64) -> Result<Self> {
        if inner < 1 || outer < 1 {
            return Err(AngleVarError::invalid(format!(
                "trial counts must be at least 1, got s1={inner}, s2={outer}"
            )));
        }
        Ok(Self {
            inner,
            outer,
            seed,
            sketch: SketchMode::Raw,
        })
    }

    pub fn with_sketch_mode(mut self, mode: SketchMode) -> Self {
        self.sketch = mode;
        self
    }

    pub fn passes(&self) -> usize {
        self.inner * self.outer
    }

    /// Signs for pass `pass` (row-major: trial `pass / s1`, repetition `pass % s1`).
    pub fn signs(&self, pass: usize, n: usize) -> SignPair {
        SignPair::draw(&mut rng::sign_rng(self.seed, pass), n)
    }
}

/// `s2 × n` table of trial averages.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialMatrix {
    rows: Vec<Vec<f64>>,
}

impl TrialMatrix {
    /// Group per-pass estimates (in pass order) into trials of `inner` passes each.
    pub fn from_passes(passes: Vec<Vec<f64>>, inner: usize) -> Result<Self> {
        if inner == 0 || passes.is_empty() || passes.len() % inner != 0 {
            return Err(AngleVarError::invalid(format!(
                "{} sketch passes cannot be grouped into trials of {}",
                passes.len(),
                inner
            )));
        }
        let n = passes[0].len();
        let rows = passes
            .chunks(inner)
            .map(|chunk| {
                let mut row = vec![0.0; n];
                for pass in chunk {
                    for (r, v) in row.iter_mut().zip(pass) {
                        *r += v;
                    }
                }
                for r in &mut row {
                    *r /= inner as f64;
                }
                row
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn trials(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Per-point mean over trials.
    pub fn mean(&self) -> Vec<f64> {
        let n = self.rows.first().map_or(0, Vec::len);
        let mut out = vec![0.0; n];
        for row in &self.rows {
            for (o, v) in out.iter_mut().zip(row) {
                *o += v;
            }
        }
        let count = self.rows.len() as f64;
        for o in &mut out {
            *o /= count;
        }
        out
    }

    /// Per-point median over trials; even counts average the two middle values.
    pub fn median(&self) -> Vec<f64> {
        let n = self.rows.first().map_or(0, Vec::len);
        let mut column = Vec::with_capacity(self.rows.len());
        (0..n)
            .map(|p| {
                column.clear();
                column.extend(self.rows.iter().map(|row| row[p]));
                column.sort_by(f64::total_cmp);
                let mid = column.len() / 2;
                if column.len() % 2 == 0 {
                    (column[mid - 1] + column[mid]) / 2.0
                } else {
                    column[mid]
                }
            })
            .collect()
    }

    pub fn combine(&self, mode: TrialCombine) -> Vec<f64> {
        match mode {
            TrialCombine::Mean => self.mean(),
            TrialCombine::Median => self.median(),
        }
    }
}

/// Unscaled second-moment vector `f2`: the combined `s1 × s2` sketch estimates.
///
/// With `parallel`, passes run on rayon workers; results are collected in
/// pass order so the reduction is identical to the sequential one.
pub fn second_moment(
    projections: &[Projection],
    n: usize,
    plan: &TrialPlan,
    mode: TrialCombine,
    parallel: bool,
) -> Result<Vec<f64>> {
    check_projections(projections, n)?;

    let run_pass =
        |pass: usize| sketch_estimate(projections, n, &plan.signs(pass, n), plan.sketch, false);
    let passes: Vec<Vec<f64>> = if parallel {
        (0..plan.passes()).into_par_iter().map(run_pass).collect::<Result<_>>()?
    } else {
        (0..plan.passes()).map(run_pass).collect::<Result<_>>()?
    };

    let matrix = TrialMatrix::from_passes(passes, plan.inner)?;
    debug!(
        trials = matrix.trials(),
        inner = plan.inner,
        sketch = %plan.sketch,
        combine = %mode,
        "Sign sketch trials complete"
    );
    Ok(matrix.combine(mode))
}
