//! Angle-variance scoring engine.
//!
//! Validates the run, resolves the seed, builds projections, runs the two
//! moment estimators, combines them and ranks the points. Two evaluation
//! strategies produce bit-identical output:
//! - materialized: all `t` projections are built, then consumed
//! - streamed: each projection feeds every accumulator, then is dropped


use std::time::{Duration, Instant};

use anglevar_core::config::load_dotenv;
use anglevar_core::{AngleVarError, EstimatorConfig, PointSet, Result, SketchMode};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::combine::{rank_scores, scaled_second_moment, variance_from_moments};
use crate::moments::{
    check_projection, first_moment, second_moment, FirstMomentAccumulator, SignPair,
    SketchAccumulator, TrialMatrix, TrialPlan,
};
use crate::projection::{GaussianProjector, Projection, Projector};
use crate::rng;

/// Data-quality signals and timings for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Seed that drove projections and sign draws.
    pub seed: u64,
    pub projections: usize,
    pub sketch_passes: usize,
    pub sketch_mode: SketchMode,
    /// Projections whose ordering contained equal projected values.
    pub tied_projections: usize,
    /// Adjacent equal-value pairs summed over all projections.
    pub tied_pairs: usize,
    /// Scores below zero (returned as-is).
    pub negative_scores: usize,
    pub streamed: bool,
    pub projection_time: Duration,
    pub moment_time: Duration,
    pub total_time: Duration,
}

/// Result of scoring a point set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierScores {
    /// Variance estimate per point, index-aligned with the input.
    pub scores: Vec<f64>,
    /// Point indices, most anomalous first (per the configured rank order).
    pub ranked_index: Vec<usize>,
    /// Estimated mean angle per point.
    pub first_moment: Vec<f64>,
    /// Scaled second-moment term `f2_scaled` per point.
    pub second_moment: Vec<f64>,
    pub diagnostics: Diagnostics,
}

impl OutlierScores {
    /// The `k` highest-ranked point indices.
    pub fn top(&self, k: usize) -> &[usize] {
        &self.ranked_index[..k.min(self.ranked_index.len())]
    }
}

#[derive(Default)]
struct TieStats {
    projections: usize,
    pairs: usize,
}

impl TieStats {
    fn record(&mut self, projection: &Projection) {
        if projection.tied_pairs() > 0 {
            self.projections += 1;
            self.pairs += projection.tied_pairs();
        }
    }
}

struct Moments {
    first: Vec<f64>,
    sketch: Vec<f64>,
    ties: TieStats,
    projection_time: Duration,
    moment_time: Duration,
}

/// Sketch-based angle-variance outlier scorer.
#[derive(Debug, Clone)]
pub struct AngleVarianceEngine {
    config: EstimatorConfig,
}

impl AngleVarianceEngine {
    /// Create an engine. Parameter preconditions are checked here.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine from `.env` and `ANGLEVAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        let config = EstimatorConfig::from_env();
        config.log_summary();
        Self::new(config)
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Score `points` with Gaussian random projections.
    pub fn score(&self, points: &PointSet) -> Result<OutlierScores> {
        let seed = self.config.seed.unwrap_or_else(|| {
            let seed = rng::fresh_seed();
            debug!(seed, "No seed configured, drew a fresh one");
            seed
        });
        self.score_with(points, &GaussianProjector::new(seed), seed)
    }

    /// Score `points` with a caller-supplied projector. `seed` drives the sign draws.
    pub fn score_with<P: Projector>(
        &self,
        points: &PointSet,
        projector: &P,
        seed: u64,
    ) -> Result<OutlierScores> {
        let n = points.len();
        if n < 3 {
            return Err(AngleVarError::invalid(format!(
                "angle variance needs at least 3 points, got {n}"
            )));
        }

        if self.config.parallel && self.config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.worker_threads)
                .build()
                .map_err(|e| AngleVarError::ThreadPool(e.to_string()))?;
            pool.install(|| self.run(points, projector, seed))
        } else {
            self.run(points, projector, seed)
        }
    }

    fn run<P: Projector>(&self, points: &PointSet, projector: &P, seed: u64) -> Result<OutlierScores> {
        let start = Instant::now();
        let n = points.len();
        let t = self.config.projections;
        let plan = TrialPlan::new(self.config.inner_trials, self.config.outer_trials, seed)?
            .with_sketch_mode(self.config.sketch_mode);

        info!(
            points = n,
            dim = points.dim(),
            projections = t,
            passes = plan.passes(),
            sketch = %plan.sketch,
            streamed = self.config.stream_projections,
            "Scoring angle variance"
        );

        let moments = if self.config.stream_projections {
            self.streamed_moments(points, projector, &plan)?
        } else {
            self.materialized_moments(points, projector, &plan)?
        };

        if moments.ties.projections > 0 {
            warn!(
                tied_projections = moments.ties.projections,
                tied_pairs = moments.ties.pairs,
                "Equal projected values (duplicate points?); ties broken by point index"
            );
        }

        let second = scaled_second_moment(&moments.first, &moments.sketch, n, t)?;
        let scores = variance_from_moments(&moments.first, &second);
        let ranked_index = rank_scores(&scores, self.config.rank_order);

        let negative_scores = scores.iter().filter(|&&s| s < 0.0).count();
        if negative_scores > 0 {
            debug!(
                negative_scores,
                "Negative variance estimates returned unclamped"
            );
        }

        let total_time = start.elapsed();
        info!(
            "Angle variance done in {:.3}s (projections {:.3}s, moments {:.3}s)",
            total_time.as_secs_f64(),
            moments.projection_time.as_secs_f64(),
            moments.moment_time.as_secs_f64()
        );

        Ok(OutlierScores {
            scores,
            ranked_index,
            first_moment: moments.first,
            second_moment: second,
            diagnostics: Diagnostics {
                seed: plan.seed,
                projections: t,
                sketch_passes: plan.passes(),
                sketch_mode: plan.sketch,
                tied_projections: moments.ties.projections,
                tied_pairs: moments.ties.pairs,
                negative_scores,
                streamed: self.config.stream_projections,
                projection_time: moments.projection_time,
                moment_time: moments.moment_time,
                total_time,
            },
        })
    }

    fn materialized_moments<P: Projector>(
        &self,
        points: &PointSet,
        projector: &P,
        plan: &TrialPlan,
    ) -> Result<Moments> {
        let n = points.len();
        let t = self.config.projections;
        let parallel = self.config.parallel;

        let proj_start = Instant::now();
        let projections = if parallel {
            projector.project_parallel(points, t)?
        } else {
            projector.project(points, t)?
        };
        let mut ties = TieStats::default();
        for (index, p) in projections.iter().enumerate() {
            check_projection(index, p, n)?;
            ties.record(p);
        }
        let projection_time = proj_start.elapsed();
        debug!("  {} projections built in {:.3}s", t, projection_time.as_secs_f64());

        let moment_start = Instant::now();
        let first = first_moment(&projections, n, parallel)?;
        let sketch = second_moment(&projections, n, plan, self.config.trial_combine, parallel)?;
        let moment_time = moment_start.elapsed();

        Ok(Moments {
            first,
            sketch,
            ties,
            projection_time,
            moment_time,
        })
    }

    fn streamed_moments<P: Projector>(
        &self,
        points: &PointSet,
        projector: &P,
        plan: &TrialPlan,
    ) -> Result<Moments> {
        let n = points.len();
        let t = self.config.projections;
        let parallel = self.config.parallel;

        let mut first = FirstMomentAccumulator::new(n);
        let mut sketches: Vec<(SignPair, SketchAccumulator)> = (0..plan.passes())
            .map(|pass| (plan.signs(pass, n), SketchAccumulator::new(n)))
            .collect();
        let mut ties = TieStats::default();
        let mut projection_time = Duration::ZERO;
        let mut moment_time = Duration::ZERO;

        for index in 0..t {
            let proj_start = Instant::now();
            let projection = projector.projection(points, index)?;
            check_projection(index, &projection, n)?;
            ties.record(&projection);
            projection_time += proj_start.elapsed();

            let moment_start = Instant::now();
            first.add(&projection);
            if parallel {
                sketches
                    .par_iter_mut()
                    .for_each(|(signs, acc)| acc.add(&projection, signs));
            } else {
                for (signs, acc) in &mut sketches {
                    acc.add(&projection, signs);
                }
            }
            moment_time += moment_start.elapsed();
        }

        let moment_start = Instant::now();
        let passes: Vec<Vec<f64>> = sketches.iter().map(|(_, acc)| acc.estimate(plan.sketch)).collect();
        let matrix = TrialMatrix::from_passes(passes, plan.inner)?;
        let sketch = matrix.combine(self.config.trial_combine);
        let first = first.finish()?;
        moment_time += moment_start.elapsed();

        Ok(Moments {
            first,
            sketch,
            ties,
            projection_time,
            moment_time,
        })
    }
}

/// Score `points` with `t` projections and `s1 × s2` sketch passes under a fresh seed.
///
/// Returns scores (index-aligned with `points`) and point indices ordered
/// from the largest variance estimate to the smallest.
pub fn score_outliers(
    points: &PointSet,
    t: usize,
    s1: usize,
    s2: usize,
) -> Result<(Vec<f64>, Vec<usize>)> {
    score_outliers_seeded(points, t, s1, s2, rng::fresh_seed())
}

/// Deterministic variant of [`score_outliers`].
pub fn score_outliers_seeded(
    points: &PointSet,
    t: usize,
    s1: usize,
    s2: usize,
    seed: u64,
) -> Result<(Vec<f64>, Vec<usize>)> {
    let engine = AngleVarianceEngine::new(EstimatorConfig::new(t, s1, s2).with_seed(seed))?;
    let result = engine.score(points)?;
    Ok((result.scores, result.ranked_index))
}
