pub mod combine;
pub mod engine;
pub mod moments;
pub mod projection;
pub mod rng;

pub use combine::{combine_scores, rank_scores};
pub use engine::{score_outliers, score_outliers_seeded, AngleVarianceEngine, Diagnostics, OutlierScores};
pub use moments::{first_moment, second_moment, sign_sketch_pass, SignPair, SignVector, TrialPlan};
pub use projection::{GaussianProjector, PrecomputedProjections, Projection, Projector};
