pub mod config;
pub mod error;
pub mod points;

pub use config::{EstimatorConfig, RankOrder, SketchMode, TrialCombine};
pub use error::*;
pub use points::PointSet;
