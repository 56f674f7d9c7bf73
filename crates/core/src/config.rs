use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AngleVarError, Result};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

pub const DEFAULT_PROJECTIONS: usize = 128;
pub const DEFAULT_INNER_TRIALS: usize = 16;
pub const DEFAULT_OUTER_TRIALS: usize = 5;

// ── Combination / ordering modes ──────────────────────────────

/// How the `s2` outer trial rows are reduced to one second-moment vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialCombine {
    /// Arithmetic mean of the trial rows.
    #[default]
    Mean,
    /// Per-point median of the trial rows (median-of-means).
    Median,
}

impl FromStr for TrialCombine {
    type Err = AngleVarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            other => Err(AngleVarError::invalid(format!("unknown trial combine mode: {other}"))),
        }
    }
}

impl fmt::Display for TrialCombine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Median => write!(f, "median"),
        }
    }
}

/// What one sign-sketch pass contributes to the trial average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SketchMode {
    /// The accumulated `Σ amsl·amsr` as-is.
    #[default]
    Raw,
    /// The square of the accumulated value, an estimate of `Σ_ab C_p[a][b]²`.
    Squared,
}

impl FromStr for SketchMode {
    type Err = AngleVarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "squared" | "frobenius" => Ok(Self::Squared),
            other => Err(AngleVarError::invalid(format!("unknown sketch mode: {other}"))),
        }
    }
}

impl fmt::Display for SketchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Squared => write!(f, "squared"),
        }
    }
}

/// Direction of the returned ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrder {
    /// Largest estimated variance first.
    #[default]
    Highest,
    /// Smallest estimated variance first.
    Lowest,
}

impl FromStr for RankOrder {
    type Err = AngleVarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "desc" | "descending" => Ok(Self::Highest),
            "lowest" | "asc" | "ascending" => Ok(Self::Lowest),
            other => Err(AngleVarError::invalid(format!("unknown rank order: {other}"))),
        }
    }
}

impl fmt::Display for RankOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highest => write!(f, "highest"),
            Self::Lowest => write!(f, "lowest"),
        }
    }
}

// ── Estimator config ──────────────────────────────────────────

/// Tuning knobs for one angle-variance scoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    /// Number of random projections (`t`).
    pub projections: usize,
    /// Sketch passes averaged into one trial (`s1`).
    pub inner_trials: usize,
    /// Trials combined into the final second moment (`s2`).
    pub outer_trials: usize,
    /// Fixed seed for projections and sign draws. `None` draws a fresh one per run.
    pub seed: Option<u64>,
    #[serde(default)]
    pub sketch_mode: SketchMode,
    #[serde(default)]
    pub trial_combine: TrialCombine,
    #[serde(default)]
    pub rank_order: RankOrder,
    /// Run stages on rayon workers.
    pub parallel: bool,
    /// Dedicated worker pool size. 0 = rayon's global pool.
    pub worker_threads: usize,
    /// Build projections one at a time instead of materializing all `t`.
    pub stream_projections: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            projections: DEFAULT_PROJECTIONS,
            inner_trials: DEFAULT_INNER_TRIALS,
            outer_trials: DEFAULT_OUTER_TRIALS,
            seed: None,
            sketch_mode: SketchMode::Raw,
            trial_combine: TrialCombine::Mean,
            rank_order: RankOrder::Highest,
            parallel: true,
            worker_threads: 0,
            stream_projections: false,
        }
    }
}

impl EstimatorConfig {
    /// Config with the given `t`, `s1`, `s2` and defaults elsewhere.
    pub fn new(projections: usize, inner_trials: usize, outer_trials: usize) -> Self {
        Self {
            projections,
            inner_trials,
            outer_trials,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sketch_mode(mut self, mode: SketchMode) -> Self {
        self.sketch_mode = mode;
        self
    }

    pub fn with_trial_combine(mut self, mode: TrialCombine) -> Self {
        self.trial_combine = mode;
        self
    }

    pub fn with_rank_order(mut self, order: RankOrder) -> Self {
        self.rank_order = order;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_streamed_projections(mut self, stream: bool) -> Self {
        self.stream_projections = stream;
        self
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ANGLEVAR_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ANGLEVAR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    ///
    /// Unparseable values fall back to their defaults.
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let defaults = Self::default();
        Self {
            profile: p.to_string(),
            projections: profiled_env_parse(p, "ANGLEVAR_PROJECTIONS", defaults.projections),
            inner_trials: profiled_env_parse(p, "ANGLEVAR_INNER_TRIALS", defaults.inner_trials),
            outer_trials: profiled_env_parse(p, "ANGLEVAR_OUTER_TRIALS", defaults.outer_trials),
            seed: profiled_env_opt(p, "ANGLEVAR_SEED").and_then(|v| v.trim().parse().ok()),
            sketch_mode: profiled_env_parse(p, "ANGLEVAR_SKETCH_MODE", defaults.sketch_mode),
            trial_combine: profiled_env_parse(p, "ANGLEVAR_TRIAL_COMBINE", defaults.trial_combine),
            rank_order: profiled_env_parse(p, "ANGLEVAR_RANK_ORDER", defaults.rank_order),
            parallel: profiled_env_bool(p, "ANGLEVAR_PARALLEL", defaults.parallel),
            worker_threads: profiled_env_parse(p, "ANGLEVAR_WORKER_THREADS", defaults.worker_threads),
            stream_projections: profiled_env_bool(
                p,
                "ANGLEVAR_STREAM_PROJECTIONS",
                defaults.stream_projections,
            ),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Check the parameter preconditions that do not depend on the input.
    pub fn validate(&self) -> Result<()> {
        if self.projections < 2 {
            return Err(AngleVarError::invalid(format!(
                "number of projections must be at least 2, got {}",
                self.projections
            )));
        }
        if self.inner_trials < 1 {
            return Err(AngleVarError::invalid("inner trial count (s1) must be at least 1"));
        }
        if self.outer_trials < 1 {
            return Err(AngleVarError::invalid("outer trial count (s2) must be at least 1"));
        }
        Ok(())
    }

    /// Total number of sign-sketch passes per run (`s1 × s2`).
    pub fn sketch_passes(&self) -> usize {
        self.inner_trials * self.outer_trials
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Estimator config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  sketch:      t={}, s1={}, s2={}, mode={}, combine={}",
            self.projections,
            self.inner_trials,
            self.outer_trials,
            self.sketch_mode,
            self.trial_combine
        );
        tracing::info!(
            "  seed:        {}",
            self.seed.map(|s| s.to_string()).as_deref().unwrap_or("(random)")
        );
        tracing::info!("  ranking:     {}", self.rank_order);
        tracing::info!(
            "  execution:   parallel={}, workers={}, streamed={}",
            self.parallel,
            self.worker_threads,
            self.stream_projections
        );
    }

    /// JSON view of the config for reports.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "sketch": {
                "projections": self.projections,
                "inner_trials": self.inner_trials,
                "outer_trials": self.outer_trials,
                "mode": self.sketch_mode,
                "combine": self.trial_combine,
            },
            "seed": self.seed,
            "rank_order": self.rank_order,
            "execution": {
                "parallel": self.parallel,
                "worker_threads": self.worker_threads,
                "stream_projections": self.stream_projections,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never observe
    // each other's variables.

    #[test]
    fn defaults_validate() {
        let config = EstimatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sketch_mode, SketchMode::Raw);
        assert_eq!(config.sketch_passes(), DEFAULT_INNER_TRIALS * DEFAULT_OUTER_TRIALS);
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(EstimatorConfig::new(1, 1, 1).validate().is_err());
        assert!(EstimatorConfig::new(2, 0, 1).validate().is_err());
        assert!(EstimatorConfig::new(2, 1, 0).validate().is_err());
        assert!(EstimatorConfig::new(2, 1, 1).validate().is_ok());
    }

    #[test]
    fn profile_overrides_and_falls_back() {
        env::set_var("CFGTESTA_ANGLEVAR_PROJECTIONS", "300");
        env::set_var("CFGTESTA_ANGLEVAR_SEED", "42");
        env::set_var("CFGTESTA_ANGLEVAR_TRIAL_COMBINE", "median");
        env::set_var("CFGTESTA_ANGLEVAR_RANK_ORDER", "lowest");
        env::set_var("CFGTESTA_ANGLEVAR_PARALLEL", "off");
        env::set_var("CFGTESTA_ANGLEVAR_SKETCH_MODE", "squared");

        let config = EstimatorConfig::for_profile("cfgtesta");
        assert_eq!(config.profile, "CFGTESTA");
        assert_eq!(config.projections, 300);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.trial_combine, TrialCombine::Median);
        assert_eq!(config.rank_order, RankOrder::Lowest);
        assert!(!config.parallel);
        assert_eq!(config.sketch_mode, SketchMode::Squared);
        assert_eq!(config.outer_trials, profiled_env_parse("", "ANGLEVAR_OUTER_TRIALS", DEFAULT_OUTER_TRIALS));
    }

    #[test]
    fn unparseable_values_use_defaults() {
        env::set_var("CFGTESTB_ANGLEVAR_PROJECTIONS", "many");
        env::set_var("CFGTESTB_ANGLEVAR_TRIAL_COMBINE", "mode");
        env::set_var("CFGTESTB_ANGLEVAR_STREAM_PROJECTIONS", "maybe");

        let config = EstimatorConfig::for_profile("CFGTESTB");
        let fallback = EstimatorConfig::for_profile("");
        assert_eq!(config.projections, fallback.projections);
        assert_eq!(config.trial_combine, fallback.trial_combine);
        assert_eq!(config.stream_projections, fallback.stream_projections);
    }

    #[test]
    fn modes_parse() {
        assert_eq!("Mean".parse::<TrialCombine>().unwrap(), TrialCombine::Mean);
        assert!("avg".parse::<TrialCombine>().is_err());
        assert_eq!("descending".parse::<RankOrder>().unwrap(), RankOrder::Highest);
        assert_eq!("asc".parse::<RankOrder>().unwrap(), RankOrder::Lowest);
        assert_eq!("RAW".parse::<SketchMode>().unwrap(), SketchMode::Raw);
        assert_eq!("frobenius".parse::<SketchMode>().unwrap(), SketchMode::Squared);
        assert!("cubed".parse::<SketchMode>().is_err());
    }

    #[test]
    fn summary_reports_sketch_shape() {
        let config = EstimatorConfig::new(64, 4, 3).with_seed(7);
        let summary = config.summary();
        assert_eq!(summary["sketch"]["projections"], 64);
        assert_eq!(summary["sketch"]["combine"], "mean");
        assert_eq!(summary["sketch"]["mode"], "raw");
        assert_eq!(summary["seed"], 7);
        assert_eq!(summary["rank_order"], "highest");
    }
}
