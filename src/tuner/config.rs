//! Configuration for the feedback loop.
//!
//! Defaults match the values the loop is normally run with; every field
//! can be overridden from the environment (`TUNER_*`) and, for the common
//! ones, from the command line.

use std::time::Duration;

use super::types::{Priority, TuningTarget};
use crate::error::{TunerError, TunerResult};

/// Configuration for the feedback loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackLoopConfig {
    /// Maximum adjustment rounds after the initial evaluation
    pub max_iterations: u32,

    /// Initial threshold step
    pub step_size: f64,

    /// Floor for the damped step
    pub min_step_size: f64,

    /// Lowest threshold the tuner will write
    pub min_threshold: f64,

    /// Highest threshold the tuner will write
    pub max_threshold: f64,

    /// Direction reversals tolerated before a guardrail is frozen
    pub oscillation_limit: u32,

    /// Optional wall-clock budget for the whole run (seconds)
    pub time_budget_secs: Option<u64>,

    /// Precision/recall targets
    pub targets: TuningTarget,
}

impl Default for FeedbackLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            step_size: 0.05,
            min_step_size: 0.01,
            min_threshold: 0.1,
            max_threshold: 0.95,
            oscillation_limit: 3,
            time_budget_secs: None,
            targets: TuningTarget::default(),
        }
    }
}

impl FeedbackLoopConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_iterations: env_parse("TUNER_MAX_ITERATIONS").unwrap_or(defaults.max_iterations),
            step_size: env_parse("TUNER_STEP_SIZE").unwrap_or(defaults.step_size),
            min_step_size: env_parse("TUNER_MIN_STEP_SIZE").unwrap_or(defaults.min_step_size),
            min_threshold: env_parse("TUNER_MIN_THRESHOLD").unwrap_or(defaults.min_threshold),
            max_threshold: env_parse("TUNER_MAX_THRESHOLD").unwrap_or(defaults.max_threshold),
            oscillation_limit: env_parse("TUNER_OSCILLATION_LIMIT")
                .unwrap_or(defaults.oscillation_limit),
            time_budget_secs: env_parse("TUNER_TIME_BUDGET_SECS"),
            targets: TuningTarget {
                precision_target: env_parse("TUNER_PRECISION_TARGET")
                    .unwrap_or(defaults.targets.precision_target),
                recall_target: env_parse("TUNER_RECALL_TARGET")
                    .unwrap_or(defaults.targets.recall_target),
                priority: env_parse::<Priority>("TUNER_PRIORITY")
                    .unwrap_or(defaults.targets.priority),
                tolerance: env_parse("TUNER_TOLERANCE").unwrap_or(defaults.targets.tolerance),
            },
        }
    }

    /// Get the wall-clock budget as Duration.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    /// Reject configurations the controller cannot honour.
    pub fn validate(&self) -> TunerResult<()> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        if !is_positive(self.step_size) {
            return Err(invalid("step_size", "must be positive"));
        }
        if !is_positive(self.min_step_size) {
            return Err(invalid("min_step_size", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.min_threshold) || !(0.0..=1.0).contains(&self.max_threshold)
        {
            return Err(invalid("min_threshold/max_threshold", "must lie in [0, 1]"));
        }
        if self.min_threshold >= self.max_threshold {
            return Err(invalid(
                "min_threshold/max_threshold",
                "min_threshold must be below max_threshold",
            ));
        }
        if self.oscillation_limit == 0 {
            return Err(invalid("oscillation_limit", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.targets.precision_target) {
            return Err(invalid("precision_target", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.targets.recall_target) {
            return Err(invalid("recall_target", "must lie in [0, 1]"));
        }
        if !self.targets.tolerance.is_finite() || self.targets.tolerance < 0.0 {
            return Err(invalid("tolerance", "must be non-negative"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid(field: &str, reason: &str) -> TunerError {
    TunerError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
