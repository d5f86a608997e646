//! Core types for the threshold tuner.
//!
//! This module defines the data shared by every part of the loop:
//! - [`GuardrailKey`]: structured (stage, name) identity of a guardrail
//! - [`GuardrailMetrics`]: one evaluation snapshot for one guardrail
//! - [`TuningState`]: mutable per-guardrail controller state
//! - [`AdjustmentOutcome`]: what the adjuster decided for one round
//! - [`TuningResult`]: read-only summary produced when the loop ends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Pipeline stage a guardrail runs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Checks applied to user input
    Input,
    /// Checks applied to model output
    Output,
    /// Checks applied before the request is dispatched
    PreFlight,
}

impl Stage {
    /// All stages in the order they appear in a configuration document.
    pub const ALL: [Stage; 3] = [Stage::Input, Stage::Output, Stage::PreFlight];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Output => "output",
            Stage::PreFlight => "pre_flight",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "input" => Ok(Stage::Input),
            "output" => Ok(Stage::Output),
            "pre_flight" => Ok(Stage::PreFlight),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Unique identity of a tunable guardrail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuardrailKey {
    /// Stage the guardrail belongs to
    pub stage: Stage,
    /// Guardrail name as it appears in the configuration
    pub name: String,
}

impl GuardrailKey {
    /// Create a new key.
    pub fn new(stage: Stage, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for GuardrailKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.stage, self.name)
    }
}

/// Unique identifier for one tuning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RunId(pub String);

impl RunId {
    /// Create a new unique run ID.
    pub fn new() -> Self {
        Self(format!("tune_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Direction, Priority and Stop Reasons
// ============================================================================

/// Direction to move a threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TuningDirection {
    /// Raise the threshold (trades recall for precision)
    Increase,
    /// Lower the threshold (trades precision for recall)
    Decrease,
    /// Both targets achieved, leave the threshold alone
    Stable,
}

impl TuningDirection {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningDirection::Increase => "increase",
            TuningDirection::Decrease => "decrease",
            TuningDirection::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TuningDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which metric wins when both are below target.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Favour precision: raise the threshold
    Precision,
    /// Favour recall: lower the threshold
    Recall,
    /// Follow whichever gap is larger
    #[default]
    F1,
}

impl Priority {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Precision => "precision",
            Priority::Recall => "recall",
            Priority::F1 => "f1",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "precision" => Ok(Priority::Precision),
            "recall" => Ok(Priority::Recall),
            "f1" => Ok(Priority::F1),
            _ => Err(format!("Unknown priority: {} (expected precision, recall or f1)", s)),
        }
    }
}

/// Why tuning stopped for a guardrail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopReason {
    /// Precision and recall are both within tolerance of their targets
    TargetsAchieved,
    /// Direction reversed too many times
    OscillationLimit {
        /// Configured oscillation limit
        limit: u32,
    },
    /// The threshold is pinned at a bound and cannot move further
    BoundsLimit,
    /// The iteration budget ran out before convergence
    MaxIterations,
    /// The wall-clock budget ran out before convergence
    TimeBudgetExhausted,
}

impl StopReason {
    /// Whether this reason marks a converged controller (as opposed to a
    /// loop that simply ran out of budget).
    pub fn is_convergence(&self) -> bool {
        matches!(
            self,
            StopReason::TargetsAchieved
                | StopReason::OscillationLimit { .. }
                | StopReason::BoundsLimit
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetsAchieved => write!(f, "Targets achieved"),
            StopReason::OscillationLimit { limit } => {
                write!(f, "Oscillation limit reached ({})", limit)
            }
            StopReason::BoundsLimit => write!(f, "Threshold at bounds limit"),
            StopReason::MaxIterations => write!(f, "Max iterations reached"),
            StopReason::TimeBudgetExhausted => write!(f, "Time budget exhausted"),
        }
    }
}

// ============================================================================
// Targets and Metrics
// ============================================================================

/// Target metrics for tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuningTarget {
    /// Precision to reach (0.0 - 1.0)
    pub precision_target: f64,
    /// Recall to reach (0.0 - 1.0)
    pub recall_target: f64,
    /// Tie-breaker when both metrics are short of target
    pub priority: Priority,
    /// Slack below a target that still counts as achieved
    pub tolerance: f64,
}

impl Default for TuningTarget {
    fn default() -> Self {
        Self {
            precision_target: 0.90,
            recall_target: 0.90,
            priority: Priority::F1,
            tolerance: 0.02,
        }
    }
}

/// Evaluation metrics for a single guardrail.
///
/// Evaluators may omit fields; anything missing deserializes to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardrailMetrics {
    /// TP / (TP + FP)
    pub precision: f64,
    /// TP / (TP + FN)
    pub recall: f64,
    /// Harmonic mean of precision and recall
    pub f1_score: f64,
    /// Correctly flagged samples
    pub true_positives: u64,
    /// Benign samples flagged
    pub false_positives: u64,
    /// Positive samples missed
    pub false_negatives: u64,
    /// Benign samples passed
    pub true_negatives: u64,
    /// Number of samples evaluated
    pub total_samples: u64,
}

impl GuardrailMetrics {
    /// Build a snapshot from raw confusion-matrix counts.
    pub fn from_counts(
        true_positives: u64,
        false_positives: u64,
        false_negatives: u64,
        true_negatives: u64,
    ) -> Self {
        let ratio = |num: u64, den: u64| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1_score,
            true_positives,
            false_positives,
            false_negatives,
            true_negatives,
            total_samples: true_positives + false_positives + false_negatives + true_negatives,
        }
    }

    /// Whether `total_samples` matches the confusion-matrix counts.
    pub fn is_consistent(&self) -> bool {
        self.total_samples
            == self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }
}

// ============================================================================
// Adjustments and State
// ============================================================================

/// Record of an applied threshold move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdAdjustment {
    /// Guardrail that moved
    pub key: GuardrailKey,
    /// Threshold before the move
    pub old_threshold: f64,
    /// Threshold after the move
    pub new_threshold: f64,
    /// Increase or Decrease
    pub direction: TuningDirection,
    /// Human-readable explanation
    pub reason: String,
    /// Round the move was decided in
    pub round: u32,
}

/// What the adjuster decided for one guardrail in one round.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    /// The threshold moved
    Applied(ThresholdAdjustment),
    /// The guardrail is converged; its threshold stays where it is
    Converged {
        /// Why tuning stopped
        reason: StopReason,
        /// The (unchanged) threshold
        threshold: f64,
    },
}

impl AdjustmentOutcome {
    /// The applied adjustment, if any.
    pub fn applied(&self) -> Option<&ThresholdAdjustment> {
        match self {
            AdjustmentOutcome::Applied(adj) => Some(adj),
            AdjustmentOutcome::Converged { .. } => None,
        }
    }
}

/// Mutable controller state for one guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningState {
    /// Guardrail this state belongs to
    pub key: GuardrailKey,
    /// Threshold currently written to the working configuration
    pub current_threshold: f64,
    /// Threshold found in the base configuration
    pub initial_threshold: f64,
    /// Thresholds that were replaced, oldest first
    pub threshold_history: Vec<f64>,
    /// Observed metrics, oldest first
    pub metrics_history: Vec<GuardrailMetrics>,
    /// Applied moves, oldest first
    pub adjustments: Vec<ThresholdAdjustment>,
    /// Number of direction reversals seen so far
    pub oscillation_count: u32,
    /// Direction of the last applied move
    pub last_direction: Option<TuningDirection>,
    converged: bool,
    stop_reason: Option<StopReason>,
}

impl TuningState {
    /// Create a fresh, active state.
    ///
    /// `initial_threshold` is the configured value; `current_threshold`
    /// is where tuning starts (the configured value clamped into bounds).
    pub fn new(key: GuardrailKey, initial_threshold: f64, current_threshold: f64) -> Self {
        Self {
            key,
            current_threshold,
            initial_threshold,
            threshold_history: Vec::new(),
            metrics_history: Vec::new(),
            adjustments: Vec::new(),
            oscillation_count: 0,
            last_direction: None,
            converged: false,
            stop_reason: None,
        }
    }

    /// Whether tuning has terminated for this guardrail.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Reason recorded when the state converged.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Mark the state converged. The first reason wins; later calls are
    /// ignored so that `converged` and `stop_reason` change exactly once.
    pub fn mark_converged(&mut self, reason: StopReason) {
        if self.converged {
            return;
        }
        self.converged = true;
        self.stop_reason = Some(reason);
    }

    /// Most recently observed metrics.
    pub fn latest_metrics(&self) -> Option<&GuardrailMetrics> {
        self.metrics_history.last()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Final result of tuning one guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    /// Guardrail the result describes
    pub key: GuardrailKey,
    /// Threshold in the base configuration
    pub initial_threshold: f64,
    /// Threshold in the tuned configuration
    pub final_threshold: f64,
    /// First recorded metrics (round 0)
    pub initial_metrics: Option<GuardrailMetrics>,
    /// Last recorded metrics
    pub final_metrics: Option<GuardrailMetrics>,
    /// Every applied move, oldest first
    pub adjustments: Vec<ThresholdAdjustment>,
    /// Whether the controller converged
    pub converged: bool,
    /// Why tuning stopped
    pub reason: StopReason,
    /// Number of applied adjustments
    pub iterations: usize,
    /// Whether the priority metric did not get worse (None without metrics)
    pub improved: Option<bool>,
}

impl TuningResult {
    /// Status label used in summaries.
    pub fn status(&self) -> &'static str {
        if self.converged {
            "CONVERGED"
        } else {
            "STOPPED"
        }
    }
}

/// Everything produced by one run of the feedback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningRun {
    /// Identifier of this run
    pub run_id: RunId,
    /// When the loop started
    pub started_at: DateTime<Utc>,
    /// When the loop finished
    pub finished_at: DateTime<Utc>,
    /// Targets the run tuned toward
    pub targets: TuningTarget,
    /// Rounds that applied at least one adjustment
    pub rounds_completed: u32,
    /// One result per tunable guardrail
    pub results: Vec<TuningResult>,
}

/// Round a threshold to the three decimals written to configuration.
///
/// Rounds the exact binary value, so `0.525 + 0.0125` (stored just below
/// 0.5375) becomes 0.537.
pub fn round_threshold(value: f64) -> f64 {
    format!("{value:.3}").parse().unwrap_or(value)
}
