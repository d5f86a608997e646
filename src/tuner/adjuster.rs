//! Threshold adjustment with oscillation damping.
//!
//! The adjuster owns one [`TuningState`] per guardrail and turns the
//! analyzer's direction into a bounded threshold move.
//!
//! # State machine
//!
//! ```text
//! ACTIVE ──(move applied)──▶ ACTIVE
//!   │
//!   ├──(targets achieved)────▶ CONVERGED
//!   ├──(oscillation limit)───▶ CONVERGED
//!   └──(pinned at a bound)───▶ CONVERGED   (terminal)
//! ```
//!
//! Each direction reversal halves the step for that guardrail:
//! `step = max(min_step_size, step_size / 2^oscillation_count)`.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::analyzer::MetricsAnalyzer;
use super::config::FeedbackLoopConfig;
use super::types::{
    round_threshold, AdjustmentOutcome, GuardrailKey, GuardrailMetrics, StopReason,
    ThresholdAdjustment, TuningDirection, TuningState,
};
use crate::error::{TunerError, TunerResult};
use crate::evaluator::MetricsReport;

/// Two thresholds closer than this are the same three-decimal value.
const THRESHOLD_EPSILON: f64 = 1e-9;

// ============================================================================
// Round Plan
// ============================================================================

/// Decisions taken for every guardrail in one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundPlan {
    /// Round number (1-based)
    pub round: u32,
    /// Threshold moves to write into the working configuration
    pub applied: Vec<ThresholdAdjustment>,
    /// Guardrails that converged this round
    pub converged: Vec<(GuardrailKey, StopReason)>,
    /// Active guardrails with no metrics in this round's report
    pub skipped: Vec<GuardrailKey>,
}

impl RoundPlan {
    fn new(round: u32) -> Self {
        Self {
            round,
            ..Default::default()
        }
    }

    /// Whether any threshold moved this round.
    pub fn has_adjustments(&self) -> bool {
        !self.applied.is_empty()
    }
}

// ============================================================================
// Threshold Adjuster
// ============================================================================

/// Adjusts thresholds with oscillation prevention.
#[derive(Debug, Clone)]
pub struct ThresholdAdjuster {
    config: FeedbackLoopConfig,
    analyzer: MetricsAnalyzer,
    states: BTreeMap<GuardrailKey, TuningState>,
}

impl ThresholdAdjuster {
    /// Create an adjuster with no guardrail states.
    pub fn new(config: FeedbackLoopConfig) -> Self {
        let analyzer = MetricsAnalyzer::new(config.targets.clone());
        Self {
            config,
            analyzer,
            states: BTreeMap::new(),
        }
    }

    /// Loop configuration in use.
    pub fn config(&self) -> &FeedbackLoopConfig {
        &self.config
    }

    /// Analyzer built from the configured targets.
    pub fn analyzer(&self) -> &MetricsAnalyzer {
        &self.analyzer
    }

    /// Get the state for a guardrail, creating it at `threshold` if needed.
    ///
    /// A configured threshold outside `[min_threshold, max_threshold]` is
    /// clamped into range; `initial_threshold` keeps the configured value.
    pub fn get_or_create_state(&mut self, key: GuardrailKey, threshold: f64) -> &mut TuningState {
        let (min, max) = (self.config.min_threshold, self.config.max_threshold);
        self.states.entry(key).or_insert_with_key(|key| {
            let start = threshold.max(min).min(max);
            if (start - threshold).abs() > THRESHOLD_EPSILON || threshold.is_nan() {
                warn!(
                    stage = %key.stage,
                    guardrail = %key.name,
                    configured = threshold,
                    clamped = start,
                    "Configured threshold outside tuning bounds, clamping"
                );
            }
            TuningState::new(key.clone(), threshold, start)
        })
    }

    /// Get state for a guardrail if it exists.
    pub fn state(&self, key: &GuardrailKey) -> Option<&TuningState> {
        self.states.get(key)
    }

    /// All states in key order.
    pub fn states(&self) -> impl Iterator<Item = &TuningState> {
        self.states.values()
    }

    /// Whether every known guardrail has converged.
    pub fn all_converged(&self) -> bool {
        self.states.values().all(TuningState::is_converged)
    }

    /// Step used after `oscillation_count` direction reversals.
    pub fn effective_step(&self, oscillation_count: u32) -> f64 {
        effective_step(&self.config, oscillation_count)
    }

    /// Calculate (and apply to `state`) the adjustment for one round.
    pub fn calculate_adjustment(
        &self,
        state: &mut TuningState,
        metrics: &GuardrailMetrics,
        round: u32,
    ) -> AdjustmentOutcome {
        decide(&self.config, &self.analyzer, state, metrics, round)
    }

    /// Keyed form of [`calculate_adjustment`](Self::calculate_adjustment).
    pub fn adjust(
        &mut self,
        key: &GuardrailKey,
        metrics: &GuardrailMetrics,
        round: u32,
    ) -> TunerResult<AdjustmentOutcome> {
        let Self {
            config,
            analyzer,
            states,
        } = self;
        let state = states.get_mut(key).ok_or_else(|| unknown(key))?;
        Ok(decide(config, analyzer, state, metrics, round))
    }

    /// Check if a guardrail should keep tuning.
    ///
    /// Guardrails without state yet are treated as active.
    pub fn should_continue_tuning(&self, key: &GuardrailKey) -> bool {
        self.states
            .get(key)
            .map(|state| !state.is_converged())
            .unwrap_or(true)
    }

    /// Record an observation without touching the threshold.
    pub fn update_metrics(
        &mut self,
        key: &GuardrailKey,
        metrics: GuardrailMetrics,
    ) -> TunerResult<()> {
        let state = self.states.get_mut(key).ok_or_else(|| unknown(key))?;
        state.metrics_history.push(metrics);
        Ok(())
    }

    /// Decide every active guardrail's move for one round.
    ///
    /// Pure with respect to the outside world: only the adjuster's own
    /// states change. Guardrails missing from `report` are skipped.
    pub fn plan_round(&mut self, report: &MetricsReport, round: u32) -> RoundPlan {
        let mut plan = RoundPlan::new(round);
        let Self {
            config,
            analyzer,
            states,
        } = self;

        for (key, state) in states.iter_mut() {
            if let Some(reason) = state.stop_reason() {
                debug!(
                    stage = %key.stage,
                    guardrail = %key.name,
                    reason = %reason,
                    "Skipping converged guardrail"
                );
                continue;
            }

            let Some(metrics) = report.get(key) else {
                warn!(
                    stage = %key.stage,
                    guardrail = %key.name,
                    round,
                    "No metrics found, skipping"
                );
                plan.skipped.push(key.clone());
                continue;
            };

            let gaps = analyzer.calculate_gaps(metrics);
            info!(
                stage = %key.stage,
                guardrail = %key.name,
                round,
                precision = metrics.precision,
                recall = metrics.recall,
                f1 = metrics.f1_score,
                precision_gap = gaps.precision_gap,
                recall_gap = gaps.recall_gap,
                "Current metrics"
            );

            match decide(config, analyzer, state, metrics, round) {
                AdjustmentOutcome::Applied(adjustment) => {
                    info!(
                        stage = %key.stage,
                        guardrail = %key.name,
                        old = adjustment.old_threshold,
                        new = adjustment.new_threshold,
                        reason = %adjustment.reason,
                        "Threshold adjusted"
                    );
                    plan.applied.push(adjustment);
                }
                AdjustmentOutcome::Converged { reason, threshold } => {
                    info!(
                        stage = %key.stage,
                        guardrail = %key.name,
                        threshold,
                        reason = %reason,
                        "Guardrail converged"
                    );
                    plan.converged.push((key.clone(), reason));
                }
            }
        }

        plan
    }

    /// Consume the adjuster, yielding its states in key order.
    pub fn into_states(self) -> impl Iterator<Item = TuningState> {
        self.states.into_values()
    }
}

fn effective_step(config: &FeedbackLoopConfig, oscillation_count: u32) -> f64 {
    let damped = config.step_size / 2f64.powi(oscillation_count.min(i32::MAX as u32) as i32);
    damped.max(config.min_step_size)
}

fn unknown(key: &GuardrailKey) -> TunerError {
    TunerError::UnknownGuardrail {
        key: key.to_string(),
    }
}

/// The per-guardrail control step.
fn decide(
    config: &FeedbackLoopConfig,
    analyzer: &MetricsAnalyzer,
    state: &mut TuningState,
    metrics: &GuardrailMetrics,
    round: u32,
) -> AdjustmentOutcome {
    if let Some(reason) = state.stop_reason() {
        return AdjustmentOutcome::Converged {
            reason,
            threshold: state.current_threshold,
        };
    }

    let direction = analyzer.determine_direction(metrics);

    if direction == TuningDirection::Stable {
        return converge(state, StopReason::TargetsAchieved);
    }

    if let Some(last) = state.last_direction {
        if last != direction {
            state.oscillation_count += 1;
            info!(
                stage = %state.key.stage,
                guardrail = %state.key.name,
                from = %last,
                to = %direction,
                count = state.oscillation_count,
                "Oscillation detected"
            );

            if state.oscillation_count >= config.oscillation_limit {
                return converge(
                    state,
                    StopReason::OscillationLimit {
                        limit: config.oscillation_limit,
                    },
                );
            }
        }
    }

    let step = effective_step(config, state.oscillation_count);
    let targets = analyzer.targets();

    let (raw, mut reason) = match direction {
        TuningDirection::Increase => (
            (state.current_threshold + step).min(config.max_threshold),
            format!(
                "Precision below target ({:.3} < {:.3}), increasing threshold by {:.3}",
                metrics.precision, targets.precision_target, step
            ),
        ),
        _ => (
            (state.current_threshold - step).max(config.min_threshold),
            format!(
                "Recall below target ({:.3} < {:.3}), decreasing threshold by {:.3}",
                metrics.recall, targets.recall_target, step
            ),
        ),
    };
    let new_threshold = round_threshold(raw);

    let gaps = analyzer.calculate_gaps(metrics);
    if !gaps.precision_achieved && !gaps.recall_achieved {
        reason.push_str(&format!(" (both below target, {} priority)", targets.priority));
    }

    if (new_threshold - state.current_threshold).abs() < THRESHOLD_EPSILON {
        return converge(state, StopReason::BoundsLimit);
    }

    let adjustment = ThresholdAdjustment {
        key: state.key.clone(),
        old_threshold: state.current_threshold,
        new_threshold,
        direction,
        reason,
        round,
    };

    state.threshold_history.push(state.current_threshold);
    state.metrics_history.push(metrics.clone());
    state.adjustments.push(adjustment.clone());
    state.current_threshold = new_threshold;
    state.last_direction = Some(direction);

    AdjustmentOutcome::Applied(adjustment)
}

fn converge(state: &mut TuningState, reason: StopReason) -> AdjustmentOutcome {
    state.mark_converged(reason);
    AdjustmentOutcome::Converged {
        reason,
        threshold: state.current_threshold,
    }
}
