//! Metrics analysis for the threshold tuner.
//!
//! The analyzer is a fixed decision table over precision/recall gaps. It
//! assumes raising a threshold never lowers precision and never raises
//! recall, which holds for confidence-scored classifiers.
//!
//! ```text
//! both achieved                         → Stable
//! precision short, recall within tol    → Increase
//! recall short, precision within tol    → Decrease
//! both short                            → priority (f1: larger gap, ties Increase)
//! ```

use serde::{Deserialize, Serialize};

use super::types::{GuardrailMetrics, Priority, TuningDirection, TuningTarget};

/// Distance of observed metrics from their targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricGaps {
    /// precision_target - precision
    pub precision_gap: f64,
    /// recall_target - recall
    pub recall_gap: f64,
    /// precision >= precision_target - tolerance
    pub precision_achieved: bool,
    /// recall >= recall_target - tolerance
    pub recall_achieved: bool,
}

/// Analyzes evaluation metrics and picks a tuning direction.
#[derive(Debug, Clone)]
pub struct MetricsAnalyzer {
    targets: TuningTarget,
}

impl MetricsAnalyzer {
    /// Create an analyzer for the given targets.
    pub fn new(targets: TuningTarget) -> Self {
        Self { targets }
    }

    /// Targets this analyzer measures against.
    pub fn targets(&self) -> &TuningTarget {
        &self.targets
    }

    /// Calculate the gap between current and target metrics.
    pub fn calculate_gaps(&self, metrics: &GuardrailMetrics) -> MetricGaps {
        let t = &self.targets;
        MetricGaps {
            precision_gap: t.precision_target - metrics.precision,
            recall_gap: t.recall_target - metrics.recall,
            precision_achieved: metrics.precision >= t.precision_target - t.tolerance,
            recall_achieved: metrics.recall >= t.recall_target - t.tolerance,
        }
    }

    /// Determine which direction to move the threshold.
    pub fn determine_direction(&self, metrics: &GuardrailMetrics) -> TuningDirection {
        let gaps = self.calculate_gaps(metrics);
        let tolerance = self.targets.tolerance;

        if gaps.precision_achieved && gaps.recall_achieved {
            return TuningDirection::Stable;
        }

        if gaps.precision_gap > tolerance && gaps.recall_gap <= tolerance {
            return TuningDirection::Increase;
        }

        if gaps.recall_gap > tolerance && gaps.precision_gap <= tolerance {
            return TuningDirection::Decrease;
        }

        match self.targets.priority {
            Priority::Precision => TuningDirection::Increase,
            Priority::Recall => TuningDirection::Decrease,
            // Equal gaps resolve to Increase.
            Priority::F1 => {
                if gaps.precision_gap >= gaps.recall_gap {
                    TuningDirection::Increase
                } else {
                    TuningDirection::Decrease
                }
            }
        }
    }

    /// Whether `new` is at least as good as `old` on the priority metric.
    pub fn metrics_improved(&self, old: &GuardrailMetrics, new: &GuardrailMetrics) -> bool {
        match self.targets.priority {
            Priority::Precision => new.precision >= old.precision,
            Priority::Recall => new.recall >= old.recall,
            Priority::F1 => new.f1_score >= old.f1_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(precision: f64, recall: f64) -> GuardrailMetrics {
        GuardrailMetrics {
            precision,
            recall,
            f1_score: if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            },
            ..Default::default()
        }
    }

    fn analyzer(priority: Priority) -> MetricsAnalyzer {
        MetricsAnalyzer::new(TuningTarget {
            precision_target: 0.90,
            recall_target: 0.90,
            priority,
            tolerance: 0.02,
        })
    }

    #[test]
    fn test_gaps() {
        let gaps = analyzer(Priority::F1).calculate_gaps(&metrics(0.80, 0.95));
        assert!((gaps.precision_gap - 0.10).abs() < 1e-9);
        assert!((gaps.recall_gap + 0.05).abs() < 1e-9);
        assert!(!gaps.precision_achieved);
        assert!(gaps.recall_achieved);
    }

    #[test]
    fn test_within_tolerance_counts_as_achieved() {
        let gaps = analyzer(Priority::F1).calculate_gaps(&metrics(0.885, 0.881));
        assert!(gaps.precision_achieved);
        assert!(gaps.recall_achieved);
    }

    #[test]
    fn test_out_of_range_metrics_are_accepted() {
        let gaps = analyzer(Priority::F1).calculate_gaps(&metrics(1.5, -0.2));
        assert!((gaps.precision_gap + 0.6).abs() < 1e-9);
        assert!((gaps.recall_gap - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_stable_when_both_achieved() {
        let direction = analyzer(Priority::F1).determine_direction(&metrics(0.92, 0.93));
        assert_eq!(direction, TuningDirection::Stable);
    }

    #[test]
    fn test_precision_short_increases() {
        let direction = analyzer(Priority::Recall).determine_direction(&metrics(0.80, 0.95));
        assert_eq!(direction, TuningDirection::Increase);
    }

    #[test]
    fn test_recall_short_decreases() {
        let direction = analyzer(Priority::Precision).determine_direction(&metrics(0.95, 0.70));
        assert_eq!(direction, TuningDirection::Decrease);
    }

    #[test]
    fn test_both_short_uses_priority() {
        let m = metrics(0.70, 0.80);
        assert_eq!(
            analyzer(Priority::Precision).determine_direction(&m),
            TuningDirection::Increase
        );
        assert_eq!(
            analyzer(Priority::Recall).determine_direction(&m),
            TuningDirection::Decrease
        );
        // Precision gap (0.20) beats recall gap (0.10)
        assert_eq!(
            analyzer(Priority::F1).determine_direction(&m),
            TuningDirection::Increase
        );
        assert_eq!(
            analyzer(Priority::F1).determine_direction(&metrics(0.80, 0.60)),
            TuningDirection::Decrease
        );
    }

    #[test]
    fn test_f1_tie_resolves_to_increase() {
        let direction = analyzer(Priority::F1).determine_direction(&metrics(0.75, 0.75));
        assert_eq!(direction, TuningDirection::Increase);
    }

    #[test]
    fn test_both_just_outside_tolerance_falls_to_priority() {
        // Precision misses by 0.03 (> tol), recall by 0.025 (> tol): both short
        let direction = analyzer(Priority::Recall).determine_direction(&metrics(0.87, 0.875));
        assert_eq!(direction, TuningDirection::Decrease);
    }

    #[test]
    fn test_metrics_improved_follows_priority() {
        let old = metrics(0.80, 0.90);
        let new = metrics(0.85, 0.85);

        assert!(analyzer(Priority::Precision).metrics_improved(&old, &new));
        assert!(!analyzer(Priority::Recall).metrics_improved(&old, &new));
        assert_eq!(
            analyzer(Priority::F1).metrics_improved(&old, &new),
            new.f1_score >= old.f1_score
        );
    }
}
