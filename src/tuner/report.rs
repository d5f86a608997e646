//! Human-readable output: the markdown tuning report and the console
//! summary printed by the CLI.

use std::fmt::Write;

use super::types::{GuardrailMetrics, TuningResult, TuningRun};

/// Render the markdown report for a finished run.
pub fn render_markdown(run: &TuningRun) -> String {
    let targets = &run.targets;
    let mut out = String::new();

    let _ = writeln!(out, "# Guardrail Tuning Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "Generated: {}", run.finished_at.to_rfc3339());
    let _ = writeln!(out);
    let _ = writeln!(out, "Run: {}", run.run_id);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Targets: precision={}, recall={}, priority={}",
        targets.precision_target, targets.recall_target, targets.priority
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Rounds with adjustments: {}", run.rounds_completed);
    let _ = writeln!(out);
    let _ = writeln!(out, "## Results");
    let _ = writeln!(out);

    if run.results.is_empty() {
        let _ = writeln!(out, "No guardrails with confidence_threshold found.");
        return out;
    }

    for result in &run.results {
        let _ = writeln!(out, "### {} ({})", result.key.name, result.key.stage);
        let _ = writeln!(out, "- **Status**: {} - {}", result.status(), result.reason);
        let _ = writeln!(
            out,
            "- **Threshold**: {:.3} -> {:.3}",
            result.initial_threshold, result.final_threshold
        );

        if let (Some(initial), Some(last)) = (&result.initial_metrics, &result.final_metrics) {
            for line in metric_lines(initial, last) {
                let _ = writeln!(out, "- {}", line);
            }
        }

        let _ = writeln!(out, "- **Iterations**: {}", result.iterations);
        if let Some(improved) = result.improved {
            let _ = writeln!(out, "- **Improved**: {}", if improved { "yes" } else { "no" });
        }

        if !result.adjustments.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "| Round | Old | New | Reason |");
            let _ = writeln!(out, "|-------|-----|-----|--------|");
            for adj in &result.adjustments {
                let _ = writeln!(
                    out,
                    "| {} | {:.3} | {:.3} | {} |",
                    adj.round, adj.old_threshold, adj.new_threshold, adj.reason
                );
            }
        }

        let _ = writeln!(out);
    }

    out
}

fn metric_lines(initial: &GuardrailMetrics, last: &GuardrailMetrics) -> [String; 3] {
    [
        format!(
            "**Precision**: {:.3} -> {:.3}{}",
            initial.precision,
            last.precision,
            delta_suffix(last.precision - initial.precision, "")
        ),
        format!(
            "**Recall**: {:.3} -> {:.3}{}",
            initial.recall,
            last.recall,
            delta_suffix(last.recall - initial.recall, "")
        ),
        format!(
            "**F1 Score**: {:.3} -> {:.3}{}",
            initial.f1_score,
            last.f1_score,
            delta_suffix(last.f1_score - initial.f1_score, " F1")
        ),
    ]
}

fn delta_suffix(delta: f64, label: &str) -> String {
    if delta > 0.0 {
        format!(" (+{:.3}{})", delta, label)
    } else if delta < 0.0 {
        format!(" ({:.3}{})", delta, label)
    } else {
        String::new()
    }
}

/// Render the per-guardrail summary printed to stdout.
pub fn render_summary(results: &[TuningResult]) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "TUNING COMPLETE");
    let _ = writeln!(out, "{}", rule);

    if results.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No guardrails with confidence_threshold found in config.");
        return out;
    }

    for result in results {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({}):", result.key.name, result.key.stage);
        let _ = writeln!(out, "  Status: {} - {}", result.status(), result.reason);
        let _ = writeln!(
            out,
            "  Threshold: {:.3} -> {:.3}",
            result.initial_threshold, result.final_threshold
        );
        if let (Some(initial), Some(last)) = (&result.initial_metrics, &result.final_metrics) {
            let _ = writeln!(
                out,
                "  Precision: {:.3} -> {:.3}",
                initial.precision, last.precision
            );
            let _ = writeln!(out, "  Recall: {:.3} -> {:.3}", initial.recall, last.recall);
            let _ = writeln!(out, "  F1: {:.3} -> {:.3}", initial.f1_score, last.f1_score);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::types::{
        GuardrailKey, RunId, Stage, StopReason, ThresholdAdjustment, TuningDirection,
        TuningTarget,
    };
    use chrono::Utc;

    fn metrics(precision: f64, recall: f64, f1_score: f64) -> GuardrailMetrics {
        GuardrailMetrics {
            precision,
            recall,
            f1_score,
            ..Default::default()
        }
    }

    fn result() -> TuningResult {
        let key = GuardrailKey::new(Stage::Input, "Jailbreak");
        TuningResult {
            key: key.clone(),
            initial_threshold: 0.7,
            final_threshold: 0.75,
            initial_metrics: Some(metrics(0.80, 0.95, 0.869)),
            final_metrics: Some(metrics(0.91, 0.92, 0.915)),
            adjustments: vec![ThresholdAdjustment {
                key,
                old_threshold: 0.7,
                new_threshold: 0.75,
                direction: TuningDirection::Increase,
                reason: "Precision below target (0.800 < 0.900), increasing threshold by 0.050"
                    .to_string(),
                round: 1,
            }],
            converged: true,
            reason: StopReason::TargetsAchieved,
            iterations: 1,
            improved: Some(true),
        }
    }

    fn run(results: Vec<TuningResult>) -> TuningRun {
        TuningRun {
            run_id: RunId("tune_test".to_string()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            targets: TuningTarget::default(),
            rounds_completed: 1,
            results,
        }
    }

    #[test]
    fn test_markdown_report_contents() {
        let report = render_markdown(&run(vec![result()]));

        assert!(report.starts_with("# Guardrail Tuning Report"));
        assert!(report.contains("Targets: precision=0.9, recall=0.9, priority=f1"));
        assert!(report.contains("### Jailbreak (input)"));
        assert!(report.contains("- **Status**: CONVERGED - Targets achieved"));
        assert!(report.contains("- **Threshold**: 0.700 -> 0.750"));
        assert!(report.contains("- **Precision**: 0.800 -> 0.910 (+0.110)"));
        assert!(report.contains("- **Recall**: 0.950 -> 0.920 (-0.030)"));
        assert!(report.contains("- **F1 Score**: 0.869 -> 0.915 (+0.046 F1)"));
        assert!(report.contains("- **Iterations**: 1"));
        assert!(report.contains("| 1 | 0.700 | 0.750 | Precision below target"));
    }

    #[test]
    fn test_markdown_report_without_metrics() {
        let mut stopped = result();
        stopped.initial_metrics = None;
        stopped.final_metrics = None;
        stopped.converged = false;
        stopped.reason = StopReason::MaxIterations;
        stopped.improved = None;

        let report = render_markdown(&run(vec![stopped]));

        assert!(report.contains("- **Status**: STOPPED - Max iterations reached"));
        assert!(!report.contains("**Precision**"));
        assert!(!report.contains("**Improved**"));
    }

    #[test]
    fn test_empty_run() {
        let report = render_markdown(&run(Vec::new()));
        assert!(report.contains("No guardrails with confidence_threshold found."));

        let summary = render_summary(&[]);
        assert!(summary.contains("TUNING COMPLETE"));
        assert!(summary.contains("No guardrails with confidence_threshold found in config."));
    }

    #[test]
    fn test_console_summary() {
        let summary = render_summary(&[result()]);

        assert!(summary.contains("Jailbreak (input):"));
        assert!(summary.contains("  Status: CONVERGED - Targets achieved"));
        assert!(summary.contains("  Threshold: 0.700 -> 0.750"));
        assert!(summary.contains("  F1: 0.869 -> 0.915"));
    }
}
