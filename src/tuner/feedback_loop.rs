//! The feedback loop orchestrator.
//!
//! One run looks like this:
//!
//! ```text
//! load config ─▶ backup ─▶ round 0: evaluate as-is
//!                               │
//!        ┌──────────────────────┘
//!        ▼
//!   plan_round ──(no moves)──▶ stop
//!        │
//!        ▼
//!   write thresholds ─▶ config_iter_<n>.json ─▶ evaluate ─▶ record metrics
//!        │
//!        └──▶ next round (until max_iterations or the time budget runs out)
//! ```
//!
//! Rounds are strictly sequential and the evaluator runs at most once per
//! round. The working document only changes between evaluations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Utc};
use tracing::{debug, info, warn};

use super::adjuster::ThresholdAdjuster;
use super::config::FeedbackLoopConfig;
use super::document::{validate_dataset, write_json, GuardrailConfigDocument, TunableGuardrail};
use super::report::render_markdown;
use super::types::{RunId, StopReason, TuningResult, TuningRun};
use crate::error::{TunerError, TunerResult};
use crate::evaluator::{EvaluationRequest, Evaluator, MetricsReport};

/// File name of the final tuned configuration.
pub const TUNED_CONFIG_FILE: &str = "eval_config_tuned.json";

/// File name of the machine-readable run summary.
pub const RESULTS_FILE: &str = "tuning_results.json";

/// Drives evaluation rounds and threshold adjustments for one configuration.
pub struct FeedbackLoop {
    config_path: PathBuf,
    dataset_path: PathBuf,
    output_dir: PathBuf,
    loop_config: FeedbackLoopConfig,
    evaluator: Arc<dyn Evaluator>,
}

impl FeedbackLoop {
    /// Create a feedback loop. Fails if `loop_config` is invalid.
    pub fn new(
        config_path: impl Into<PathBuf>,
        dataset_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        loop_config: FeedbackLoopConfig,
        evaluator: Arc<dyn Evaluator>,
    ) -> TunerResult<Self> {
        loop_config.validate()?;
        Ok(Self {
            config_path: config_path.into(),
            dataset_path: dataset_path.into(),
            output_dir: output_dir.into(),
            loop_config,
            evaluator,
        })
    }

    /// Directory artifacts are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Loop configuration in effect.
    pub fn loop_config(&self) -> &FeedbackLoopConfig {
        &self.loop_config
    }

    /// Execute the feedback loop.
    ///
    /// Returns one result per tunable guardrail. A configuration with no
    /// tunable guardrails yields an empty run without any evaluation.
    pub async fn run(&self) -> TunerResult<TuningRun> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            run_id = %run_id,
            config = %self.config_path.display(),
            dataset = %self.dataset_path.display(),
            "Starting guardrail feedback loop"
        );

        create_dir(&self.output_dir).await?;

        let samples = validate_dataset(&self.dataset_path).await?;
        debug!(samples, "Dataset validated");

        let mut document = GuardrailConfigDocument::load(&self.config_path).await?;
        let tunable = document.tunable_guardrails();

        if tunable.is_empty() {
            warn!("No guardrails with confidence_threshold found");
            return Ok(TuningRun {
                run_id,
                started_at,
                finished_at: Utc::now(),
                targets: self.loop_config.targets.clone(),
                rounds_completed: 0,
                results: Vec::new(),
            });
        }

        info!(
            count = tunable.len(),
            guardrails = ?tunable.iter().map(|t| t.key.to_string()).collect::<Vec<_>>(),
            "Found tunable guardrails"
        );

        let backup_path = self
            .output_dir
            .join("backups")
            .join(format!("config_backup_{}.json", timestamp()));
        document.save_original(&backup_path).await?;
        info!(path = %backup_path.display(), "Saved config backup");

        let mut adjuster = ThresholdAdjuster::new(self.loop_config.clone());
        let mut clamped = false;
        for guardrail in &tunable {
            let start = adjuster
                .get_or_create_state(guardrail.key.clone(), guardrail.threshold)
                .current_threshold;
            if start != guardrail.threshold {
                document.set_threshold(&guardrail.key, start)?;
                clamped = true;
            }
        }

        // Round 0 evaluates the base configuration, or a snapshot of it when
        // out-of-bounds thresholds had to be clamped.
        let initial_config = if clamped {
            let snapshot = self.output_dir.join("config_iter_0.json");
            document.save(&snapshot).await?;
            snapshot
        } else {
            self.config_path.clone()
        };

        info!("Running initial evaluation");
        let mut report = self.evaluate(0, "initial", &initial_config).await?;
        record_metrics(&mut adjuster, &tunable, &report)?;

        let mut rounds_completed = 0;
        let mut unconverged_reason = StopReason::MaxIterations;
        let budget = self.loop_config.time_budget();

        for round in 1..=self.loop_config.max_iterations {
            if budget.is_some_and(|budget| clock.elapsed() >= budget) {
                warn!(round, elapsed_ms = clock.elapsed().as_millis(), "Time budget exhausted");
                unconverged_reason = StopReason::TimeBudgetExhausted;
                break;
            }

            info!(round, max = self.loop_config.max_iterations, "Starting round");

            let plan = adjuster.plan_round(&report, round);
            if !plan.has_adjustments() {
                info!(round, "No adjustments needed, stopping loop");
                break;
            }

            for adjustment in &plan.applied {
                document.set_threshold(&adjustment.key, adjustment.new_threshold)?;
            }

            let snapshot = self.output_dir.join(format!("config_iter_{}.json", round));
            document.save(&snapshot).await?;

            info!(round, adjustments = plan.applied.len(), "Re-running evaluation with updated thresholds");
            report = self
                .evaluate(round, &format!("iter_{}", round), &snapshot)
                .await?;
            record_metrics(&mut adjuster, &tunable, &report)?;
            rounds_completed += 1;
        }

        let results = build_results(&adjuster, &tunable, unconverged_reason);

        let tuned_path = self.output_dir.join(TUNED_CONFIG_FILE);
        document.save(&tuned_path).await?;
        info!(path = %tuned_path.display(), "Saved tuned config");

        let run = TuningRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            targets: self.loop_config.targets.clone(),
            rounds_completed,
            results,
        };

        let report_path = self
            .output_dir
            .join(format!("tuning_report_{}.md", timestamp()));
        tokio::fs::write(&report_path, render_markdown(&run))
            .await
            .map_err(|e| artifact(&report_path, e))?;
        info!(path = %report_path.display(), "Generated report");

        let results_path = self.output_dir.join(RESULTS_FILE);
        let value = serde_json::to_value(&run).map_err(|e| artifact(&results_path, e))?;
        write_json(&results_path, &value).await?;

        info!(
            run_id = %run.run_id,
            rounds = run.rounds_completed,
            converged = run.results.iter().filter(|r| r.converged).count(),
            total = run.results.len(),
            elapsed_ms = clock.elapsed().as_millis(),
            "Feedback loop finished"
        );

        Ok(run)
    }

    async fn evaluate(&self, round: u32, run_name: &str, config_path: &Path) -> TunerResult<MetricsReport> {
        let request = EvaluationRequest {
            run_name: run_name.to_string(),
            config_path: config_path.to_path_buf(),
            dataset_path: self.dataset_path.clone(),
            output_dir: self
                .output_dir
                .join(format!("eval_{}_{}", run_name, timestamp())),
        };

        self.evaluator
            .evaluate(&request)
            .await
            .map_err(|source| TunerError::Evaluation {
                round,
                run_name: run_name.to_string(),
                source,
            })
    }
}

fn record_metrics(
    adjuster: &mut ThresholdAdjuster,
    tunable: &[TunableGuardrail],
    report: &MetricsReport,
) -> TunerResult<()> {
    for guardrail in tunable {
        let Some(metrics) = report.get(&guardrail.key) else {
            continue;
        };
        if !metrics.is_consistent() {
            warn!(
                stage = %guardrail.key.stage,
                guardrail = %guardrail.key.name,
                total = metrics.total_samples,
                "Confusion counts do not add up to total_samples"
            );
        }
        adjuster.update_metrics(&guardrail.key, metrics.clone())?;
    }
    Ok(())
}

fn build_results(
    adjuster: &ThresholdAdjuster,
    tunable: &[TunableGuardrail],
    unconverged_reason: StopReason,
) -> Vec<TuningResult> {
    tunable
        .iter()
        .filter_map(|guardrail| adjuster.state(&guardrail.key))
        .map(|state| {
            let initial_metrics = state.metrics_history.first().cloned();
            let final_metrics = state.metrics_history.last().cloned();
            let improved = match (&initial_metrics, &final_metrics) {
                (Some(first), Some(last)) => Some(adjuster.analyzer().metrics_improved(first, last)),
                _ => None,
            };

            TuningResult {
                key: state.key.clone(),
                initial_threshold: state.initial_threshold,
                final_threshold: state.current_threshold,
                initial_metrics,
                final_metrics,
                adjustments: state.adjustments.clone(),
                converged: state.is_converged(),
                reason: state.stop_reason().unwrap_or(unconverged_reason),
                iterations: state.adjustments.len(),
                improved,
            }
        })
        .collect()
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

async fn create_dir(path: &Path) -> TunerResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| artifact(path, e))
}

fn artifact(path: &Path, err: impl std::fmt::Display) -> TunerError {
    TunerError::Artifact {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
