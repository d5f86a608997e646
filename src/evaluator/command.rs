use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::types::{find_metrics_file, MetricsReport};
use super::{EvaluationRequest, Evaluator};
use crate::error::{EvaluatorError, EvaluatorResult};

/// Runs an external evaluation command once per round.
///
/// Arguments may contain the placeholders `{config}`, `{dataset}`,
/// `{output}` and `{run}`, replaced with the request's paths and run name.
/// The command must exit successfully and leave `eval_metrics.json` in the
/// output directory (or one subdirectory below it).
///
/// ```text
/// python -m guardrails.evals --config-path {config} --dataset-path {dataset} --output-dir {output}
/// ```
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEvaluator {
    /// Create an evaluator for `program` with argument templates.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Build an evaluator from a whitespace-separated command line.
    ///
    /// Quotes and escapes are not interpreted, so arguments and the program
    /// path cannot contain spaces. Wrap anything more involved in a script.
    pub fn from_command_line(command_line: &str, timeout_ms: u64) -> EvaluatorResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| EvaluatorError::Process {
            message: "evaluator command is empty".to_string(),
        })?;
        Ok(Self::new(program, parts.collect(), timeout_ms))
    }

    /// Program that will be spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders substituted for `request`.
    pub fn render_args(&self, request: &EvaluationRequest) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{config}", &display(&request.config_path))
                    .replace("{dataset}", &display(&request.dataset_path))
                    .replace("{output}", &display(&request.output_dir))
                    .replace("{run}", &request.run_name)
            })
            .collect()
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> EvaluatorResult<MetricsReport> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let args = self.render_args(request);
        debug!(program = %self.program, args = ?args, "Spawning evaluation command");

        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| EvaluatorError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                program = %self.program,
                run = %request.run_name,
                status = %output.status,
                "Evaluation command failed"
            );
            return Err(EvaluatorError::Process {
                message: format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }

        let metrics_path = find_metrics_file(&request.output_dir).await?;
        let report = MetricsReport::from_file(&metrics_path).await?;

        info!(
            run = %request.run_name,
            guardrails = report.len(),
            latency_ms = start.elapsed().as_millis(),
            "Evaluation command finished"
        );

        Ok(report)
    }
}
