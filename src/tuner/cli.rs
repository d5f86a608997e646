//! Command-line surface of the tuner.
//!
//! Flags override the `TUNER_*` / `EVALUATOR_*` environment; anything not
//! given falls back to the environment and then to the built-in defaults.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use super::feedback_loop::{FeedbackLoop, TUNED_CONFIG_FILE};
use super::report::render_summary;
use super::types::Priority;
use super::FeedbackLoopConfig;
use crate::config::{Config, EvaluatorConfig};
use crate::error::{AppError, AppResult};
use crate::evaluator::{CommandEvaluator, Evaluator, HttpEvaluator};

const EXAMPLES: &str = "\
Examples:
  # Default targets (0.90 precision and recall)
  guardrail-tuner --config config.json --dataset test_data.jsonl \\
      --evaluator-command 'guardrail-eval --config-path {config} --dataset-path {dataset} --output-dir {output}'

  # Prioritize precision against a remote evaluation service
  guardrail-tuner --config config.json --dataset test_data.jsonl \\
      --precision-target 0.95 --recall-target 0.85 --priority precision \\
      --evaluator-url http://localhost:8080

  # More iterations with smaller steps
  guardrail-tuner --config config.json --dataset test_data.jsonl \\
      --max-iterations 20 --step-size 0.02";

/// Automatically tune guardrail confidence thresholds.
#[derive(Parser, Debug, Clone)]
#[command(name = "guardrail-tuner", version, about, after_help = EXAMPLES)]
pub struct TuneArgs {
    /// Path to guardrail configuration JSON file
    #[arg(long)]
    pub config: PathBuf,

    /// Path to evaluation dataset (JSONL format)
    #[arg(long)]
    pub dataset: PathBuf,

    /// Output directory for results
    #[arg(long, default_value = "tuning_results")]
    pub output: PathBuf,

    /// Target precision to achieve [default: 0.90]
    #[arg(long)]
    pub precision_target: Option<f64>,

    /// Target recall to achieve [default: 0.90]
    #[arg(long)]
    pub recall_target: Option<f64>,

    /// Metric to prioritize when both are below target: precision, recall, f1 [default: f1]
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Maximum tuning iterations [default: 10]
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Initial threshold adjustment step size [default: 0.05]
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Stop after this many seconds, keeping partial results
    #[arg(long)]
    pub time_budget_secs: Option<u64>,

    /// Evaluation command; supports {config}, {dataset}, {output} and {run}.
    /// Split on whitespace without quote handling; use a script for complex commands
    #[arg(long, conflicts_with = "evaluator_url")]
    pub evaluator_command: Option<String>,

    /// Base URL of an evaluation service
    #[arg(long)]
    pub evaluator_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl TuneArgs {
    /// Apply command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut FeedbackLoopConfig) {
        if let Some(v) = self.precision_target {
            config.targets.precision_target = v;
        }
        if let Some(v) = self.recall_target {
            config.targets.recall_target = v;
        }
        if let Some(v) = self.priority {
            config.targets.priority = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.step_size {
            config.step_size = v;
        }
        if self.time_budget_secs.is_some() {
            config.time_budget_secs = self.time_budget_secs;
        }
    }
}

/// Result of CLI command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Where evaluations come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorSource {
    /// External command line
    Command(String),
    /// Evaluation service base URL
    Url(String),
}

/// Pick the evaluator source: flags first, then environment.
pub fn evaluator_source(args: &TuneArgs, config: &EvaluatorConfig) -> Option<EvaluatorSource> {
    match (&args.evaluator_command, &args.evaluator_url) {
        (Some(command), _) => Some(EvaluatorSource::Command(command.clone())),
        (None, Some(url)) => Some(EvaluatorSource::Url(url.clone())),
        (None, None) => match (&config.command, &config.url) {
            (Some(command), _) => Some(EvaluatorSource::Command(command.clone())),
            (None, Some(url)) => Some(EvaluatorSource::Url(url.clone())),
            (None, None) => None,
        },
    }
}

/// Build the evaluator selected by flags or environment.
pub fn build_evaluator(args: &TuneArgs, config: &Config) -> AppResult<Arc<dyn Evaluator>> {
    match evaluator_source(args, &config.evaluator) {
        Some(EvaluatorSource::Command(command)) => {
            let evaluator = CommandEvaluator::from_command_line(&command, config.request.timeout_ms)?;
            info!(program = %evaluator.program(), "Using command evaluator");
            Ok(Arc::new(evaluator))
        }
        Some(EvaluatorSource::Url(url)) => {
            let evaluator =
                HttpEvaluator::new(&url, config.evaluator.api_key.clone(), config.request.clone())?;
            info!(base_url = %evaluator.base_url(), "Using HTTP evaluator");
            Ok(Arc::new(evaluator))
        }
        None => Err(AppError::Config {
            message: "No evaluator configured: pass --evaluator-command or --evaluator-url \
                      (or set EVALUATOR_COMMAND / EVALUATOR_URL)"
                .to_string(),
        }),
    }
}

/// Fail fast when an input file is missing.
pub fn check_inputs(args: &TuneArgs) -> AppResult<()> {
    if !args.config.exists() {
        return Err(AppError::Input {
            message: format!("Config file not found: {}", args.config.display()),
        });
    }
    if !args.dataset.exists() {
        return Err(AppError::Input {
            message: format!("Dataset file not found: {}", args.dataset.display()),
        });
    }
    Ok(())
}

/// Run the tuner for parsed arguments.
pub async fn execute(args: TuneArgs, config: Config) -> CliResult {
    if let Err(e) = check_inputs(&args) {
        return CliResult::error(format!("Error: {}", e));
    }

    let mut loop_config = config.tuning.clone();
    args.apply_overrides(&mut loop_config);

    let evaluator = match build_evaluator(&args, &config) {
        Ok(e) => e,
        Err(e) => return CliResult::error(format!("Error: {}", e)),
    };

    let feedback_loop = match FeedbackLoop::new(
        &args.config,
        &args.dataset,
        &args.output,
        loop_config,
        evaluator,
    ) {
        Ok(l) => l,
        Err(e) => return CliResult::error(format!("Error: {}", AppError::from(e))),
    };

    match feedback_loop.run().await {
        Ok(run) => {
            let mut message = render_summary(&run.results);
            if !run.results.is_empty() {
                message.push_str(&format!(
                    "\nTuned config saved to: {}\nReport saved to: {}\n",
                    args.output.join(TUNED_CONFIG_FILE).display(),
                    args.output.display()
                ));
            }
            CliResult::success(message)
        }
        Err(e) => {
            error!(error = %e, "Tuning failed");
            CliResult::error(format!("Error: {}", AppError::from(e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, LoggingConfig, RequestConfig};

    fn config(evaluator: EvaluatorConfig) -> Config {
        Config {
            evaluator,
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            tuning: FeedbackLoopConfig::default(),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let args = TuneArgs::parse_from(["guardrail-tuner", "--config", "c.json", "--dataset", "d.jsonl"]);

        assert_eq!(args.output, PathBuf::from("tuning_results"));
        assert_eq!(args.priority, None);
        assert!(!args.verbose);

        let mut loop_config = FeedbackLoopConfig::default();
        args.apply_overrides(&mut loop_config);
        assert_eq!(loop_config, FeedbackLoopConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let args = TuneArgs::parse_from([
            "guardrail-tuner",
            "--config",
            "c.json",
            "--dataset",
            "d.jsonl",
            "--precision-target",
            "0.95",
            "--recall-target",
            "0.85",
            "--priority",
            "precision",
            "--max-iterations",
            "20",
            "--step-size",
            "0.02",
            "--time-budget-secs",
            "600",
            "-v",
        ]);

        let mut loop_config = FeedbackLoopConfig::default();
        args.apply_overrides(&mut loop_config);

        assert_eq!(loop_config.targets.precision_target, 0.95);
        assert_eq!(loop_config.targets.recall_target, 0.85);
        assert_eq!(loop_config.targets.priority, Priority::Precision);
        assert_eq!(loop_config.max_iterations, 20);
        assert_eq!(loop_config.step_size, 0.02);
        assert_eq!(loop_config.time_budget_secs, Some(600));
        assert!(args.verbose);
    }

    #[test]
    fn test_rejects_unknown_priority() {
        let parsed = TuneArgs::try_parse_from([
            "guardrail-tuner",
            "--config",
            "c.json",
            "--dataset",
            "d.jsonl",
            "--priority",
            "accuracy",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_evaluator_flags_conflict() {
        let parsed = TuneArgs::try_parse_from([
            "guardrail-tuner",
            "--config",
            "c.json",
            "--dataset",
            "d.jsonl",
            "--evaluator-command",
            "eval",
            "--evaluator-url",
            "http://localhost",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_build_evaluator_requires_a_source() {
        let args = TuneArgs::parse_from(["guardrail-tuner", "--config", "c.json", "--dataset", "d.jsonl"]);

        let err = build_evaluator(&args, &config(EvaluatorConfig::default())).err().unwrap();
        assert!(err.to_string().contains("No evaluator configured"));

        let from_env = config(EvaluatorConfig {
            url: Some("http://localhost:9000".to_string()),
            ..Default::default()
        });
        assert!(build_evaluator(&args, &from_env).is_ok());
    }

    #[test]
    fn test_flag_beats_environment_evaluator() {
        let env = EvaluatorConfig {
            command: Some("guardrail-eval --output-dir {output}".to_string()),
            url: None,
            api_key: None,
        };

        let args = TuneArgs::parse_from([
            "guardrail-tuner",
            "--config",
            "c.json",
            "--dataset",
            "d.jsonl",
            "--evaluator-url",
            "http://localhost:9000",
        ]);
        assert_eq!(
            evaluator_source(&args, &env),
            Some(EvaluatorSource::Url("http://localhost:9000".to_string()))
        );

        let args = TuneArgs::parse_from(["guardrail-tuner", "--config", "c.json", "--dataset", "d.jsonl"]);
        assert_eq!(
            evaluator_source(&args, &env),
            Some(EvaluatorSource::Command("guardrail-eval --output-dir {output}".to_string()))
        );
    }

    #[tokio::test]
    async fn test_missing_inputs_exit_with_one() {
        let dir = tempfile::tempdir().unwrap();
        let args = TuneArgs::parse_from([
            "guardrail-tuner".to_string(),
            "--config".to_string(),
            dir.path().join("missing.json").display().to_string(),
            "--dataset".to_string(),
            "d.jsonl".to_string(),
        ]);

        let result = execute(args, config(EvaluatorConfig::default())).await;

        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("Config file not found"));

        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{}").unwrap();
        let args = TuneArgs::parse_from([
            "guardrail-tuner".to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
            "--dataset".to_string(),
            dir.path().join("missing.jsonl").display().to_string(),
        ]);

        let result = execute(args, config(EvaluatorConfig::default())).await;

        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("Dataset file not found"));
    }
}
