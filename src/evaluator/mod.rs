//! Evaluation collaborators.
//!
//! The tuner never scores samples itself. Each round it hands a
//! configuration file and a dataset to an [`Evaluator`] and gets back a
//! [`MetricsReport`] keyed by stage and guardrail name.
//!
//! Two implementations ship with the crate:
//! - [`CommandEvaluator`]: runs an external evaluation command and reads the
//!   `eval_metrics.json` it leaves in the output directory
//! - [`HttpEvaluator`]: posts the configuration to an evaluation service

mod command;
mod http;
mod types;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::EvaluatorResult;

pub use command::CommandEvaluator;
pub use http::HttpEvaluator;
pub use types::{find_metrics_file, MetricsReport, METRICS_FILE_NAME};

/// One evaluation run requested by the feedback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    /// Short label such as `initial` or `iter_3`
    pub run_name: String,
    /// Guardrail configuration to evaluate
    pub config_path: PathBuf,
    /// Labeled dataset (JSONL)
    pub dataset_path: PathBuf,
    /// Directory reserved for this run's artifacts
    pub output_dir: PathBuf,
}

/// Runs a guardrail configuration against a labeled dataset.
///
/// Implementations own any retry policy; the feedback loop treats an error
/// as fatal for the run.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate the configuration and return per-guardrail metrics.
    async fn evaluate(&self, request: &EvaluationRequest) -> EvaluatorResult<MetricsReport>;
}
