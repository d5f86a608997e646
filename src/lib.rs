//! # Guardrail Threshold Tuner
//!
//! Automatically tunes the `confidence_threshold` of guardrail classifiers
//! so that their measured precision and recall converge toward
//! operator-specified targets.
//!
//! ## Features
//!
//! - **Direction selection**: precision short raises the threshold, recall
//!   short lowers it, a configurable priority breaks ties
//! - **Damped steps**: every direction reversal halves the step
//! - **Termination**: targets achieved, oscillation limit, bounds limit,
//!   iteration budget or wall-clock budget
//! - **Pluggable evaluation**: external command or HTTP service
//! - **Artifacts**: config backup, per-round snapshots, tuned config,
//!   markdown report and JSON results
//!
//! ## Architecture
//!
//! ```text
//! CLI → FeedbackLoop → Evaluator (process / HTTP)
//!            ↓
//!   ThresholdAdjuster → MetricsAnalyzer
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use guardrail_tuner::evaluator::CommandEvaluator;
//! use guardrail_tuner::tuner::{FeedbackLoop, FeedbackLoopConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let evaluator = CommandEvaluator::from_command_line(
//!         "guardrail-eval --config-path {config} --dataset-path {dataset} --output-dir {output}",
//!         600_000,
//!     )?;
//!     let feedback_loop = FeedbackLoop::new(
//!         "eval_config.json",
//!         "test_data.jsonl",
//!         "tuning_results",
//!         FeedbackLoopConfig::default(),
//!         Arc::new(evaluator),
//!     )?;
//!     let run = feedback_loop.run().await?;
//!     println!("{} guardrails tuned", run.results.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for the tuner.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Evaluation collaborators (external command and HTTP service).
pub mod evaluator;
/// Threshold analysis, adjustment and the feedback loop.
pub mod tuner;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use tuner::{FeedbackLoop, FeedbackLoopConfig};
