//! Feedback-loop tuning of guardrail confidence thresholds.
//!
//! This module provides:
//! - [`MetricsAnalyzer`]: gap analysis and direction selection
//! - [`ThresholdAdjuster`]: per-guardrail control step with oscillation damping
//! - [`FeedbackLoop`]: orchestration of evaluation rounds and artifacts
//! - [`GuardrailConfigDocument`]: the JSON configuration being tuned
//!
//! # Architecture
//!
//! ```text
//! FeedbackLoop ──▶ Evaluator (command / HTTP)
//!      │                 │
//!      │           MetricsReport
//!      ▼                 │
//! ThresholdAdjuster ◀────┘
//!      │
//!      └──▶ MetricsAnalyzer
//! ```

pub mod adjuster;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod document;
pub mod feedback_loop;
pub mod report;
pub mod types;

pub use adjuster::{RoundPlan, ThresholdAdjuster};
pub use analyzer::{MetricGaps, MetricsAnalyzer};
pub use cli::{CliResult, TuneArgs};
pub use config::FeedbackLoopConfig;
pub use document::{validate_dataset, GuardrailConfigDocument, TunableGuardrail};
pub use feedback_loop::{FeedbackLoop, RESULTS_FILE, TUNED_CONFIG_FILE};
pub use types::{
    AdjustmentOutcome, GuardrailKey, GuardrailMetrics, Priority, RunId, Stage, StopReason,
    ThresholdAdjustment, TuningDirection, TuningResult, TuningRun, TuningState, TuningTarget,
};
