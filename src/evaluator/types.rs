use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::tuner::types::{GuardrailKey, GuardrailMetrics, Stage};

/// File name evaluators write their metrics to.
pub const METRICS_FILE_NAME: &str = "eval_metrics.json";

/// Metrics for every guardrail an evaluator reported, keyed by stage and
/// guardrail name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsReport {
    stages: BTreeMap<Stage, BTreeMap<String, GuardrailMetrics>>,
}

impl MetricsReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the metrics for one guardrail.
    pub fn insert(&mut self, key: GuardrailKey, metrics: GuardrailMetrics) {
        self.stages
            .entry(key.stage)
            .or_default()
            .insert(key.name, metrics);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: GuardrailKey, metrics: GuardrailMetrics) -> Self {
        self.insert(key, metrics);
        self
    }

    /// Metrics for one guardrail, if reported.
    pub fn get(&self, key: &GuardrailKey) -> Option<&GuardrailMetrics> {
        self.stages.get(&key.stage)?.get(&key.name)
    }

    /// Number of guardrails in the report.
    pub fn len(&self) -> usize {
        self.stages.values().map(BTreeMap::len).sum()
    }

    /// Whether the report has no guardrails.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every reported guardrail.
    pub fn iter(&self) -> impl Iterator<Item = (GuardrailKey, &GuardrailMetrics)> {
        self.stages.iter().flat_map(|(stage, guardrails)| {
            guardrails
                .iter()
                .map(move |(name, metrics)| (GuardrailKey::new(*stage, name.clone()), metrics))
        })
    }

    /// Parse an evaluator's metrics document.
    ///
    /// Unknown stages and non-object entries are ignored; missing metric
    /// fields default to zero. A field with the wrong type is an error.
    pub fn from_value(raw: &Value) -> EvaluatorResult<Self> {
        let stages = raw.as_object().ok_or_else(|| EvaluatorError::InvalidMetrics {
            message: "metrics document must be a JSON object".to_string(),
        })?;

        let mut report = Self::new();
        for (stage_name, guardrails) in stages {
            let Ok(stage) = stage_name.parse::<Stage>() else {
                debug!(stage = %stage_name, "Ignoring unknown stage in metrics");
                continue;
            };
            let Some(guardrails) = guardrails.as_object() else {
                continue;
            };

            for (name, entry) in guardrails {
                if !entry.is_object() {
                    continue;
                }
                let metrics: GuardrailMetrics =
                    serde_json::from_value(entry.clone()).map_err(|e| {
                        EvaluatorError::InvalidMetrics {
                            message: format!("{}.{}: {}", stage, name, e),
                        }
                    })?;
                report.insert(GuardrailKey::new(stage, name.clone()), metrics);
            }
        }

        Ok(report)
    }

    /// Parse a metrics document from JSON text.
    pub fn from_json_str(raw: &str) -> EvaluatorResult<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| EvaluatorError::InvalidMetrics {
            message: format!("Failed to parse metrics: {}", e),
        })?;
        Self::from_value(&value)
    }

    /// Read and parse a metrics file.
    pub async fn from_file(path: &Path) -> EvaluatorResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }
}

/// Locate `eval_metrics.json` in `dir` or one of its immediate
/// subdirectories (some evaluators nest their output by run).
pub async fn find_metrics_file(dir: &Path) -> EvaluatorResult<PathBuf> {
    let direct = dir.join(METRICS_FILE_NAME);
    if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
        return Ok(direct);
    }

    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        let mut nested = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join(METRICS_FILE_NAME);
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    nested.push(candidate);
                }
            }
        }
        // read_dir order is platform dependent
        nested.sort();
        if let Some(found) = nested.into_iter().next() {
            return Ok(found);
        }
    }

    Err(EvaluatorError::MissingMetrics {
        dir: dir.to_path_buf(),
    })
}
