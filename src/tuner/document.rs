//! The guardrail configuration document.
//!
//! The document is plain JSON with up to three stage sections:
//!
//! ```json
//! {
//!   "version": 1,
//!   "pre_flight": { "guardrails": [ { "name": "Contains PII", "config": { ... } } ] },
//!   "input":      { "guardrails": [ { "name": "Jailbreak", "config": { "confidence_threshold": 0.7 } } ] },
//!   "output":     { "guardrails": [] }
//! }
//! ```
//!
//! Only `config.confidence_threshold` is ever rewritten; every other field
//! is carried through untouched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::types::{round_threshold, GuardrailKey, Stage};
use crate::error::{DocumentError, DocumentResult};

/// Key under a guardrail's `config` that holds its threshold.
pub const THRESHOLD_FIELD: &str = "confidence_threshold";

/// A guardrail with a numeric threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TunableGuardrail {
    /// Stage and name of the guardrail
    pub key: GuardrailKey,
    /// Threshold as written in the document
    pub threshold: f64,
}

/// A loaded configuration: the untouched original plus a working copy.
#[derive(Debug, Clone)]
pub struct GuardrailConfigDocument {
    source: Option<PathBuf>,
    original: Value,
    current: Value,
}

impl GuardrailConfigDocument {
    /// Load and validate a configuration file.
    pub async fn load(path: &Path) -> DocumentResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DocumentError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| DocumentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut document = Self::from_value(value)?;
        document.source = Some(path.to_path_buf());
        Ok(document)
    }

    /// Wrap an in-memory document, checking its shape.
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| structure("configuration must be a JSON object"))?;

        for stage in Stage::ALL {
            let Some(section) = root.get(stage.as_str()) else {
                continue;
            };
            if section.is_null() {
                continue;
            }
            let section = section
                .as_object()
                .ok_or_else(|| structure(format!("stage '{}' must be an object", stage)))?;
            if let Some(guardrails) = section.get("guardrails") {
                if !guardrails.is_array() {
                    return Err(structure(format!(
                        "'{}.guardrails' must be an array",
                        stage
                    )));
                }
            }
        }

        Ok(Self {
            source: None,
            current: value.clone(),
            original: value,
        })
    }

    /// File this document was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The document as loaded.
    pub fn original(&self) -> &Value {
        &self.original
    }

    /// The working copy with any thresholds written so far.
    pub fn current(&self) -> &Value {
        &self.current
    }

    /// Guardrails with a numeric `config.confidence_threshold`, in stage
    /// order (`input`, `output`, `pre_flight`) then document order.
    pub fn tunable_guardrails(&self) -> Vec<TunableGuardrail> {
        let mut seen = BTreeSet::new();
        let mut tunable = Vec::new();

        for stage in Stage::ALL {
            for entry in guardrails(&self.current, stage) {
                let Some(name) = entry.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let Some(raw) = entry.get("config").and_then(|c| c.get(THRESHOLD_FIELD)) else {
                    continue;
                };
                let Some(threshold) = raw.as_f64() else {
                    warn!(
                        stage = %stage,
                        guardrail = %name,
                        value = %raw,
                        "Non-numeric confidence_threshold, not tuning"
                    );
                    continue;
                };

                let key = GuardrailKey::new(stage, name);
                if !seen.insert(key.clone()) {
                    warn!(stage = %stage, guardrail = %name, "Duplicate guardrail name, ignoring");
                    continue;
                }
                tunable.push(TunableGuardrail { key, threshold });
            }
        }

        tunable
    }

    /// Current threshold for a guardrail.
    pub fn threshold(&self, key: &GuardrailKey) -> Option<f64> {
        find(&self.current, key)?
            .get("config")?
            .get(THRESHOLD_FIELD)?
            .as_f64()
    }

    /// Write a threshold, rounded to three decimals, into the working copy.
    pub fn set_threshold(&mut self, key: &GuardrailKey, threshold: f64) -> DocumentResult<()> {
        let not_found = || DocumentError::GuardrailNotFound {
            stage: key.stage.to_string(),
            name: key.name.clone(),
        };

        let entry = find_mut(&mut self.current, key).ok_or_else(not_found)?;
        let config = entry
            .as_object_mut()
            .ok_or_else(not_found)?
            .entry("config")
            .or_insert_with(|| Value::Object(Default::default()));
        let config = config.as_object_mut().ok_or_else(|| {
            structure(format!("'config' of guardrail {} is not an object", key))
        })?;

        let rounded = round_threshold(threshold);
        config.insert(THRESHOLD_FIELD.to_string(), Value::from(rounded));
        debug!(stage = %key.stage, guardrail = %key.name, threshold = rounded, "Threshold written");
        Ok(())
    }

    /// Save the working copy as pretty-printed JSON.
    pub async fn save(&self, path: &Path) -> DocumentResult<()> {
        write_json(path, &self.current).await
    }

    /// Save the document as loaded (used for backups).
    pub async fn save_original(&self, path: &Path) -> DocumentResult<()> {
        write_json(path, &self.original).await
    }
}

/// Check that a dataset exists and every non-empty line is a JSON value.
///
/// Returns the number of samples.
pub async fn validate_dataset(path: &Path) -> DocumentResult<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut samples = 0;
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        serde_json::from_str::<Value>(line).map_err(|e| {
            structure(format!("{} line {}: {}", path.display(), index + 1, e))
        })?;
        samples += 1;
    }

    Ok(samples)
}

pub(crate) async fn write_json(path: &Path, value: &Value) -> DocumentResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DocumentError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let pretty = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, pretty)
        .await
        .map_err(|source| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn guardrails(root: &Value, stage: Stage) -> impl Iterator<Item = &Value> {
    root.get(stage.as_str())
        .and_then(|s| s.get("guardrails"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn find<'a>(root: &'a Value, key: &GuardrailKey) -> Option<&'a Value> {
    guardrails(root, key.stage)
        .find(|g| g.get("name").and_then(Value::as_str) == Some(key.name.as_str()))
}

fn find_mut<'a>(root: &'a mut Value, key: &GuardrailKey) -> Option<&'a mut Value> {
    root.get_mut(key.stage.as_str())?
        .get_mut("guardrails")?
        .as_array_mut()?
        .iter_mut()
        .find(|g| g.get("name").and_then(Value::as_str) == Some(key.name.as_str()))
}

fn structure(message: impl Into<String>) -> DocumentError {
    DocumentError::InvalidStructure {
        message: message.into(),
    }
}
