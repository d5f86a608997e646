use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input error: {message}")]
    Input { message: String },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("Tuning error: {0}")]
    Tuner(#[from] TunerError),
}

/// Guardrail configuration document errors
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid document structure: {message}")]
    InvalidStructure { message: String },

    #[error("Guardrail {name} not found in {stage}")]
    GuardrailNotFound { stage: String, name: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Evaluation collaborator errors
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("Evaluator unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid metrics: {message}")]
    InvalidMetrics { message: String },

    #[error("Evaluation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Evaluation process failed: {message}")]
    Process { message: String },

    #[error("eval_metrics.json not found in {}", .dir.display())]
    MissingMetrics { dir: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tuning loop errors
#[derive(Debug, Error)]
pub enum TunerError {
    #[error("Invalid tuning configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("No tuning state for guardrail {key}")]
    UnknownGuardrail { key: String },

    #[error("Evaluation failed in round {round} ({run_name}): {source}")]
    Evaluation {
        round: u32,
        run_name: String,
        #[source]
        source: EvaluatorError,
    },

    #[error("Failed to write artifact {}: {message}", .path.display())]
    Artifact { path: PathBuf, message: String },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type alias for evaluator operations
pub type EvaluatorResult<T> = Result<T, EvaluatorError>;

/// Result type alias for tuning operations
pub type TunerResult<T> = Result<T, TunerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing evaluator".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing evaluator");

        let err = AppError::Input {
            message: "Config file not found: a.json".to_string(),
        };
        assert_eq!(err.to_string(), "Input error: Config file not found: a.json");
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::GuardrailNotFound {
            stage: "input".to_string(),
            name: "Jailbreak".to_string(),
        };
        assert_eq!(err.to_string(), "Guardrail Jailbreak not found in input");

        let err = DocumentError::InvalidStructure {
            message: "root must be an object".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid document structure: root must be an object"
        );
    }

    #[test]
    fn test_evaluator_error_display() {
        let err = EvaluatorError::Unavailable {
            message: "connection refused".to_string(),
            retries: 2,
        };
        assert_eq!(
            err.to_string(),
            "Evaluator unavailable: connection refused (retries: 2)"
        );

        let err = EvaluatorError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Evaluation timeout after 5000ms");

        let err = EvaluatorError::MissingMetrics {
            dir: PathBuf::from("/tmp/eval_initial"),
        };
        assert_eq!(
            err.to_string(),
            "eval_metrics.json not found in /tmp/eval_initial"
        );
    }

    #[test]
    fn test_tuner_error_display() {
        let err = TunerError::InvalidConfig {
            field: "step_size".to_string(),
            reason: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid tuning configuration: step_size - must be positive"
        );

        let err = TunerError::Evaluation {
            round: 3,
            run_name: "iter_3".to_string(),
            source: EvaluatorError::Process {
                message: "exit status 2".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Evaluation failed in round 3 (iter_3): Evaluation process failed: exit status 2"
        );
    }

    #[test]
    fn test_error_conversions_to_app_error() {
        let doc_err = DocumentError::InvalidStructure {
            message: "x".to_string(),
        };
        let app_err: AppError = doc_err.into();
        assert!(matches!(app_err, AppError::Document(_)));

        let eval_err = EvaluatorError::Timeout { timeout_ms: 1 };
        let app_err: AppError = eval_err.into();
        assert!(matches!(app_err, AppError::Evaluator(_)));

        let tuner_err = TunerError::UnknownGuardrail {
            key: "output:PII".to_string(),
        };
        let app_err: AppError = tuner_err.into();
        assert!(matches!(app_err, AppError::Tuner(_)));
    }

    #[test]
    fn test_document_error_conversion_to_tuner_error() {
        let doc_err = DocumentError::GuardrailNotFound {
            stage: "output".to_string(),
            name: "PII".to_string(),
        };
        let tuner_err: TunerError = doc_err.into();
        assert!(matches!(tuner_err, TunerError::Document(_)));
        assert!(tuner_err.to_string().contains("PII not found in output"));
    }
}
