use std::env;

use crate::error::AppError;
use crate::tuner::FeedbackLoopConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Evaluator selection
    pub evaluator: EvaluatorConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Timeouts and retries for evaluations
    pub request: RequestConfig,
    /// Feedback loop settings (`TUNER_*`)
    pub tuning: FeedbackLoopConfig,
}

/// Which evaluator to run and how to reach it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatorConfig {
    /// Command line for [`CommandEvaluator`](crate::evaluator::CommandEvaluator)
    pub command: Option<String>,
    /// Base URL for [`HttpEvaluator`](crate::evaluator::HttpEvaluator)
    pub url: Option<String>,
    /// Bearer token for the evaluation service
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event
    Json,
}

/// Highest accepted `EVALUATOR_MAX_RETRIES`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Evaluation request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Timeout for one evaluation (ms)
    pub timeout_ms: u64,
    /// Retries after the first failed attempt (HTTP only)
    pub max_retries: u32,
    /// Base delay for exponential backoff (ms)
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let evaluator = EvaluatorConfig {
            command: non_empty("EVALUATOR_COMMAND"),
            url: non_empty("EVALUATOR_URL"),
            api_key: non_empty("EVALUATOR_API_KEY"),
        };

        if evaluator.command.is_some() && evaluator.url.is_some() {
            return Err(AppError::Config {
                message: "Set only one of EVALUATOR_COMMAND and EVALUATOR_URL".to_string(),
            });
        }

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env::var("EVALUATOR_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            max_retries: env::var("EVALUATOR_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_delay_ms: env::var("EVALUATOR_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_delay_ms),
        };

        if request.max_retries > MAX_RETRIES_LIMIT {
            return Err(AppError::Config {
                message: format!(
                    "EVALUATOR_MAX_RETRIES must be at most {MAX_RETRIES_LIMIT}, got {}",
                    request.max_retries
                ),
            });
        }

        Ok(Config {
            evaluator,
            logging,
            request,
            tuning: FeedbackLoopConfig::from_env(),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            // A full evaluation pass over a dataset can take minutes.
            timeout_ms: 600_000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}
