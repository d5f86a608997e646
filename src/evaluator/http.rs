use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::types::{MetricsReport, METRICS_FILE_NAME};
use super::{EvaluationRequest, Evaluator};
use crate::config::RequestConfig;
use crate::error::{EvaluatorError, EvaluatorResult};

/// Request body sent to the evaluation service.
#[derive(Debug, Serialize)]
struct EvaluationBody<'a> {
    run_name: &'a str,
    config: Value,
    dataset_path: String,
}

/// Client for a remote evaluation service.
///
/// Each round posts the configuration to `{base_url}/v1/evaluations`; the
/// response body is the metrics document, which is also written to the
/// run's output directory as `eval_metrics.json`.
#[derive(Clone)]
pub struct HttpEvaluator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl HttpEvaluator {
    /// Create a new evaluation service client
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_config: RequestConfig,
    ) -> EvaluatorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EvaluatorError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, body: &EvaluationBody<'_>) -> EvaluatorResult<Value> {
        debug!(run = %body.run_name, "Calling evaluation service");

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EvaluatorError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                EvaluatorError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(EvaluatorError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| EvaluatorError::InvalidMetrics {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

/// Client errors and malformed bodies will not change on retry.
fn is_retryable(err: &EvaluatorError) -> bool {
    match err {
        EvaluatorError::Api { status, .. } => *status >= 500 || *status == 429,
        EvaluatorError::InvalidMetrics { .. } => false,
        _ => true,
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> EvaluatorResult<MetricsReport> {
        let url = format!("{}/v1/evaluations", self.base_url);

        let raw_config = tokio::fs::read_to_string(&request.config_path).await?;
        let config: Value =
            serde_json::from_str(&raw_config).map_err(|e| EvaluatorError::Process {
                message: format!(
                    "Configuration {} is not valid JSON: {}",
                    request.config_path.display(),
                    e
                ),
            })?;
        let body = EvaluationBody {
            run_name: &request.run_name,
            config,
            dataset_path: request.dataset_path.display().to_string(),
        };

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = backoff_delay(self.request_config.retry_delay_ms, retries);
                warn!(
                    run = %request.run_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying evaluation request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &body).await {
                Ok(document) => {
                    info!(
                        run = %request.run_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Evaluation service call succeeded"
                    );

                    let report = MetricsReport::from_value(&document)?;
                    tokio::fs::create_dir_all(&request.output_dir).await?;
                    let pretty = serde_json::to_string_pretty(&document).map_err(|e| {
                        EvaluatorError::InvalidMetrics {
                            message: e.to_string(),
                        }
                    })?;
                    tokio::fs::write(request.output_dir.join(METRICS_FILE_NAME), pretty).await?;

                    return Ok(report);
                }
                Err(e) => {
                    error!(
                        run = %request.run_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Evaluation service call failed"
                    );
                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(EvaluatorError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }
}

/// Exponential backoff before retry number `retry` (1-based), saturating.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}
