//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads `LOG_*`, `EVALUATOR_*`
//! and `TUNER_*` overrides and falls back to defaults otherwise.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use guardrail_tuner::config::{Config, LogFormat, MAX_RETRIES_LIMIT};
use guardrail_tuner::tuner::{FeedbackLoopConfig, Priority};
use serial_test::serial;
use std::env;

const VARS: &[&str] = &[
    "LOG_LEVEL",
    "LOG_FORMAT",
    "EVALUATOR_COMMAND",
    "EVALUATOR_URL",
    "EVALUATOR_API_KEY",
    "EVALUATOR_TIMEOUT_MS",
    "EVALUATOR_MAX_RETRIES",
    "EVALUATOR_RETRY_DELAY_MS",
    "TUNER_MAX_ITERATIONS",
    "TUNER_STEP_SIZE",
    "TUNER_MIN_STEP_SIZE",
    "TUNER_MIN_THRESHOLD",
    "TUNER_MAX_THRESHOLD",
    "TUNER_OSCILLATION_LIMIT",
    "TUNER_TIME_BUDGET_SECS",
    "TUNER_PRECISION_TARGET",
    "TUNER_RECALL_TARGET",
    "TUNER_PRIORITY",
    "TUNER_TOLERANCE",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_config_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.evaluator.command, None);
    assert_eq!(config.evaluator.url, None);
    assert_eq!(config.request.timeout_ms, 600_000);
    assert_eq!(config.request.max_retries, 2);
    assert_eq!(config.request.retry_delay_ms, 1000);
    assert_eq!(config.tuning, FeedbackLoopConfig::default());
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    clear_env();
    env::set_var("LOG_FORMAT", "JSON");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_evaluator_and_request() {
    clear_env();
    env::set_var("EVALUATOR_URL", "http://eval.internal:8080");
    env::set_var("EVALUATOR_API_KEY", "secret");
    env::set_var("EVALUATOR_TIMEOUT_MS", "60000");
    env::set_var("EVALUATOR_MAX_RETRIES", "5");
    env::set_var("EVALUATOR_RETRY_DELAY_MS", "2000");

    let config = Config::from_env().unwrap();
    assert_eq!(
        config.evaluator.url.as_deref(),
        Some("http://eval.internal:8080")
    );
    assert_eq!(config.evaluator.api_key.as_deref(), Some("secret"));
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_blank_evaluator_is_unset() {
    clear_env();
    env::set_var("EVALUATOR_COMMAND", "   ");

    let config = Config::from_env().unwrap();
    assert_eq!(config.evaluator.command, None);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_rejects_two_evaluators() {
    clear_env();
    env::set_var("EVALUATOR_COMMAND", "guardrail-eval");
    env::set_var("EVALUATOR_URL", "http://localhost:8080");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("Set only one"));

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_tuning_overrides() {
    clear_env();
    env::set_var("TUNER_MAX_ITERATIONS", "20");
    env::set_var("TUNER_STEP_SIZE", "0.02");
    env::set_var("TUNER_OSCILLATION_LIMIT", "5");
    env::set_var("TUNER_TIME_BUDGET_SECS", "3600");
    env::set_var("TUNER_PRECISION_TARGET", "0.95");
    env::set_var("TUNER_RECALL_TARGET", "0.85");
    env::set_var("TUNER_PRIORITY", "precision");

    let config = Config::from_env().unwrap();
    assert_eq!(config.tuning.max_iterations, 20);
    assert_eq!(config.tuning.step_size, 0.02);
    assert_eq!(config.tuning.oscillation_limit, 5);
    assert_eq!(config.tuning.time_budget_secs, Some(3600));
    assert_eq!(config.tuning.targets.precision_target, 0.95);
    assert_eq!(config.tuning.targets.recall_target, 0.85);
    assert_eq!(config.tuning.targets.priority, Priority::Precision);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_invalid_values_use_defaults() {
    clear_env();
    env::set_var("TUNER_MAX_ITERATIONS", "many");
    env::set_var("TUNER_PRIORITY", "accuracy");
    env::set_var("EVALUATOR_TIMEOUT_MS", "-1");

    let config = Config::from_env().unwrap();
    assert_eq!(config.tuning.max_iterations, 10);
    assert_eq!(config.tuning.targets.priority, Priority::F1);
    assert_eq!(config.request.timeout_ms, 600_000);

    clear_env();
}

#[test]
#[serial]
fn test_config_from_env_rejects_excessive_retries() {
    clear_env();
    env::set_var("EVALUATOR_MAX_RETRIES", "70");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("EVALUATOR_MAX_RETRIES"));

    env::set_var("EVALUATOR_MAX_RETRIES", MAX_RETRIES_LIMIT.to_string());
    let config = Config::from_env().unwrap();
    assert_eq!(config.request.max_retries, MAX_RETRIES_LIMIT);

    clear_env();
}
