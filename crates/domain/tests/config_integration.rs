//! Integration tests for configuration parsing and derived settings

use std::time::Duration;

use apiguard_domain::{Failure, LogFormat, ResilienceConfig};

/// Validates a complete JSON document end to end.
///
/// # Test Steps
/// 1. Parse a JSON document with every section present
/// 2. Validate it
/// 3. Confirm the derived retry, circuit and timeout settings
#[test]
fn test_full_json_document() {
    let json = r#"{
        "timeout_secs": 60,
        "max_attempts": 4,
        "rate_limit_delay_ms": 250,
        "circuit_breaker": {
            "failure_threshold": null,
            "recovery_timeout_secs": 120,
            "success_threshold": 2,
            "half_open_max_calls": 1
        },
        "endpoint_cache_ttl_secs": 600,
        "operation_timeouts": { "search": 300 },
        "logging": { "level": "debug", "format": "json" }
    }"#;

    let config: ResilienceConfig = serde_json::from_str(json).expect("document should parse");
    config.validate().expect("document should be valid");

    assert_eq!(config.retry_base_delay(), Duration::from_millis(250));
    assert_eq!(config.retry_max_delay(), Duration::from_secs(30));
    assert_eq!(config.circuit_failure_threshold(), 8);
    assert_eq!(config.circuit_recovery_timeout(), Duration::from_secs(120));
    assert_eq!(config.endpoint_cache_ttl(), Duration::from_secs(600));
    assert_eq!(config.logging.format, LogFormat::Json);

    let table = config.operation_timeout_table();
    assert_eq!(table["search"], Duration::from_secs(300));
    assert_eq!(table["search_results"], Duration::from_secs(90));
    assert_eq!(config.warnings().len(), 1);
}

#[test]
fn test_invalid_document_reports_config_failure() {
    let config: ResilienceConfig =
        serde_json::from_str(r#"{ "max_attempts": 25 }"#).expect("document should parse");

    let err = config.validate().unwrap_err();
    assert!(matches!(err, Failure::Config { .. }));
    assert!(!err.is_client_error());
}
