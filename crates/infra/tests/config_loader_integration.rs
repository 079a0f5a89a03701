//! Integration tests for configuration loader
//!
//! Tests the end-to-end path from a configuration file to a working
//! executor and resolver.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use apiguard_infra::{config, EndpointFallbackResolver, ResilientExecutor};
use tempfile::NamedTempFile;

fn write_config(contents: &str, extension: &str) -> std::path::PathBuf {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");

    let path = temp_file.path().with_extension(extension);
    std::fs::copy(temp_file.path(), &path).expect("Failed to copy file");
    path
}

#[test]
fn test_load_config_from_json_file_builds_executor() {
    let path = write_config(
        r#"{
            "timeout_secs": 20,
            "max_attempts": 4,
            "rate_limit_delay_ms": 250,
            "endpoint_cache_ttl_secs": 900,
            "operation_timeouts": { "search": 90 }
        }"#,
        "json",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();
    let config = result.expect("Failed to load config from JSON file");

    let executor = ResilientExecutor::from_config(&config).expect("executor from config");
    assert_eq!(executor.timeout_for("search"), Duration::from_secs(90));
    assert_eq!(executor.timeout_for("search_results"), Duration::from_secs(30));
    assert_eq!(executor.timeout_for("unlisted"), Duration::from_secs(20));
    assert_eq!(executor.retry_config().max_attempts, 4);
    assert_eq!(executor.limiter().min_interval(), Duration::from_millis(250));
    assert_eq!(executor.circuit_breaker_config().failure_threshold, 8);

    let resolver = EndpointFallbackResolver::from_config(Arc::new(executor), &config);
    assert_eq!(resolver.diagnostics().cache_ttl, Duration::from_secs(900));
}

#[test]
fn test_load_config_from_toml_file() {
    let path = write_config(
        r#"
timeout_secs = 60
max_attempts = 2

[circuit_breaker]
failure_threshold = 3
recovery_timeout_secs = 120
"#,
        "toml",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();
    let config = result.expect("Failed to load config from TOML file");

    let executor = ResilientExecutor::from_config(&config).expect("executor from config");
    let breaker = executor.circuit_breaker_config();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.recovery_timeout, Duration::from_secs(120));
    assert_eq!(executor.timeout_for("search"), Duration::from_secs(120));
}

#[test]
fn test_out_of_range_file_is_rejected() {
    let path = write_config(r#"{ "timeout_secs": 0 }"#, "json");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    let err = result.expect_err("zero timeout must be rejected");
    assert!(err.to_string().contains("timeout_secs"), "unexpected message: {err}");
}
