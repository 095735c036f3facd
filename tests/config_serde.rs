#![cfg(feature = "serde")]

use fetch_governor::{ConfigError, GovernorConfig, RequestGovernor};

#[test]
fn test_partial_config_takes_defaults() {
    let config: GovernorConfig = serde_json::from_str(
        r#"{
            "max_requests": 30,
            "window_secs": 120,
            "extra_retry_keywords": ["too many requests"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.max_requests, 30);
    assert_eq!(config.window_secs, 120);
    assert_eq!(config.cache_capacity, 1000);
    assert_eq!(config.cache_ttl_secs, 300);
    assert_eq!(config.max_memory_mb, 500);
    assert_eq!(config.max_cpu_percent, 80.0);
    assert_eq!(config.max_wait_rounds, 32);

    let governor = RequestGovernor::<String>::from_config(&config).unwrap();
    assert_eq!(governor.limiter().max_requests(), 30);
    assert!(governor
        .classifier()
        .classify("429 Too Many Requests")
        .is_retry());
}

#[test]
fn test_empty_document_is_default() {
    let config: GovernorConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, GovernorConfig::default());
}

#[test]
fn test_invalid_values_fail_validation_not_parsing() {
    let config: GovernorConfig =
        serde_json::from_str(r#"{ "cache_ttl_secs": 0, "max_cpu_percent": -5.0 }"#).unwrap();

    assert_eq!(config.validate(), Err(ConfigError::ZeroTtl));
}

#[test]
fn test_round_trip_preserves_keywords() {
    let config = GovernorConfig {
        extra_retry_keywords: vec!["reset by peer".to_string()],
        ..GovernorConfig::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: GovernorConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
