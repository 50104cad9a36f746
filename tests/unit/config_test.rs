//! Unit tests for configuration loading
//!
//! Covers loading documented defaults, environment variable precedence, and
//! validation of invalid values.

use resilient_pg::config::{
    self, CircuitBreakerConfig, DatabaseConfig, HealthConfig, RetryConfig, Validate,
};
use serial_test::serial;
use std::env;

mod utils {
    /// Clean up environment variables with the RESILIENT_PG prefix
    pub fn clean_env_vars() {
        let keys: Vec<String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("RESILIENT_PG"))
            .map(|(k, _)| k)
            .collect();

        for key in keys {
            unsafe { std::env::remove_var(&key) };
        }
    }
}

#[tokio::test]
#[serial]
async fn test_load_default_config_success() {
    utils::clean_env_vars();
    unsafe { env::remove_var("APP_ENV") };

    let config = config::load();
    assert!(
        config.is_ok(),
        "Failed to load default configuration: {:?}",
        config.err()
    );

    let config = config.unwrap();

    // Database defaults
    assert!(!config.database.ssl);
    assert_eq!(config.database.max_connections, 20);
    assert_eq!(config.database.min_connections, 2);
    assert_eq!(config.database.idle_timeout_ms, 30_000);
    assert_eq!(config.database.connect_timeout_ms, 10_000);
    assert_eq!(config.database.acquire_timeout_ms, 60_000);

    // Resilience defaults
    assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.resilience.circuit_breaker.recovery_timeout_ms, 30_000);
    assert_eq!(config.resilience.circuit_breaker.tick_interval_ms, 5_000);
    assert_eq!(config.resilience.retry.max_attempts, 3);
    assert_eq!(config.resilience.retry.initial_delay_ms, 1_000);
    assert_eq!(config.resilience.retry.max_delay_ms, 30_000);

    // Health defaults
    assert!(config.health.enabled);
    assert_eq!(config.health.interval_ms, 30_000);

    utils::clean_env_vars();
}

#[tokio::test]
#[serial]
async fn test_environment_variable_override() {
    utils::clean_env_vars();
    unsafe {
        env::remove_var("APP_ENV");
        env::set_var("RESILIENT_PG__DATABASE__MAX_CONNECTIONS", "50");
        env::set_var(
            "RESILIENT_PG__DATABASE__URL",
            "postgres://override@db.test:5432/shop",
        );
        env::set_var("RESILIENT_PG__RESILIENCE__RETRY__MAX_ATTEMPTS", "7");
        env::set_var("RESILIENT_PG__HEALTH__ENABLED", "false");
    }

    let config = config::load().unwrap();

    assert_eq!(config.database.max_connections, 50);
    assert_eq!(config.database.url, "postgres://override@db.test:5432/shop");
    assert_eq!(config.resilience.retry.max_attempts, 7);
    assert!(!config.health.enabled);

    utils::clean_env_vars();
}

#[tokio::test]
#[serial]
async fn test_invalid_env_value_is_rejected() {
    utils::clean_env_vars();
    unsafe {
        env::remove_var("APP_ENV");
        // min > max must fail validation
        env::set_var("RESILIENT_PG__DATABASE__MIN_CONNECTIONS", "100");
        env::set_var("RESILIENT_PG__DATABASE__MAX_CONNECTIONS", "10");
    }

    let config = config::load();
    assert!(config.is_err());

    utils::clean_env_vars();
}

#[tokio::test]
async fn test_database_config_validation() {
    let valid = DatabaseConfig::default();
    assert!(valid.validate().is_ok());

    let empty_url = DatabaseConfig {
        url: String::new(),
        ..DatabaseConfig::default()
    };
    assert!(empty_url.validate().is_err());

    let zero_acquire = DatabaseConfig {
        acquire_timeout_ms: 0,
        ..DatabaseConfig::default()
    };
    assert!(zero_acquire.validate().is_err());
}

#[tokio::test]
async fn test_circuit_breaker_config_validation() {
    assert!(CircuitBreakerConfig::default().validate().is_ok());

    let zero_threshold = CircuitBreakerConfig {
        failure_threshold: 0,
        ..CircuitBreakerConfig::default()
    };
    assert!(zero_threshold.validate().is_err());

    let zero_tick = CircuitBreakerConfig {
        tick_interval_ms: 0,
        ..CircuitBreakerConfig::default()
    };
    assert!(zero_tick.validate().is_err());
}

#[tokio::test]
async fn test_retry_config_validation() {
    assert!(RetryConfig::default().validate().is_ok());

    let inverted_delays = RetryConfig {
        initial_delay_ms: 60_000,
        max_delay_ms: 1_000,
        ..RetryConfig::default()
    };
    assert!(inverted_delays.validate().is_err());

    let negative_multiplier = RetryConfig {
        multiplier: -1.0,
        ..RetryConfig::default()
    };
    assert!(negative_multiplier.validate().is_err());
}

#[tokio::test]
async fn test_health_config_validation() {
    assert!(HealthConfig::default().validate().is_ok());

    let zero_interval = HealthConfig {
        enabled: true,
        interval_ms: 0,
    };
    assert!(zero_interval.validate().is_err());
}
