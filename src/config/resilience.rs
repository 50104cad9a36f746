use serde::{Deserialize, Serialize};

use super::{ConfigError, Validate, WithDefaults};

/// Resilience configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker configuration
    #[serde(default = "CircuitBreakerConfig::default")]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration
    #[serde(default = "RetryConfig::default")]
    pub retry: RetryConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Number of successes needed to close the circuit from half-open
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Milliseconds the circuit stays open before allowing a probe call
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_ms: u64,
    /// Interval of the background task that re-checks open circuits (ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Ceiling for the exponential backoff delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

// Default functions for CircuitBreakerConfig
fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    1
}

fn default_recovery_timeout() -> u64 {
    30_000
}

fn default_tick_interval() -> u64 {
    5_000
}

// Default functions for RetryConfig
fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            recovery_timeout_ms: default_recovery_timeout(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl Validate for ResilienceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

impl Validate for CircuitBreakerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.circuit_breaker.failure_threshold must be > 0".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.circuit_breaker.success_threshold must be > 0".to_string(),
            ));
        }
        if self.recovery_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.circuit_breaker.recovery_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.circuit_breaker.tick_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Validate for RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.retry.max_attempts must be > 0".to_string(),
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.retry.initial_delay_ms must be > 0".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "resilience.retry.initial_delay_ms must be <= max_delay_ms".to_string(),
            ));
        }
        if self.multiplier <= 0.0 {
            return Err(ConfigError::ValidationError(
                "resilience.retry.multiplier must be > 0.0".to_string(),
            ));
        }
        Ok(())
    }
}

impl WithDefaults for ResilienceConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}

impl WithDefaults for CircuitBreakerConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}

impl WithDefaults for RetryConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 1);
        assert_eq!(config.recovery_timeout_ms, 30_000);
        assert_eq!(config.tick_interval_ms, 5_000);
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 1_000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.multiplier, 2.0);
    }

    #[test]
    fn test_circuit_breaker_config_validation_zero_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_circuit_breaker_config_validation_zero_timeout() {
        let config = CircuitBreakerConfig {
            recovery_timeout_ms: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation_zero_max_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation_initial_delay_greater_than_max() {
        let config = RetryConfig {
            initial_delay_ms: 60_000,
            max_delay_ms: 100,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation_zero_multiplier() {
        let config = RetryConfig {
            multiplier: 0.0,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
