use serde::{Deserialize, Serialize};

use super::{ConfigError, Validate, WithDefaults};

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Enable the periodic health probe
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Probe interval in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    30_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval(),
        }
    }
}

impl Validate for HealthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "health.interval_ms must be > 0 when the health monitor is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl WithDefaults for HealthConfig {
    fn with_defaults() -> Self {
        Self::default()
    }
}
