use serde::{Deserialize, Serialize};

use super::{ConfigError, DatabaseConfig, HealthConfig, ResilienceConfig, Validate, WithDefaults};

/// Top-level configuration that aggregates all config sections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration (endpoint, SSL, pool sizing, timeouts)
    #[serde(default = "DatabaseConfig::with_defaults")]
    pub database: DatabaseConfig,
    /// Resilience configuration (circuit breaker, retry)
    #[serde(default = "ResilienceConfig::with_defaults")]
    pub resilience: ResilienceConfig,
    /// Health monitor configuration
    #[serde(default = "HealthConfig::with_defaults")]
    pub health: HealthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.resilience.validate()?;
        self.health.validate()?;
        Ok(())
    }
}

impl WithDefaults for AppConfig {
    fn with_defaults() -> Self {
        Self {
            database: DatabaseConfig::with_defaults(),
            resilience: ResilienceConfig::with_defaults(),
            health: HealthConfig::with_defaults(),
        }
    }
}

/// Load configuration from files and environment variables
///
/// Configuration loading follows this precedence (highest to lowest):
/// 1. Environment variables: RESILIENT_PG__DATABASE__MAX_CONNECTIONS=50
/// 2. config/local.toml (git-ignored, developer overrides)
/// 3. config/{APP_ENV}.toml (development/staging/production)
/// 4. config/default.toml (base defaults)
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};

    // Determine the environment
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    // Build configuration with layered sources
    let config = Config::builder()
        // Layer 1: Base defaults
        .add_source(File::with_name("config/default").required(false))
        // Layer 2: Environment-specific overrides
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        // Layer 3: Local developer overrides (git-ignored)
        .add_source(File::with_name("config/local").required(false))
        // Layer 4: Environment variables (highest precedence)
        .add_source(Environment::with_prefix("RESILIENT_PG").separator("__"))
        .build()?;

    // Deserialize into AppConfig
    let app_config: AppConfig = config.try_deserialize()?;

    // Validate the configuration
    app_config.validate()?;

    Ok(app_config)
}
