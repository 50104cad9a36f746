pub mod app;
pub mod database;
pub mod health;
pub mod resilience;

pub use app::AppConfig;
pub use database::DatabaseConfig;
pub use health::HealthConfig;
pub use resilience::{CircuitBreakerConfig, ResilienceConfig, RetryConfig};

/// Configuration loading or validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source file or environment variable could not be read or parsed
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    /// A loaded value failed semantic validation
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Semantic validation for configuration sections
///
/// Every section validates itself after deserialization; `AppConfig`
/// validates all nested sections.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Construct a configuration section entirely from documented defaults
pub trait WithDefaults {
    fn with_defaults() -> Self;
}

/// Load the application configuration from files and environment variables
pub fn load() -> Result<AppConfig, ConfigError> {
    app::load_config()
}
