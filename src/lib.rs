#![deny(warnings)]

//! Resilient database access core for PostgreSQL.
//!
//! Wraps a `sqlx` connection pool with a circuit breaker, bounded retry with
//! exponential backoff, periodic health probing, and a LISTEN/NOTIFY bridge
//! that dispatches cross-process change events to in-process listeners.
//!
//! Upstream callers (route handlers, admin scripts) consume exactly the
//! [`Database`] facade: `query`, `execute`, `transaction`, `test_connection`,
//! `pool_stats`, `on`/`off`/`notify`, and `close`.

// Re-export all public modules
pub mod config;
pub mod database;
pub mod health;
pub mod notifications;
pub mod resilience;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use database::{Database, DatabaseError, PoolStats, RowSet, SqlParam};
pub use health::{HealthMonitor, HealthProbeResult};
pub use notifications::{CHANNELS, NotificationBridge, NotificationPayload};
pub use resilience::{CircuitBreaker, CircuitBreakerError, CircuitState, RetryPolicy};
