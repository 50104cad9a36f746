use thiserror::Error;

use crate::resilience::CircuitBreakerError;

/// Database operation error
///
/// Callers should treat [`DatabaseError::CircuitOpen`] as "temporarily
/// unavailable", not as a data error: the operation was never attempted.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Circuit breaker is open, the operation was not attempted
    #[error("database circuit breaker is open, service temporarily unavailable")]
    CircuitOpen,

    /// Acquiring or establishing a connection failed (retried before surfacing)
    #[error("database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// The database rejected or failed the statement (never retried)
    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Begin/commit/rollback plumbing failed
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The facade has been closed; no further operations are accepted
    #[error("database has been closed")]
    Closed,

    /// Connect options could not be built from the configuration
    #[error("invalid database configuration: {0}")]
    Config(String),

    /// A notification payload could not be serialized before broadcast
    #[error("notification payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<CircuitBreakerError<DatabaseError>> for DatabaseError {
    fn from(error: CircuitBreakerError<DatabaseError>) -> Self {
        match error {
            CircuitBreakerError::Open { .. } => DatabaseError::CircuitOpen,
            CircuitBreakerError::Inner(err) => err,
        }
    }
}
