//! Resilience patterns for fault-tolerant database access
//!
//! # Available Patterns
//!
//! - **Circuit Breaker**: Prevents cascading failures by temporarily blocking
//!   operations against a failing database, giving it time to recover.
//! - **Retry**: Bounded retries with capped exponential backoff, applied to
//!   connection acquisition (never to failed statements, which could
//!   duplicate write effects).

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use retry::RetryPolicy;
