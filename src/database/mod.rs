//! Database facade with circuit breaker, retry, and pool wiring
//!
//! [`Database`] is the single entry point every upstream caller goes
//! through: `query`/`execute`/`transaction` route
//! CircuitBreaker → RetryPolicy → pool acquire → statement → release.

mod error;
mod facade;
mod pool;

pub use error::DatabaseError;
pub use facade::{Database, PoolStats, RowSet, SqlParam};
