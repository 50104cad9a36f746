//! Circuit breaker for database operations
//!
//! Tracks consecutive failures of an arbitrary async operation and gates
//! execution through three states. Independent of any specific database
//! library; the facade wraps every query and connectivity probe with it.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────┐
//! │ Closed  │ ◄──────────────────┐
//! │ (Normal)│                    │
//! └────┬────┘                    │ success_threshold
//!      │ failure_threshold       │ consecutive successes
//!      │ consecutive failures    │
//!      ▼                         │
//! ┌─────────┐  recovery timeout ┌┴──────────┐
//! │  Open   │───────────────────► HalfOpen  │
//! │(Failing)│                   │ (Testing) │
//! └─────────┘◄──────────────────└───────────┘
//!                any failure
//! ```
//!
//! The Open→HalfOpen transition happens either lazily on the next `call`
//! once the recovery timeout has elapsed, or from the periodic [`tick`]
//! driven by the facade, so the breaker self-heals even with no traffic.
//!
//! [`tick`]: CircuitBreaker::tick

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, allowing all requests through
    Closed,
    /// Failing state, rejecting all requests until the recovery timeout expires
    Open,
    /// Testing state, allowing limited requests to check if the database recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Thread-safe statistics tracking for the circuit breaker
#[derive(Debug)]
struct CircuitBreakerStats {
    /// Number of consecutive failures
    consecutive_failures: AtomicU64,
    /// Number of consecutive successes
    consecutive_successes: AtomicU64,
    /// Total number of calls attempted
    total_calls: AtomicU64,
    /// Total number of failed calls
    total_failures: AtomicU64,
    /// Unix timestamp of last failure (milliseconds)
    last_failure_time: AtomicU64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl CircuitBreakerStats {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU64::new(0),
            consecutive_successes: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            last_failure_time: AtomicU64::new(0),
        }
    }

    /// Record a successful call
    fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.consecutive_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed call
    fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.last_failure_time.store(now_millis(), Ordering::Relaxed);
    }

    fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn consecutive_successes(&self) -> u64 {
        self.consecutive_successes.load(Ordering::Relaxed)
    }

    fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Milliseconds elapsed since the last recorded failure
    fn millis_since_last_failure(&self) -> u64 {
        let last_failure = self.last_failure_time.load(Ordering::Relaxed);
        if last_failure == 0 {
            return u64::MAX; // Never failed
        }
        now_millis().saturating_sub(last_failure)
    }
}

/// Circuit breaker error
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting requests without invoking the operation
    #[error("circuit breaker is open for {name}")]
    Open { name: String },
    /// The underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Circuit breaker gating access to a single database endpoint
///
/// # Thread Safety
///
/// Fully thread-safe: atomics for statistics, a mutex for state
/// transitions. Concurrent callers reporting success/failure cannot under-
/// or over-count — the counters are updated atomically and state changes
/// happen under the lock. Clone freely; clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    /// Name for logging and debugging
    name: String,
    /// Current circuit state
    state: Arc<Mutex<CircuitState>>,
    /// Statistics tracker
    stats: Arc<CircuitBreakerStats>,
    /// Configuration
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new(name: String) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration
    pub fn with_config(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(CircuitState::Closed)),
            stats: Arc::new(CircuitBreakerStats::new()),
            config,
        }
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        *self.state.lock().unwrap()
    }

    /// Get the circuit breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get total number of calls
    pub fn total_calls(&self) -> u64 {
        self.stats.total_calls()
    }

    /// Get total number of failures
    pub fn total_failures(&self) -> u64 {
        self.stats.total_failures()
    }

    /// Get failure rate (0.0 to 1.0)
    pub fn failure_rate(&self) -> f64 {
        let total = self.stats.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.stats.total_failures() as f64 / total as f64
    }

    /// Execute an operation protected by the circuit breaker
    ///
    /// # State Transitions
    ///
    /// - **Closed → Open**: when consecutive failures reach `failure_threshold`
    /// - **Open → HalfOpen**: when `recovery_timeout_ms` has elapsed since the
    ///   last failure
    /// - **HalfOpen → Closed**: when consecutive successes reach
    ///   `success_threshold` (default 1 — the next success closes)
    /// - **HalfOpen → Open**: on any failure
    ///
    /// While Open and inside the recovery window the wrapped future is never
    /// polled; the call fails immediately with [`CircuitBreakerError::Open`].
    /// Underlying errors are rethrown as [`CircuitBreakerError::Inner`] after
    /// bookkeeping, never swallowed.
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        // Check current state and handle transitions
        let current_state = {
            let mut state = self.state.lock().unwrap();

            match *state {
                CircuitState::Open => {
                    let elapsed = self.stats.millis_since_last_failure();
                    if elapsed >= self.config.recovery_timeout_ms {
                        *state = CircuitState::HalfOpen;
                        tracing::info!(
                            circuit_breaker = %self.name,
                            state = "Open -> HalfOpen",
                            elapsed_ms = elapsed,
                            "Circuit breaker transitioning to HalfOpen"
                        );
                        CircuitState::HalfOpen
                    } else {
                        // Still open, reject without invoking the operation
                        return Err(CircuitBreakerError::Open {
                            name: self.name.clone(),
                        });
                    }
                }
                state => state,
            }
        };

        // Execute the operation
        match f.await {
            Ok(result) => {
                self.stats.record_success();

                if current_state == CircuitState::HalfOpen
                    && self.stats.consecutive_successes() >= self.config.success_threshold as u64
                {
                    let mut state = self.state.lock().unwrap();
                    if *state == CircuitState::HalfOpen {
                        *state = CircuitState::Closed;
                        tracing::info!(
                            circuit_breaker = %self.name,
                            state = "HalfOpen -> Closed",
                            "Circuit breaker closed after successful recovery"
                        );
                    }
                }

                Ok(result)
            }
            Err(err) => {
                self.stats.record_failure();

                let mut state = self.state.lock().unwrap();

                match *state {
                    CircuitState::Closed => {
                        if self.stats.consecutive_failures()
                            >= self.config.failure_threshold as u64
                        {
                            *state = CircuitState::Open;
                            tracing::warn!(
                                circuit_breaker = %self.name,
                                state = "Closed -> Open",
                                consecutive_failures = self.stats.consecutive_failures(),
                                failure_threshold = self.config.failure_threshold,
                                "Circuit breaker opened due to consecutive failures"
                            );
                        }
                    }
                    CircuitState::HalfOpen => {
                        // Any failure in HalfOpen reopens the circuit
                        *state = CircuitState::Open;
                        tracing::warn!(
                            circuit_breaker = %self.name,
                            state = "HalfOpen -> Open",
                            "Circuit breaker re-opened after failure in HalfOpen state"
                        );
                    }
                    CircuitState::Open => {
                        // Already open, nothing further to do
                    }
                }

                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Re-check Open → HalfOpen eligibility without traffic
    ///
    /// Driven by a periodic facade-owned task so the breaker can self-heal
    /// even when no caller issues operations.
    pub fn tick(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == CircuitState::Open {
            let elapsed = self.stats.millis_since_last_failure();
            if elapsed >= self.config.recovery_timeout_ms {
                *state = CircuitState::HalfOpen;
                tracing::info!(
                    circuit_breaker = %self.name,
                    state = "Open -> HalfOpen",
                    elapsed_ms = elapsed,
                    "Circuit breaker transitioned to HalfOpen by background tick"
                );
            }
        }
    }

    /// Manually reset the circuit breaker to Closed state
    ///
    /// Useful for testing or administrative purposes. In production, prefer
    /// letting the circuit breaker manage state automatically.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        *state = CircuitState::Closed;
        // Stats are intentionally kept, only state is reset
        tracing::info!(
            circuit_breaker = %self.name,
            "Circuit breaker manually reset to Closed"
        );
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("consecutive_failures", &self.stats.consecutive_failures())
            .field("consecutive_successes", &self.stats.consecutive_successes())
            .field("total_calls", &self.stats.total_calls())
            .field("total_failures", &self.stats.total_failures())
            .field("config", &self.config)
            .finish()
    }
}
