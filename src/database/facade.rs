//! The database facade
//!
//! One [`Database`] instance per process, constructed explicitly at startup
//! and shared by reference (`Arc`) with every caller. It owns the pool, the
//! circuit breaker, the notification bridge, and the background tasks
//! (breaker tick, health monitor, notification dispatch), and tears all of
//! them down exactly once on `close()`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sqlx::Connection;
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgRow, Postgres};
use sqlx::query::Query;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::health::{HealthMonitor, HealthProbeResult};
use crate::notifications::{NotificationBridge, NotificationPayload};
use crate::resilience::{CircuitBreaker, CircuitState, RetryPolicy};

use super::error::DatabaseError;
use super::pool::build_pool;

/// Queries slower than this log a warning with a statement preview
const SLOW_QUERY_MS: u128 = 1_000;

/// Longest statement preview included in slow-query warnings
const STATEMENT_PREVIEW_LEN: usize = 120;

// Facade lifecycle states
const STATE_READY: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Dynamically-typed statement parameter
///
/// The facade's contract is string SQL plus positional parameters; this enum
/// covers the value types upstream CRUD handlers bind.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
    Null,
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<serde_json::Value> for SqlParam {
    fn from(value: serde_json::Value) -> Self {
        SqlParam::Json(value)
    }
}

impl From<uuid::Uuid> for SqlParam {
    fn from(value: uuid::Uuid) -> Self {
        SqlParam::Uuid(value)
    }
}

/// Result rows of a `query` call
#[derive(Debug)]
pub struct RowSet {
    pub rows: Vec<PgRow>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Point-in-time pool statistics, computed on demand and never cached
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Connections currently held by the pool (idle + checked out)
    pub total_connections: u32,
    /// Idle connections ready to be handed out
    pub idle_connections: usize,
    /// Callers currently waiting in `acquire`
    pub waiting_acquirers: usize,
    /// Physical connections established over the pool's lifetime
    pub total_established: u64,
    /// Current circuit breaker state
    pub circuit_state: CircuitState,
}

/// Guard that tracks a caller waiting for a pooled slot
struct WaitingGuard<'a> {
    gauge: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn new(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::Relaxed);
        Self { gauge }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Resilient database facade
///
/// Every operation routes CircuitBreaker → RetryPolicy → pool acquire →
/// statement → release. Connections are released on all exit paths via the
/// pool guard's RAII. `transaction` deliberately bypasses the circuit
/// breaker, preserving the observed behavior of the system this core was
/// extracted from.
pub struct Database {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    bridge: Arc<NotificationBridge>,
    state: AtomicU8,
    waiting: AtomicUsize,
    established: Arc<AtomicU64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Database {
    /// Construct the facade and spawn its background tasks
    ///
    /// The pool connects lazily: the facade is Ready as soon as the pool
    /// object exists, physical connections are created on first use. Spawns
    /// the circuit breaker tick task, the health monitor (when enabled), and
    /// the notification dispatch task; all three are cancelled by `close()`.
    #[tracing::instrument(skip(config), fields(
        max_connections = config.database.max_connections,
        failure_threshold = config.resilience.circuit_breaker.failure_threshold,
    ))]
    pub async fn connect(config: AppConfig) -> Result<Arc<Self>, DatabaseError> {
        let established = Arc::new(AtomicU64::new(0));
        let pool = build_pool(&config.database, Arc::clone(&established))?;

        let circuit_breaker = Arc::new(CircuitBreaker::with_config(
            "database".to_string(),
            config.resilience.circuit_breaker.clone(),
        ));
        let retry = RetryPolicy::with_config(config.resilience.retry.clone());
        let bridge = Arc::new(NotificationBridge::new(
            pool.clone(),
            Duration::from_millis(config.database.connect_timeout_ms),
        ));

        let database = Arc::new(Self {
            pool,
            circuit_breaker: Arc::clone(&circuit_breaker),
            retry,
            bridge: Arc::clone(&bridge),
            state: AtomicU8::new(STATE_READY),
            waiting: AtomicUsize::new(0),
            established,
            tasks: Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();
        tasks.push(Self::spawn_breaker_tick(
            Arc::downgrade(&circuit_breaker),
            Duration::from_millis(config.resilience.circuit_breaker.tick_interval_ms),
        ));
        tasks.push(bridge.spawn());
        if config.health.enabled {
            let monitor = HealthMonitor::new(config.health.clone());
            tasks.push(monitor.spawn(Arc::downgrade(&database)));
        }
        *database.tasks.lock().unwrap() = tasks;

        tracing::info!("Database facade ready");
        Ok(database)
    }

    /// Periodic Open → HalfOpen re-check so the breaker heals without traffic
    fn spawn_breaker_tick(
        breaker: std::sync::Weak<CircuitBreaker>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(breaker) = breaker.upgrade() else {
                    break;
                };
                breaker.tick();
            }
        })
    }

    fn ensure_ready(&self) -> Result<(), DatabaseError> {
        if self.state.load(Ordering::Acquire) == STATE_READY {
            Ok(())
        } else {
            Err(DatabaseError::Closed)
        }
    }

    /// Acquire a pooled connection, retrying transient failures
    ///
    /// Only this step is retried: connection establishment and slot
    /// acquisition are idempotent, statements are not.
    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, DatabaseError> {
        let _waiting = WaitingGuard::new(&self.waiting);
        self.retry
            .retry("acquire connection", || self.pool.acquire())
            .await
            .map_err(DatabaseError::Connection)
    }

    /// Run a statement and return its rows
    ///
    /// Fails fast with [`DatabaseError::CircuitOpen`] when the breaker is
    /// open. The acquired connection is released on every exit path. Queries
    /// slower than one second log a warning with a truncated statement
    /// preview; parameter values are never logged.
    #[tracing::instrument(skip(self, sql, params), fields(
        circuit_state = %self.circuit_breaker.state(),
    ))]
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, DatabaseError> {
        self.ensure_ready()?;

        let started = Instant::now();
        let result = self
            .circuit_breaker
            .call(async {
                let mut conn = self.acquire().await?;
                let rows = bind_params(sqlx::query(sql), params)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(DatabaseError::Query)?;
                Ok::<_, DatabaseError>(RowSet { rows })
            })
            .await
            .map_err(DatabaseError::from);

        self.warn_if_slow(sql, started.elapsed());
        result
    }

    /// Run a DML statement and return the number of affected rows
    ///
    /// Same pipeline and failure semantics as [`query`](Self::query).
    #[tracing::instrument(skip(self, sql, params), fields(
        circuit_state = %self.circuit_breaker.state(),
    ))]
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, DatabaseError> {
        self.ensure_ready()?;

        let started = Instant::now();
        let result = self
            .circuit_breaker
            .call(async {
                let mut conn = self.acquire().await?;
                let done = bind_params(sqlx::query(sql), params)
                    .execute(&mut *conn)
                    .await
                    .map_err(DatabaseError::Query)?;
                Ok::<_, DatabaseError>(done.rows_affected())
            })
            .await
            .map_err(DatabaseError::from);

        self.warn_if_slow(sql, started.elapsed());
        result
    }

    fn warn_if_slow(&self, sql: &str, elapsed: Duration) {
        if elapsed.as_millis() > SLOW_QUERY_MS {
            tracing::warn!(
                duration_ms = elapsed.as_millis() as u64,
                statement = %statement_preview(sql),
                "Slow query detected"
            );
        }
    }

    /// Run `callback` inside a transaction on one acquired connection
    ///
    /// Commits when the callback returns `Ok`, rolls back before propagating
    /// any `Err`. Statements inside the callback execute in issuance order on
    /// the one connection, which is released on every exit path.
    ///
    /// Transactions do not route through the circuit breaker; only the
    /// connection acquisition is retried.
    #[tracing::instrument(skip(self, callback))]
    pub async fn transaction<T, F>(&self, callback: F) -> Result<T, DatabaseError>
    where
        F: for<'c> FnOnce(
                &'c mut PgConnection,
            )
                -> Pin<Box<dyn Future<Output = Result<T, sqlx::Error>> + Send + 'c>>
            + Send,
        T: Send,
    {
        self.ensure_ready()?;

        let mut conn = self.acquire().await?;
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("failed to begin: {}", e)))?;

        match callback(&mut tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Transaction(format!("failed to commit: {}", e)))?;
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                // Roll back explicitly so the error path is observable; the
                // original error is what propagates.
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        error = %rollback_err,
                        "Rollback failed after transaction error"
                    );
                }
                tracing::warn!(error = %err, "Transaction rolled back");
                Err(DatabaseError::Query(err))
            }
        }
    }

    /// Probe connectivity with a lightweight round-trip
    ///
    /// Routed through the circuit breaker and retry policy like any other
    /// operation. Reports whether the responding node is a primary or a
    /// replica. Never panics or throws out of a timer context: failures are
    /// logged and reported as `healthy = false`.
    pub async fn probe_health(&self) -> HealthProbeResult {
        let started = Instant::now();

        if self.ensure_ready().is_err() {
            return HealthProbeResult::unhealthy(started.elapsed());
        }

        let result = self
            .circuit_breaker
            .call(async {
                let mut conn = self.acquire().await?;
                let (in_recovery,): (bool,) = sqlx::query_as("SELECT pg_is_in_recovery()")
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DatabaseError::Query)?;
                Ok::<_, DatabaseError>(in_recovery)
            })
            .await;

        match result {
            Ok(in_recovery) => {
                let role = if in_recovery { "replica" } else { "primary" };
                tracing::debug!(
                    role,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Database health probe succeeded"
                );
                HealthProbeResult::healthy(in_recovery, started.elapsed())
            }
            Err(err) => {
                tracing::warn!(
                    error = %DatabaseError::from(err),
                    "Database health probe failed"
                );
                HealthProbeResult::unhealthy(started.elapsed())
            }
        }
    }

    /// Simple boolean connectivity check
    pub async fn test_connection(&self) -> bool {
        self.probe_health().await.healthy
    }

    /// Current pool statistics, computed on demand
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.pool.size(),
            idle_connections: self.pool.num_idle(),
            waiting_acquirers: self.waiting.load(Ordering::Relaxed),
            total_established: self.established.load(Ordering::Relaxed),
            circuit_state: self.circuit_breaker.state(),
        }
    }

    /// Register a listener for a notification channel
    ///
    /// At most one listener per channel; a second registration overwrites.
    pub fn on<F>(&self, channel: impl Into<String>, callback: F)
    where
        F: Fn(NotificationPayload) + Send + Sync + 'static,
    {
        self.bridge.on(channel, callback);
    }

    /// Remove the listener for a channel
    pub fn off(&self, channel: &str) -> bool {
        self.bridge.off(channel)
    }

    /// Broadcast a JSON-serialized payload on a channel
    pub async fn notify<P>(&self, channel: &str, payload: &P) -> Result<(), DatabaseError>
    where
        P: serde::Serialize + ?Sized,
    {
        self.ensure_ready()?;
        self.bridge.notify(channel, payload).await
    }

    /// Shut down the facade
    ///
    /// Idempotent: the first call cancels the background tasks and closes
    /// the pool; any further call is a no-op. Operations issued after close
    /// fail with [`DatabaseError::Closed`].
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(
                STATE_READY,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!("Database close called more than once, ignoring");
            return;
        }

        tracing::info!("Database facade shutting down");

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }

        self.pool.close().await;
        self.state.store(STATE_CLOSED, Ordering::Release);

        tracing::info!("Database facade closed");
    }

    /// Whether `close()` has completed
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }

    /// Run the graceful-shutdown path on SIGTERM or ctrl-c
    ///
    /// Spawned once at process start; the returned handle resolves after
    /// `close()` has completed.
    pub fn install_signal_handler(self: Arc<Self>) -> JoinHandle<()> {
        let database = self;
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("Termination signal received, closing database");
            database.close().await;
        })
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("circuit_breaker", &self.circuit_breaker)
            .field("bridge", &self.bridge)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bind dynamic parameters onto a prepared query
fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v.clone()),
            SqlParam::Uuid(v) => query.bind(*v),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Truncated statement text for slow-query warnings
fn statement_preview(sql: &str) -> String {
    if sql.len() <= STATEMENT_PREVIEW_LEN {
        return sql.to_string();
    }
    let cut = sql
        .char_indices()
        .take_while(|(i, _)| *i < STATEMENT_PREVIEW_LEN)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!("{}...", &sql[..cut])
}
