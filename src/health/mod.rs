//! Periodic database health monitoring
//!
//! The monitor probes the pool at a fixed interval through the facade's
//! breaker-and-retry-wrapped round trip. A failed probe logs a warning and
//! the timer keeps running; nothing escapes the tick.

use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::HealthConfig;
use crate::database::Database;

/// Outcome of a single connectivity probe
///
/// Transient: logged and used to decide whether to warn, never persisted.
#[derive(Debug, Clone)]
pub struct HealthProbeResult {
    /// Whether the round trip succeeded
    pub healthy: bool,
    /// Whether the responding node is in recovery (a replica), when known
    pub in_recovery: Option<bool>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl HealthProbeResult {
    pub(crate) fn healthy(in_recovery: bool, latency: Duration) -> Self {
        Self {
            healthy: true,
            in_recovery: Some(in_recovery),
            latency_ms: latency.as_millis() as u64,
            checked_at: Utc::now(),
        }
    }

    pub(crate) fn unhealthy(latency: Duration) -> Self {
        Self {
            healthy: false,
            in_recovery: None,
            latency_ms: latency.as_millis() as u64,
            checked_at: Utc::now(),
        }
    }

    /// Human-readable node role, when the probe could determine it
    pub fn role(&self) -> Option<&'static str> {
        self.in_recovery
            .map(|in_recovery| if in_recovery { "replica" } else { "primary" })
    }
}

/// Periodic health probe runner
pub struct HealthMonitor {
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Spawn the probe task
    ///
    /// Holds only a weak reference to the facade: the task exits on its own
    /// once the facade is gone, and `close()` aborts it explicitly. Probe
    /// failures are contained inside the tick.
    pub fn spawn(&self, database: Weak<Database>) -> JoinHandle<()> {
        let interval = Duration::from_millis(self.config.interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; skip it
            // so the probe does not race construction.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(database) = database.upgrade() else {
                    break;
                };

                let probe = database.probe_health().await;
                if probe.healthy {
                    tracing::debug!(
                        latency_ms = probe.latency_ms,
                        role = probe.role().unwrap_or("unknown"),
                        "Health probe succeeded"
                    );
                } else {
                    tracing::warn!(
                        latency_ms = probe.latency_ms,
                        "Health probe failed, database degraded"
                    );
                }
            }
        })
    }
}
