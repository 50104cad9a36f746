//! Notification bridge implementation
//!
//! A dedicated listening connection subscribes to the fixed channel set and
//! dispatches incoming `(channel, payload)` events to registered listeners.
//! The listened channels are a property of the bridge, not of any one
//! connection: when the listening connection is lost, the bridge reconnects
//! and re-subscribes to the full set.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use sqlx::postgres::{PgListener, PgPool};
use tokio::task::JoinHandle;

use crate::database::DatabaseError;

/// Fixed set of logical change channels
pub const CHANNELS: [&str; 3] = ["offers_changes", "products_changes", "orders_changes"];

/// Delay before re-establishing a lost listening connection
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Payload delivered to a channel listener
///
/// Payloads are conventionally JSON-encoded; when parsing fails the raw
/// string is passed through instead, so an event is never dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    /// Payload parsed as structured JSON
    Json(serde_json::Value),
    /// Raw payload string, used when JSON parsing fails
    Raw(String),
}

type Listener = Arc<dyn Fn(NotificationPayload) + Send + Sync>;

/// Bridge between driver-level notifications and in-process listeners
///
/// At most one listener per channel: registering a second listener on the
/// same channel overwrites the first.
pub struct NotificationBridge {
    pool: PgPool,
    listeners: DashMap<String, Listener>,
    connect_timeout: Duration,
}

impl NotificationBridge {
    /// Create a bridge broadcasting and listening through `pool`
    pub fn new(pool: PgPool, connect_timeout: Duration) -> Self {
        Self {
            pool,
            listeners: DashMap::new(),
            connect_timeout,
        }
    }

    /// Register a listener for `channel`, replacing any existing one
    pub fn on<F>(&self, channel: impl Into<String>, callback: F)
    where
        F: Fn(NotificationPayload) + Send + Sync + 'static,
    {
        let channel = channel.into();
        if self.listeners.insert(channel.clone(), Arc::new(callback)).is_some() {
            tracing::debug!(channel = %channel, "Replaced existing notification listener");
        }
    }

    /// Remove the listener for `channel`, returning whether one existed
    pub fn off(&self, channel: &str) -> bool {
        self.listeners.remove(channel).is_some()
    }

    /// Broadcast `payload` on `channel`
    ///
    /// The payload is JSON-serialized and sent with `pg_notify`, reaching
    /// every listening process subscribed to the channel, including this one.
    pub async fn notify<P>(&self, channel: &str, payload: &P) -> Result<(), DatabaseError>
    where
        P: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(payload)?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(encoded)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        tracing::debug!(channel = %channel, "Notification broadcast");
        Ok(())
    }

    /// Dispatch an incoming raw event to the registered listener
    ///
    /// Parsing failures fall back to the raw string; a panicking listener is
    /// contained and logged. Events for channels without a listener are
    /// dropped silently at debug level.
    pub(crate) fn dispatch(&self, channel: &str, raw: &str) {
        let Some(listener) = self.listeners.get(channel).map(|l| Arc::clone(&l)) else {
            tracing::debug!(channel = %channel, "Notification received with no registered listener");
            return;
        };

        let payload = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => NotificationPayload::Json(value),
            Err(err) => {
                tracing::debug!(
                    channel = %channel,
                    error = %err,
                    "Notification payload is not valid JSON, passing raw string"
                );
                NotificationPayload::Raw(raw.to_string())
            }
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(payload)));
        if result.is_err() {
            tracing::error!(channel = %channel, "Notification listener panicked");
        }
    }

    /// Spawn the listening task
    ///
    /// Owns the dedicated listening connection for the bridge's lifetime;
    /// the facade stores the handle and aborts it on `close()`. Connection
    /// loss triggers reconnect and re-subscription to the full channel set.
    pub(crate) fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let bridge = self;
        tokio::spawn(async move {
            loop {
                let mut listener = match tokio::time::timeout(
                    bridge.connect_timeout,
                    PgListener::connect_with(&bridge.pool),
                )
                .await
                {
                    Ok(Ok(listener)) => listener,
                    Ok(Err(err)) => {
                        tracing::warn!(
                            error = %err,
                            retry_in_secs = RECONNECT_DELAY.as_secs(),
                            "Failed to establish notification listener connection"
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = bridge.connect_timeout.as_millis() as u64,
                            "Notification listener connection attempt timed out"
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                };

                if let Err(err) = listener.listen_all(CHANNELS.iter().copied()).await {
                    tracing::warn!(error = %err, "Failed to subscribe to notification channels");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }

                tracing::info!(channels = ?CHANNELS, "Notification bridge subscribed");

                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            bridge.dispatch(notification.channel(), notification.payload());
                        }
                        Err(err) => {
                            // Reconnect and re-subscribe from the outer loop
                            tracing::warn!(
                                error = %err,
                                "Notification listener connection lost"
                            );
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("channels", &CHANNELS)
            .field("registered_listeners", &self.listeners.len())
            .finish()
    }
}
