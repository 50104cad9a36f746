//! Facade integration tests against a live PostgreSQL instance
//!
//! Every test acquires its own facade and closes it; tests whose setup
//! cannot find TEST_DATABASE_URL return early (skipped).

use std::sync::Arc;
use std::time::Duration;

use resilient_pg::{AppConfig, Database, DatabaseError, NotificationPayload, SqlParam};
use sqlx::Row;

async fn connect() -> Option<Arc<Database>> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let mut config = AppConfig::default();
    config.database.url = url;
    config.database.max_connections = 5;
    // Keep retry backoff short so failure-path tests stay fast
    config.resilience.retry.initial_delay_ms = 10;
    config.resilience.retry.max_delay_ms = 50;
    config.health.enabled = false;
    Database::connect(config).await.ok()
}

fn unique_table() -> String {
    format!("resilient_pg_it_{}", uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_query_round_trip() {
    let Some(db) = connect().await else { return };

    let rows = db
        .query("SELECT $1::text AS greeting", &[SqlParam::from("hello")])
        .await
        .expect("query failed");

    assert_eq!(rows.len(), 1);
    let greeting: String = rows.rows[0].get("greeting");
    assert_eq!(greeting, "hello");

    db.close().await;
}

#[tokio::test]
async fn test_query_error_surfaces_and_pool_recovers() {
    let Some(db) = connect().await else { return };

    let result = db.query("SELECT * FROM definitely_missing_table", &[]).await;
    assert!(matches!(result, Err(DatabaseError::Query(_))));

    // The connection must have been released; the pool still serves queries
    let rows = db.query("SELECT 1", &[]).await.expect("pool should recover");
    assert_eq!(rows.len(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_transaction_commit() {
    let Some(db) = connect().await else { return };
    let table = unique_table();

    db.execute(&format!("CREATE TABLE {} (id BIGINT)", table), &[])
        .await
        .expect("create table");

    let insert = format!("INSERT INTO {} (id) VALUES (1), (2)", table);
    db.transaction(move |conn| {
        Box::pin(async move {
            sqlx::query(&insert).execute(conn).await?;
            Ok(())
        })
    })
    .await
    .expect("transaction should commit");

    let rows = db
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .expect("count");
    let n: i64 = rows.rows[0].get("n");
    assert_eq!(n, 2);

    db.execute(&format!("DROP TABLE {}", table), &[]).await.expect("drop");
    db.close().await;
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let Some(db) = connect().await else { return };
    let table = unique_table();

    db.execute(&format!("CREATE TABLE {} (id BIGINT)", table), &[])
        .await
        .expect("create table");

    let insert = format!("INSERT INTO {} (id) VALUES (1)", table);
    let result: Result<(), _> = db
        .transaction(move |conn| {
            Box::pin(async move {
                sqlx::query(&insert).execute(&mut *conn).await?;
                // Force a statement failure after the write
                sqlx::query("SELECT * FROM definitely_missing_table")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .await;
    assert!(result.is_err());

    let rows = db
        .query(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .expect("count");
    let n: i64 = rows.rows[0].get("n");
    assert_eq!(n, 0, "write must have been rolled back");

    db.execute(&format!("DROP TABLE {}", table), &[]).await.expect("drop");
    db.close().await;
}

#[tokio::test]
async fn test_connection_probe_reports_healthy() {
    let Some(db) = connect().await else { return };

    assert!(db.test_connection().await);

    let stats = db.pool_stats();
    assert!(stats.total_established >= 1);

    db.close().await;
}

#[tokio::test]
async fn test_close_rejects_further_operations() {
    let Some(db) = connect().await else { return };

    db.close().await;
    db.close().await; // idempotent

    let result = db.query("SELECT 1", &[]).await;
    assert!(matches!(result, Err(DatabaseError::Closed)));
}

#[tokio::test]
async fn test_notification_round_trip_and_raw_fallback() {
    let Some(db) = connect().await else { return };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    db.on("orders_changes", move |payload| {
        let _ = tx.send(payload);
    });

    // The bridge subscribes asynchronously; re-send until the event lands.
    let mut received = None;
    for _ in 0..20 {
        db.notify("orders_changes", &serde_json::json!({"orderId": "123"}))
            .await
            .expect("notify");
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            received = Some(event);
            break;
        }
    }

    assert_eq!(
        received.expect("notification should be delivered"),
        NotificationPayload::Json(serde_json::json!({"orderId": "123"}))
    );

    // Malformed payload sent at the wire level falls back to the raw string
    db.query("SELECT pg_notify('orders_changes', 'not-json')", &[])
        .await
        .expect("raw notify");

    // Skip any queued duplicates from the re-send loop above
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("raw event should be delivered")
            .expect("channel open");
        if let NotificationPayload::Raw(raw) = event {
            assert_eq!(raw, "not-json");
            break;
        }
    }

    db.close().await;
}
