// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbox store: append-only event log in the service database.
//!
//! Events are written inside the same transaction as the state change they
//! narrate, then relayed asynchronously. Pickup uses `FOR UPDATE SKIP LOCKED`
//! so multiple relay workers never hand the same row to the bus twice.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};

/// Outbox event record from the database.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OutboxEvent {
    /// Surrogate id; creation order matches FIFO relay order.
    pub id: i64,
    /// Id of the aggregate the event is about.
    pub aggregate_id: String,
    /// Kind of aggregate (`monitored_journey`, `delay_alert`).
    pub aggregate_type: String,
    /// Event kind, e.g. `delay.detected`.
    pub event_type: String,
    /// Event payload.
    pub payload: serde_json::Value,
    /// Correlation id shared by events from one detection cycle.
    pub correlation_id: Option<String>,
    /// Delivery status (pending, processing, processed, published, failed).
    pub status: String,
    /// Number of failed delivery attempts so far.
    pub retry_count: i32,
    /// Message from the most recent failed attempt.
    pub error_message: Option<String>,
    /// When the event was written.
    pub created_at: DateTime<Utc>,
    /// When the event was successfully relayed.
    pub processed_at: Option<DateTime<Utc>>,
    /// When the event was acknowledged by the bus.
    pub published_at: Option<DateTime<Utc>>,
}

/// Fields for appending a new outbox event.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
}

const OUTBOX_COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, payload, \
     correlation_id, status, retry_count, error_message, created_at, \
     processed_at, published_at";

/// Append an event as `pending`. Participates in the caller's transaction.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    event: &NewOutboxEvent,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO delay_tracker.outbox (
            aggregate_id, aggregate_type, event_type, payload, correlation_id
        ) VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&event.aggregate_id)
    .bind(&event.aggregate_type)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(&event.correlation_id)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Pending events in FIFO order, without locking.
pub async fn find_pending<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(&format!(
        r#"
        SELECT {}
        FROM delay_tracker.outbox
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Pending events in FIFO order, locked for this transaction.
///
/// Rows locked by another relay worker are skipped, which is what makes
/// concurrent relays safe. Must run on a transaction connection; the locks
/// are released at commit.
pub async fn find_pending_for_processing(
    conn: &mut PgConnection,
    limit: i64,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(&format!(
        r#"
        SELECT {}
        FROM delay_tracker.outbox
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// Mark an event as relayed.
pub async fn mark_processed<'e>(executor: impl PgExecutor<'e>, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE delay_tracker.outbox
        SET status = 'processed', processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Mark an event as failed and count the attempt.
pub async fn mark_failed<'e>(
    executor: impl PgExecutor<'e>,
    id: i64,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE delay_tracker.outbox
        SET status = 'failed',
            retry_count = retry_count + 1,
            error_message = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(())
}

/// Reset a failed event to `pending` ahead of a bounded retry.
pub async fn reset_to_pending<'e>(
    executor: impl PgExecutor<'e>,
    id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE delay_tracker.outbox
        SET status = 'pending', error_message = NULL
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Failed events still under the retry budget, FIFO.
pub async fn find_failed_for_retry<'e>(
    executor: impl PgExecutor<'e>,
    max_attempts: i32,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(&format!(
        r#"
        SELECT {}
        FROM delay_tracker.outbox
        WHERE status = 'failed' AND retry_count < $1
        ORDER BY created_at ASC
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(max_attempts)
    .fetch_all(executor)
    .await
}

/// Prune processed events older than the cutoff.
///
/// Pending and failed rows are never deleted; undelivered events outlive any
/// retention setting.
pub async fn delete_processed_older_than<'e>(
    executor: impl PgExecutor<'e>,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM delay_tracker.outbox
        WHERE status = 'processed' AND created_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Events sharing a correlation id, in creation order.
pub async fn find_by_correlation_id<'e>(
    executor: impl PgExecutor<'e>,
    correlation_id: &str,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(&format!(
        r#"
        SELECT {}
        FROM delay_tracker.outbox
        WHERE correlation_id = $1
        ORDER BY id ASC
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(correlation_id)
    .fetch_all(executor)
    .await
}
