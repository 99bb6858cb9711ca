// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delay alert store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;
use uuid::Uuid;

/// Delay alert record from the database.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DelayAlert {
    /// Surrogate id.
    pub id: Uuid,
    /// Journey the alert belongs to; deleted with it.
    pub monitored_journey_id: Uuid,
    /// Observed delay in minutes, strictly positive. Cancellations record
    /// the sentinel value 1; read `is_cancellation`, not this.
    pub delay_minutes: i32,
    /// When the delay was observed.
    pub delay_detected_at: DateTime<Utc>,
    /// Opaque reason blob from the upstream feed.
    pub delay_reasons: Option<serde_json::Value>,
    /// Whether the service was cancelled outright.
    pub is_cancellation: bool,
    /// Whether the delay met the configured claim threshold.
    pub threshold_exceeded: bool,
    /// Whether a claim was successfully handed to the oracle.
    pub claim_triggered: bool,
    /// When the claim was triggered.
    pub claim_triggered_at: Option<DateTime<Utc>>,
    /// Reference returned by the oracle.
    pub claim_reference_id: Option<String>,
    /// Raw oracle response, stored for audit on every outcome.
    pub claim_trigger_response: Option<serde_json::Value>,
    /// Whether the user has been notified.
    pub notification_sent: bool,
    /// When the notification went out.
    pub notification_sent_at: Option<DateTime<Utc>>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new delay alert.
#[derive(Debug, Clone)]
pub struct NewDelayAlert {
    pub id: Uuid,
    pub monitored_journey_id: Uuid,
    pub delay_minutes: i32,
    pub delay_detected_at: DateTime<Utc>,
    pub delay_reasons: Option<serde_json::Value>,
    pub is_cancellation: bool,
    pub threshold_exceeded: bool,
}

const ALERT_COLUMNS: &str = "id, monitored_journey_id, delay_minutes, delay_detected_at, \
     delay_reasons, is_cancellation, threshold_exceeded, claim_triggered, \
     claim_triggered_at, claim_reference_id, claim_trigger_response, \
     notification_sent, notification_sent_at, created_at, updated_at";

/// Insert a new alert. Runs inside the detection transaction.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    alert: &NewDelayAlert,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO delay_tracker.delay_alerts (
            id, monitored_journey_id, delay_minutes, delay_detected_at,
            delay_reasons, is_cancellation, threshold_exceeded
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(alert.id)
    .bind(alert.monitored_journey_id)
    .bind(alert.delay_minutes)
    .bind(alert.delay_detected_at)
    .bind(&alert.delay_reasons)
    .bind(alert.is_cancellation)
    .bind(alert.threshold_exceeded)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get an alert by id.
pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<DelayAlert>, sqlx::Error> {
    sqlx::query_as::<_, DelayAlert>(&format!(
        "SELECT {} FROM delay_tracker.delay_alerts WHERE id = $1",
        ALERT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// All alerts for a journey, newest detection first.
pub async fn find_by_journey<'e>(
    executor: impl PgExecutor<'e>,
    monitored_journey_id: Uuid,
) -> Result<Vec<DelayAlert>, sqlx::Error> {
    sqlx::query_as::<_, DelayAlert>(&format!(
        "SELECT {} FROM delay_tracker.delay_alerts \
         WHERE monitored_journey_id = $1 ORDER BY delay_detected_at DESC",
        ALERT_COLUMNS
    ))
    .bind(monitored_journey_id)
    .fetch_all(executor)
    .await
}

/// The most recent alert for a journey, if any.
pub async fn find_latest_for_journey<'e>(
    executor: impl PgExecutor<'e>,
    monitored_journey_id: Uuid,
) -> Result<Option<DelayAlert>, sqlx::Error> {
    sqlx::query_as::<_, DelayAlert>(&format!(
        "SELECT {} FROM delay_tracker.delay_alerts \
         WHERE monitored_journey_id = $1 ORDER BY delay_detected_at DESC LIMIT 1",
        ALERT_COLUMNS
    ))
    .bind(monitored_journey_id)
    .fetch_optional(executor)
    .await
}

/// Mark a successful claim hand-off.
pub async fn record_claim_outcome<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    claim_reference_id: &str,
    response: &serde_json::Value,
    triggered_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.delay_alerts
        SET claim_triggered = TRUE,
            claim_triggered_at = $2,
            claim_reference_id = $3,
            claim_trigger_response = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(triggered_at)
    .bind(claim_reference_id)
    .bind(response)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Store the oracle response for a claim that was not triggered.
///
/// `claim_triggered` stays false so a later pass can still hand it off.
pub async fn record_claim_failure<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    response: &serde_json::Value,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.delay_alerts
        SET claim_trigger_response = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(response)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Mark the user notification as sent.
pub async fn mark_notification_sent<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    sent_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.delay_alerts
        SET notification_sent = TRUE,
            notification_sent_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(sent_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
