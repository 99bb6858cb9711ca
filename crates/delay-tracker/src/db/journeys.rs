// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Journey store: persistence for monitored journeys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Lifecycle state of a monitored journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    /// Registered, waiting for the upstream running id to be resolved.
    PendingRid,
    /// Running id known; delay checks are live.
    Active,
    /// A threshold-crossing delay has been recorded.
    Delayed,
    /// The scheduled arrival has passed.
    Completed,
    /// The service was cancelled, or monitoring was cancelled on request.
    Cancelled,
}

impl MonitoringStatus {
    /// Terminal states are never rechecked.
    pub fn is_terminal(self) -> bool {
        matches!(self, MonitoringStatus::Completed | MonitoringStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitoringStatus::PendingRid => "pending_rid",
            MonitoringStatus::Active => "active",
            MonitoringStatus::Delayed => "delayed",
            MonitoringStatus::Completed => "completed",
            MonitoringStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MonitoringStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending_rid" => Ok(MonitoringStatus::PendingRid),
            "active" => Ok(MonitoringStatus::Active),
            "delayed" => Ok(MonitoringStatus::Delayed),
            "completed" => Ok(MonitoringStatus::Completed),
            "cancelled" => Ok(MonitoringStatus::Cancelled),
            _ => Err(format!("Unknown monitoring status: {}", s)),
        }
    }
}

/// Monitored journey record from the database.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MonitoredJourney {
    /// Surrogate id.
    pub id: Uuid,
    /// Externally assigned journey identifier, globally unique.
    pub journey_id: String,
    /// Owning user (opaque to this service).
    pub user_id: String,
    /// Calendar day of travel.
    pub service_date: NaiveDate,
    /// Three-letter origin station code.
    pub origin_code: String,
    /// Three-letter destination station code.
    pub destination_code: String,
    /// Scheduled departure time.
    pub scheduled_departure: DateTime<Utc>,
    /// Scheduled arrival time.
    pub scheduled_arrival: DateTime<Utc>,
    /// Upstream running id, null until resolved.
    pub rid: Option<String>,
    /// Current lifecycle state.
    pub monitoring_status: MonitoringStatus,
    /// When the journey was last examined by a detection cycle.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When the journey is next due; null means never recheck.
    pub next_check_at: Option<DateTime<Utc>>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new monitored journey.
#[derive(Debug, Clone)]
pub struct NewMonitoredJourney {
    pub id: Uuid,
    pub journey_id: String,
    pub user_id: String,
    pub service_date: NaiveDate,
    pub origin_code: String,
    pub destination_code: String,
    pub scheduled_departure: DateTime<Utc>,
    pub scheduled_arrival: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

/// Partial update of the mutable journey fields.
///
/// All other columns are immutable after creation. `next_check_at` carries a
/// double option so callers can distinguish "leave unchanged" from "set NULL".
#[derive(Debug, Clone, Default)]
pub struct JourneyUpdate {
    pub rid: Option<String>,
    pub monitoring_status: Option<MonitoringStatus>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<Option<DateTime<Utc>>>,
}

const JOURNEY_COLUMNS: &str = "id, journey_id, user_id, service_date, origin_code, \
     destination_code, scheduled_departure, scheduled_arrival, rid, \
     monitoring_status, last_checked_at, next_check_at, created_at, updated_at";

/// Insert a new journey in `pending_rid`.
///
/// A duplicate `journey_id` surfaces as a unique violation.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    journey: &NewMonitoredJourney,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO delay_tracker.monitored_journeys (
            id, journey_id, user_id, service_date, origin_code, destination_code,
            scheduled_departure, scheduled_arrival, monitoring_status, next_check_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending_rid', $9)
        "#,
    )
    .bind(journey.id)
    .bind(&journey.journey_id)
    .bind(&journey.user_id)
    .bind(journey.service_date)
    .bind(&journey.origin_code)
    .bind(&journey.destination_code)
    .bind(journey.scheduled_departure)
    .bind(journey.scheduled_arrival)
    .bind(journey.next_check_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Get a journey by surrogate id.
pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<MonitoredJourney>, sqlx::Error> {
    sqlx::query_as::<_, MonitoredJourney>(&format!(
        "SELECT {} FROM delay_tracker.monitored_journeys WHERE id = $1",
        JOURNEY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Get a journey by its external journey id.
pub async fn find_by_journey_id<'e>(
    executor: impl PgExecutor<'e>,
    journey_id: &str,
) -> Result<Option<MonitoredJourney>, sqlx::Error> {
    sqlx::query_as::<_, MonitoredJourney>(&format!(
        "SELECT {} FROM delay_tracker.monitored_journeys WHERE journey_id = $1",
        JOURNEY_COLUMNS
    ))
    .bind(journey_id)
    .fetch_optional(executor)
    .await
}

/// List journeys registered by a user, newest first.
pub async fn find_by_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: &str,
) -> Result<Vec<MonitoredJourney>, sqlx::Error> {
    sqlx::query_as::<_, MonitoredJourney>(&format!(
        "SELECT {} FROM delay_tracker.monitored_journeys \
         WHERE user_id = $1 ORDER BY created_at DESC",
        JOURNEY_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(executor)
    .await
}

/// Journeys due for a check: `next_check_at` elapsed and a pollable status.
///
/// Matches the partial index on `next_check_at`.
pub async fn find_due_for_check<'e>(
    executor: impl PgExecutor<'e>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<MonitoredJourney>, sqlx::Error> {
    sqlx::query_as::<_, MonitoredJourney>(&format!(
        r#"
        SELECT {}
        FROM delay_tracker.monitored_journeys
        WHERE next_check_at <= $1
          AND monitoring_status IN ('pending_rid', 'active')
        ORDER BY next_check_at ASC
        LIMIT $2
        "#,
        JOURNEY_COLUMNS
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// Apply a partial update to the whitelisted mutable fields.
pub async fn update<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    changes: &JourneyUpdate,
) -> Result<u64, sqlx::Error> {
    let (set_next_check, next_check) = match changes.next_check_at {
        Some(value) => (true, value),
        None => (false, None),
    };

    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.monitored_journeys
        SET rid = COALESCE($2, rid),
            monitoring_status = COALESCE($3, monitoring_status),
            last_checked_at = COALESCE($4, last_checked_at),
            next_check_at = CASE WHEN $5 THEN $6 ELSE next_check_at END
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&changes.rid)
    .bind(changes.monitoring_status)
    .bind(changes.last_checked_at)
    .bind(set_next_check)
    .bind(next_check)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Atomic status change, optionally co-setting the rid.
///
/// `next_check_at` is always written; the monitor computes it from policy.
pub async fn update_status<'e>(
    executor: impl PgExecutor<'e>,
    id: Uuid,
    status: MonitoringStatus,
    rid: Option<&str>,
    next_check_at: Option<DateTime<Utc>>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.monitored_journeys
        SET monitoring_status = $2,
            rid = COALESCE($3, rid),
            next_check_at = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(rid)
    .bind(next_check_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Bulk pacing update used by the detection cycle.
pub async fn update_schedule<'e>(
    executor: impl PgExecutor<'e>,
    ids: &[Uuid],
    checked_at: DateTime<Utc>,
    next_check_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE delay_tracker.monitored_journeys
        SET last_checked_at = $2,
            next_check_at = $3
        WHERE id = ANY($1)
        "#,
    )
    .bind(ids)
    .bind(checked_at)
    .bind(next_check_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a journey; alerts cascade.
pub async fn delete<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM delay_tracker.monitored_journeys WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            MonitoringStatus::PendingRid,
            MonitoringStatus::Active,
            MonitoringStatus::Delayed,
            MonitoringStatus::Completed,
            MonitoringStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MonitoringStatus>(), Ok(status));
        }
        assert!("running".parse::<MonitoringStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(MonitoringStatus::Completed.is_terminal());
        assert!(MonitoringStatus::Cancelled.is_terminal());
        assert!(!MonitoringStatus::PendingRid.is_terminal());
        assert!(!MonitoringStatus::Active.is_terminal());
        assert!(!MonitoringStatus::Delayed.is_terminal());
    }
}
