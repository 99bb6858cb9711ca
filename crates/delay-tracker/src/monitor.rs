// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Journey monitor: lifecycle state machine and check scheduling.
//!
//! The monitor owns every `next_check_at` decision. Callers ask for a
//! registration, a promotion, or a touch; the monitor decides when the
//! journey is next due:
//!
//! - registration more than 48h before departure schedules the first touch
//!   at `departure - 48h`, otherwise one tick from now;
//! - RID resolution schedules an immediate delay check;
//! - a touch without a state change schedules `now + tick_interval`;
//! - terminal states are never rechecked.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::db::journeys::{self, MonitoredJourney, MonitoringStatus, NewMonitoredJourney};
use crate::db::outbox;
use crate::error::{Error, Result};
use crate::events;

/// Hours before departure at which monitoring begins.
const LEAD_TIME_HOURS: i64 = 48;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pacing between checks of the same journey.
    pub tick_interval: Duration,
    /// Maximum journeys returned per due-set query.
    pub check_batch_size: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300),
            check_batch_size: 100,
        }
    }
}

/// Journey registration request.
///
/// Two upstream producers speak different dialects, so the ingestion boundary
/// accepts both camelCase and snake_case field names.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterJourneyRequest {
    /// External journey id, globally unique.
    #[serde(alias = "journeyId")]
    pub journey_id: String,
    /// Owning user.
    #[serde(alias = "userId")]
    pub user_id: String,
    /// Calendar day of travel.
    #[serde(alias = "serviceDate")]
    pub service_date: NaiveDate,
    /// Three-letter origin station code.
    #[serde(alias = "originCode")]
    pub origin_code: String,
    /// Three-letter destination station code.
    #[serde(alias = "destinationCode")]
    pub destination_code: String,
    /// Scheduled departure time.
    #[serde(alias = "scheduledDeparture")]
    pub scheduled_departure: DateTime<Utc>,
    /// Scheduled arrival time.
    #[serde(alias = "scheduledArrival")]
    pub scheduled_arrival: DateTime<Utc>,
}

impl RegisterJourneyRequest {
    fn validate(&self) -> Result<()> {
        if self.journey_id.is_empty() {
            return Err(Error::InvalidRequest("journey_id must not be empty".into()));
        }
        if self.user_id.is_empty() {
            return Err(Error::InvalidRequest("user_id must not be empty".into()));
        }
        for (name, code) in [
            ("origin_code", &self.origin_code),
            ("destination_code", &self.destination_code),
        ] {
            if code.len() != 3 {
                return Err(Error::InvalidRequest(format!(
                    "{} must be a 3-character station code, got '{}'",
                    name, code
                )));
            }
        }
        if self.scheduled_arrival <= self.scheduled_departure {
            return Err(Error::InvalidRequest(
                "scheduled_arrival must be after scheduled_departure".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state machine and scheduling policy for monitored journeys.
#[derive(Debug, Clone)]
pub struct JourneyMonitor {
    pool: PgPool,
    config: MonitorConfig,
}

impl JourneyMonitor {
    /// Create a new monitor.
    pub fn new(pool: PgPool, config: MonitorConfig) -> Self {
        Self { pool, config }
    }

    /// Pacing between checks of the same journey.
    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    /// Check that a status change is permitted by the lifecycle.
    pub fn validate_transition(from: MonitoringStatus, to: MonitoringStatus) -> Result<()> {
        let allowed = match from {
            MonitoringStatus::PendingRid => {
                matches!(to, MonitoringStatus::Active | MonitoringStatus::Cancelled)
            }
            MonitoringStatus::Active => matches!(
                to,
                MonitoringStatus::Delayed
                    | MonitoringStatus::Completed
                    | MonitoringStatus::Cancelled
            ),
            MonitoringStatus::Delayed => {
                matches!(to, MonitoringStatus::Completed | MonitoringStatus::Cancelled)
            }
            MonitoringStatus::Completed | MonitoringStatus::Cancelled => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidTransition { from, to })
        }
    }

    /// First `next_check_at` for a journey registered at `now`.
    ///
    /// Far-future journeys wait until 48 hours before departure; anything
    /// closer joins the next tick.
    pub fn initial_next_check(
        &self,
        scheduled_departure: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let lead = ChronoDuration::hours(LEAD_TIME_HOURS);
        if scheduled_departure - now > lead {
            scheduled_departure - lead
        } else {
            now + ChronoDuration::from_std(self.config.tick_interval)
                .unwrap_or_else(|_| ChronoDuration::minutes(5))
        }
    }

    /// `next_check_at` after a status change, per policy.
    pub fn next_check_after(
        &self,
        status: MonitoringStatus,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match status {
            // Immediate first delay check on the next tick.
            MonitoringStatus::Active => Some(now),
            MonitoringStatus::PendingRid | MonitoringStatus::Delayed => Some(self.paced(now)),
            MonitoringStatus::Completed | MonitoringStatus::Cancelled => None,
        }
    }

    /// `now + tick_interval`, the periodic-touch schedule.
    pub fn paced(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + ChronoDuration::from_std(self.config.tick_interval)
            .unwrap_or_else(|_| ChronoDuration::minutes(5))
    }

    /// Register a journey for monitoring.
    ///
    /// Inserts the journey in `pending_rid` and writes the
    /// `journey.monitoring_started` event in the same transaction. A journey
    /// id that is already monitored fails with [`Error::Conflict`].
    pub async fn register_journey(
        &self,
        request: &RegisterJourneyRequest,
        now: DateTime<Utc>,
    ) -> Result<MonitoredJourney> {
        request.validate()?;

        let new_journey = NewMonitoredJourney {
            id: Uuid::new_v4(),
            journey_id: request.journey_id.clone(),
            user_id: request.user_id.clone(),
            service_date: request.service_date,
            origin_code: request.origin_code.to_uppercase(),
            destination_code: request.destination_code.to_uppercase(),
            scheduled_departure: request.scheduled_departure,
            scheduled_arrival: request.scheduled_arrival,
            next_check_at: self.initial_next_check(request.scheduled_departure, now),
        };

        let mut tx = self.pool.begin().await?;
        journeys::insert(&mut *tx, &new_journey).await?;
        let journey = journeys::find_by_id(&mut *tx, new_journey.id)
            .await?
            .ok_or_else(|| Error::JourneyNotFound(new_journey.id.to_string()))?;
        outbox::insert(&mut *tx, &events::monitoring_started(&journey, None)?).await?;
        tx.commit().await?;

        info!(
            journey_id = %journey.journey_id,
            user_id = %journey.user_id,
            next_check_at = ?journey.next_check_at,
            "Journey registered for monitoring"
        );

        Ok(journey)
    }

    /// Journeys whose `next_check_at` has elapsed, oldest first.
    pub async fn due_for_check(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredJourney>> {
        let due =
            journeys::find_due_for_check(&self.pool, now, self.config.check_batch_size).await?;
        Ok(due)
    }

    /// Promote a journey to `active` with its resolved running id.
    ///
    /// Schedules an immediate delay check.
    pub async fn resolve_rid(
        &self,
        journey: &MonitoredJourney,
        rid: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Self::validate_transition(journey.monitoring_status, MonitoringStatus::Active)?;

        journeys::update_status(
            &self.pool,
            journey.id,
            MonitoringStatus::Active,
            Some(rid),
            self.next_check_after(MonitoringStatus::Active, now),
        )
        .await?;

        info!(
            journey_id = %journey.journey_id,
            rid = %rid,
            "Running id resolved, journey active"
        );

        Ok(())
    }

    /// Cancel monitoring on explicit request.
    ///
    /// Permitted from any non-terminal state; writes the `journey.cancelled`
    /// event in the same transaction.
    pub async fn cancel_journey(&self, journey: &MonitoredJourney) -> Result<()> {
        Self::validate_transition(journey.monitoring_status, MonitoringStatus::Cancelled)?;

        let mut tx = self.pool.begin().await?;
        journeys::update_status(&mut *tx, journey.id, MonitoringStatus::Cancelled, None, None)
            .await?;
        outbox::insert(&mut *tx, &events::journey_cancelled(journey, None)?).await?;
        tx.commit().await?;

        info!(journey_id = %journey.journey_id, "Journey monitoring cancelled");

        Ok(())
    }

    /// Record a periodic touch without a state change for a batch of journeys.
    pub async fn touch(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<u64> {
        let updated = journeys::update_schedule(&self.pool, ids, now, self.paced(now)).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor_config() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[test]
    fn test_permitted_transitions() {
        use MonitoringStatus::*;

        for (from, to) in [
            (PendingRid, Active),
            (PendingRid, Cancelled),
            (Active, Delayed),
            (Active, Completed),
            (Active, Cancelled),
            (Delayed, Completed),
            (Delayed, Cancelled),
        ] {
            assert!(
                JourneyMonitor::validate_transition(from, to).is_ok(),
                "{from} -> {to} should be permitted"
            );
        }
    }

    #[test]
    fn test_forbidden_transitions() {
        use MonitoringStatus::*;

        for (from, to) in [
            (PendingRid, Delayed),
            (PendingRid, Completed),
            (Active, PendingRid),
            (Active, Active),
            (Delayed, Active),
            (Delayed, PendingRid),
            (Completed, Active),
            (Completed, Cancelled),
            (Cancelled, Active),
            (Cancelled, Completed),
        ] {
            let err = JourneyMonitor::validate_transition(from, to).unwrap_err();
            assert!(
                matches!(err, Error::InvalidTransition { .. }),
                "{from} -> {to} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_initial_next_check_far_future() {
        let monitor = JourneyMonitor::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            monitor_config(),
        );

        let now = "2026-01-15T08:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let departure = "2026-01-20T08:00:00Z".parse::<DateTime<Utc>>().unwrap();

        assert_eq!(
            monitor.initial_next_check(departure, now),
            "2026-01-18T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_initial_next_check_boundary() {
        let monitor = JourneyMonitor::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            monitor_config(),
        );

        let now = "2026-01-15T08:30:00Z".parse::<DateTime<Utc>>().unwrap();

        // One second past the 48h lead: first touch at departure - 48h.
        let just_outside = now + ChronoDuration::hours(48) + ChronoDuration::seconds(1);
        assert_eq!(
            monitor.initial_next_check(just_outside, now),
            just_outside - ChronoDuration::hours(48)
        );

        // Exactly 48h away: joins the next tick.
        let exactly = now + ChronoDuration::hours(48);
        assert_eq!(monitor.initial_next_check(exactly, now), monitor.paced(now));

        // One hour away: within tick_interval of now.
        let soon = now + ChronoDuration::hours(1);
        let next = monitor.initial_next_check(soon, now);
        assert!(next > now);
        assert!(next <= now + ChronoDuration::minutes(5));
    }

    #[tokio::test]
    async fn test_next_check_after_transition() {
        let monitor = JourneyMonitor::new(
            sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
            monitor_config(),
        );
        let now = Utc::now();

        assert_eq!(
            monitor.next_check_after(MonitoringStatus::Active, now),
            Some(now)
        );
        assert_eq!(
            monitor.next_check_after(MonitoringStatus::Delayed, now),
            Some(monitor.paced(now))
        );
        assert_eq!(monitor.next_check_after(MonitoringStatus::Completed, now), None);
        assert_eq!(monitor.next_check_after(MonitoringStatus::Cancelled, now), None);
    }

    #[test]
    fn test_register_request_accepts_both_dialects() {
        let snake: RegisterJourneyRequest = serde_json::from_value(serde_json::json!({
            "journey_id": "JRN-1",
            "user_id": "U1",
            "service_date": "2026-01-20",
            "origin_code": "KGX",
            "destination_code": "EDB",
            "scheduled_departure": "2026-01-20T08:00:00Z",
            "scheduled_arrival": "2026-01-20T12:30:00Z"
        }))
        .unwrap();
        assert_eq!(snake.journey_id, "JRN-1");

        let camel: RegisterJourneyRequest = serde_json::from_value(serde_json::json!({
            "journeyId": "JRN-2",
            "userId": "U1",
            "serviceDate": "2026-01-20",
            "originCode": "KGX",
            "destinationCode": "EDB",
            "scheduledDeparture": "2026-01-20T08:00:00Z",
            "scheduledArrival": "2026-01-20T12:30:00Z"
        }))
        .unwrap();
        assert_eq!(camel.journey_id, "JRN-2");
        assert_eq!(camel.origin_code, "KGX");
    }

    #[test]
    fn test_register_request_validation() {
        let mut request = RegisterJourneyRequest {
            journey_id: "JRN-1".to_string(),
            user_id: "U1".to_string(),
            service_date: "2026-01-20".parse().unwrap(),
            origin_code: "KGX".to_string(),
            destination_code: "EDB".to_string(),
            scheduled_departure: "2026-01-20T08:00:00Z".parse().unwrap(),
            scheduled_arrival: "2026-01-20T12:30:00Z".parse().unwrap(),
        };
        assert!(request.validate().is_ok());

        request.origin_code = "KINGS CROSS".to_string();
        assert!(request.validate().is_err());

        request.origin_code = "KGX".to_string();
        request.scheduled_arrival = request.scheduled_departure;
        assert!(request.validate().is_err());
    }
}
