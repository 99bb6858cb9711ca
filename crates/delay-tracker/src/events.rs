// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed builders for outbox events.
//!
//! Each builder returns a [`NewOutboxEvent`] ready for
//! [`crate::db::outbox::insert`]; passing a transaction executor to the
//! insert makes the event part of the caller's commit. Builders mint a fresh
//! correlation id when the caller does not supply one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::alerts::DelayAlert;
use crate::db::journeys::MonitoredJourney;
use crate::db::outbox::NewOutboxEvent;
use crate::error::Result;

/// Aggregate type for journey events.
pub const AGGREGATE_MONITORED_JOURNEY: &str = "monitored_journey";
/// Aggregate type for alert events.
pub const AGGREGATE_DELAY_ALERT: &str = "delay_alert";

/// Event kinds written to the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A journey entered monitoring.
    MonitoringStarted,
    /// A threshold-crossing delay or a cancellation was detected.
    DelayDetected,
    /// A compensation claim was handed to the oracle.
    ClaimTriggered,
    /// The journey's scheduled arrival passed.
    JourneyCompleted,
    /// Monitoring of the journey was cancelled.
    JourneyCancelled,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::MonitoringStarted => "journey.monitoring_started",
            EventType::DelayDetected => "delay.detected",
            EventType::ClaimTriggered => "claim.triggered",
            EventType::JourneyCompleted => "journey.completed",
            EventType::JourneyCancelled => "journey.cancelled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mint a correlation id for a detection cycle or a standalone event.
pub fn mint_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Payload of `journey.monitoring_started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStartedPayload {
    pub journey_id: String,
    pub user_id: String,
    pub monitored_journey_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub scheduled_departure: DateTime<Utc>,
    pub correlation_id: String,
}

/// Payload of `delay.detected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayDetectedPayload {
    pub journey_id: String,
    pub alert_id: Uuid,
    pub user_id: String,
    pub delay_minutes: i32,
    pub delay_reasons: Option<serde_json::Value>,
    pub correlation_id: String,
}

/// Payload of `claim.triggered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTriggeredPayload {
    pub alert_id: Uuid,
    pub journey_id: String,
    pub user_id: String,
    pub claim_reference_id: String,
    pub delay_minutes: i32,
    pub correlation_id: String,
}

/// Payload of `journey.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyCompletedPayload {
    pub journey_id: String,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub had_delay: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<i32>,
    pub correlation_id: String,
}

/// Payload of `journey.cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyCancelledPayload {
    pub journey_id: String,
    pub user_id: String,
    pub correlation_id: String,
}

fn correlation_or_mint(correlation_id: Option<&str>) -> String {
    correlation_id
        .map(str::to_string)
        .unwrap_or_else(mint_correlation_id)
}

/// Build a `journey.monitoring_started` event for a freshly registered journey.
pub fn monitoring_started(
    journey: &MonitoredJourney,
    correlation_id: Option<&str>,
) -> Result<NewOutboxEvent> {
    let correlation_id = correlation_or_mint(correlation_id);
    let payload = MonitoringStartedPayload {
        journey_id: journey.journey_id.clone(),
        user_id: journey.user_id.clone(),
        monitored_journey_id: journey.id,
        origin: journey.origin_code.clone(),
        destination: journey.destination_code.clone(),
        scheduled_departure: journey.scheduled_departure,
        correlation_id: correlation_id.clone(),
    };
    Ok(NewOutboxEvent {
        aggregate_id: journey.id.to_string(),
        aggregate_type: AGGREGATE_MONITORED_JOURNEY.to_string(),
        event_type: EventType::MonitoringStarted.as_str().to_string(),
        payload: serde_json::to_value(payload)?,
        correlation_id,
    })
}

/// Build a `delay.detected` event for a newly created alert.
pub fn delay_detected(
    journey: &MonitoredJourney,
    alert_id: Uuid,
    delay_minutes: i32,
    delay_reasons: Option<serde_json::Value>,
    correlation_id: Option<&str>,
) -> Result<NewOutboxEvent> {
    let correlation_id = correlation_or_mint(correlation_id);
    let payload = DelayDetectedPayload {
        journey_id: journey.journey_id.clone(),
        alert_id,
        user_id: journey.user_id.clone(),
        delay_minutes,
        delay_reasons,
        correlation_id: correlation_id.clone(),
    };
    Ok(NewOutboxEvent {
        aggregate_id: alert_id.to_string(),
        aggregate_type: AGGREGATE_DELAY_ALERT.to_string(),
        event_type: EventType::DelayDetected.as_str().to_string(),
        payload: serde_json::to_value(payload)?,
        correlation_id,
    })
}

/// Build a `claim.triggered` event after a successful oracle hand-off.
pub fn claim_triggered(
    journey: &MonitoredJourney,
    alert_id: Uuid,
    claim_reference_id: &str,
    delay_minutes: i32,
    correlation_id: Option<&str>,
) -> Result<NewOutboxEvent> {
    let correlation_id = correlation_or_mint(correlation_id);
    let payload = ClaimTriggeredPayload {
        alert_id,
        journey_id: journey.journey_id.clone(),
        user_id: journey.user_id.clone(),
        claim_reference_id: claim_reference_id.to_string(),
        delay_minutes,
        correlation_id: correlation_id.clone(),
    };
    Ok(NewOutboxEvent {
        aggregate_id: alert_id.to_string(),
        aggregate_type: AGGREGATE_DELAY_ALERT.to_string(),
        event_type: EventType::ClaimTriggered.as_str().to_string(),
        payload: serde_json::to_value(payload)?,
        correlation_id,
    })
}

/// Build a `journey.completed` event.
///
/// `latest_alert` carries delay information into the payload when the journey
/// was delayed at some point before completing.
pub fn journey_completed(
    journey: &MonitoredJourney,
    completed_at: DateTime<Utc>,
    latest_alert: Option<&DelayAlert>,
    correlation_id: Option<&str>,
) -> Result<NewOutboxEvent> {
    let correlation_id = correlation_or_mint(correlation_id);
    let payload = JourneyCompletedPayload {
        journey_id: journey.journey_id.clone(),
        user_id: journey.user_id.clone(),
        completed_at,
        had_delay: latest_alert.is_some(),
        delay_minutes: latest_alert.map(|a| a.delay_minutes),
        correlation_id: correlation_id.clone(),
    };
    Ok(NewOutboxEvent {
        aggregate_id: journey.id.to_string(),
        aggregate_type: AGGREGATE_MONITORED_JOURNEY.to_string(),
        event_type: EventType::JourneyCompleted.as_str().to_string(),
        payload: serde_json::to_value(payload)?,
        correlation_id,
    })
}

/// Build a `journey.cancelled` event for an explicit cancellation request.
pub fn journey_cancelled(
    journey: &MonitoredJourney,
    correlation_id: Option<&str>,
) -> Result<NewOutboxEvent> {
    let correlation_id = correlation_or_mint(correlation_id);
    let payload = JourneyCancelledPayload {
        journey_id: journey.journey_id.clone(),
        user_id: journey.user_id.clone(),
        correlation_id: correlation_id.clone(),
    };
    Ok(NewOutboxEvent {
        aggregate_id: journey.id.to_string(),
        aggregate_type: AGGREGATE_MONITORED_JOURNEY.to_string(),
        event_type: EventType::JourneyCancelled.as_str().to_string(),
        payload: serde_json::to_value(payload)?,
        correlation_id,
    })
}
