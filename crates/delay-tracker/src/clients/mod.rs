// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP clients for the upstream and downstream collaborators.
//!
//! Each collaborator is reached through a trait so the detection cycle and
//! its tests can substitute fakes. The reqwest implementations live in the
//! submodules; all of them trim a trailing `/` from the configured base URL
//! and enforce the configured request timeout.

pub mod delays;
pub mod matcher;
pub mod oracle;

pub use delays::DelaysClient;
pub use matcher::MatcherClient;
pub use oracle::OracleClient;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One service's delay record from the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDelay {
    /// Upstream running id.
    pub rid: String,
    /// Total delay in minutes.
    pub delay_minutes: i32,
    /// Whether the service is cancelled.
    pub is_cancelled: bool,
    /// Opaque structured reasons, passed through to alerts.
    #[serde(default)]
    pub delay_reasons: Option<serde_json::Value>,
}

/// A journey as known to the matcher, with its legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyWithSegments {
    /// Matcher-side journey id.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Three-letter origin station code.
    pub origin_crs: String,
    /// Three-letter destination station code.
    pub destination_crs: String,
    /// Calendar day of travel.
    pub travel_date: NaiveDate,
    /// Matcher-side status.
    pub status: String,
    /// Legs in travel order.
    pub segments: Vec<JourneySegment>,
}

/// One leg of a matched journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneySegment {
    /// Segment id.
    pub id: String,
    /// Owning journey id.
    pub journey_id: String,
    /// Position within the journey, starting at 1.
    pub sequence: i32,
    /// Running id for this leg, null until the matcher resolves it.
    pub rid: Option<String>,
    /// Three-letter origin station code.
    pub origin_crs: String,
    /// Three-letter destination station code.
    pub destination_crs: String,
    /// Scheduled departure of this leg.
    pub scheduled_departure: DateTime<Utc>,
    /// Scheduled arrival of this leg.
    pub scheduled_arrival: DateTime<Utc>,
    /// Operating company code.
    pub toc_code: Option<String>,
}

impl JourneyWithSegments {
    /// All resolved running ids, in segment order.
    pub fn segment_rids(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|segment| segment.rid.clone())
            .collect()
    }

    /// The first resolved running id, if any.
    pub fn first_rid(&self) -> Option<&str> {
        self.segments
            .iter()
            .find_map(|segment| segment.rid.as_deref())
    }

    /// Whether every segment has a running id.
    pub fn all_segments_have_rids(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|segment| segment.rid.is_some())
    }
}

/// Request body for a claim hand-off.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimTriggerRequest {
    /// Alert the claim is for.
    pub delay_alert_id: String,
    /// External journey id.
    pub journey_id: String,
    /// Owning user.
    pub user_id: String,
    /// Observed delay in minutes.
    pub delay_minutes: i32,
    /// Opaque structured reasons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_reasons: Option<serde_json::Value>,
}

/// Oracle response to a claim hand-off.
///
/// Returned as data even for business failures; only transport-level
/// problems (timeout, connection) surface as errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimTriggerResponse {
    /// Whether the oracle accepted the claim.
    #[serde(default)]
    pub success: bool,
    /// Reference for the created (or pre-existing) claim.
    #[serde(default)]
    pub claim_reference_id: Option<String>,
    /// Human-readable message from the oracle.
    #[serde(default)]
    pub message: Option<String>,
    /// Eligibility verdict, when the oracle evaluated it.
    #[serde(default)]
    pub eligible: Option<bool>,
    /// Estimated compensation amount.
    #[serde(default)]
    pub estimated_compensation: Option<f64>,
    /// Error description for failed calls.
    #[serde(default)]
    pub error: Option<String>,
}

/// Request body for an eligibility pre-check.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityRequest {
    /// Owning user.
    pub user_id: String,
    /// External journey id.
    pub journey_id: String,
    /// Observed delay in minutes.
    pub delay_minutes: i32,
}

/// Oracle response to an eligibility pre-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResponse {
    /// Whether a claim would be accepted.
    pub eligible: bool,
    /// Reason for an ineligible verdict.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Upstream real-time delays feed.
#[async_trait]
pub trait DelaysApi: Send + Sync {
    /// Fetch delay records for a batch of running ids.
    ///
    /// An empty batch returns an empty list without a network call.
    async fn fetch_delays(&self, rids: &[String]) -> Result<Vec<ServiceDelay>>;
}

/// Journey matcher holding segment-level RID assignments.
#[async_trait]
pub trait MatcherApi: Send + Sync {
    /// Fetch a journey with its segments; `None` when the matcher does not
    /// know the journey.
    async fn journey_segments(&self, journey_id: &str) -> Result<Option<JourneyWithSegments>>;
}

/// Downstream compensation-claims oracle.
#[async_trait]
pub trait ClaimsApi: Send + Sync {
    /// Hand a claim to the oracle.
    async fn trigger_claim(&self, request: &ClaimTriggerRequest) -> Result<ClaimTriggerResponse>;

    /// Ask whether a claim would be accepted, without creating one.
    async fn check_eligibility(&self, request: &EligibilityRequest) -> Result<EligibilityResponse>;
}

/// Normalize a configured base URL: trim any trailing `/`.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
