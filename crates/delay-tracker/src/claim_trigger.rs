// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Claim trigger: local pre-checks and oracle response classification.
//!
//! The oracle is an opaque authority on eligibility and compensation. This
//! module decides whether to contact it at all, and folds its answers (and
//! its failures) into a small set of outcomes the detection cycle can act
//! on. Business failures are data; only transport failures are retryable.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::{ClaimTriggerRequest, ClaimTriggerResponse, ClaimsApi};
use crate::db::alerts::DelayAlert;
use crate::db::journeys::MonitoredJourney;

/// Classified result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The oracle accepted the claim.
    Success {
        /// Reference for the created claim.
        claim_reference_id: String,
        /// Estimated compensation, when the oracle provides one.
        estimated_compensation: Option<f64>,
    },
    /// The alert already carries a triggered claim; the oracle was not called.
    AlreadyTriggered {
        /// The existing claim reference, if recorded.
        claim_reference_id: Option<String>,
    },
    /// The delay is under the claim threshold; the oracle was not called.
    BelowThreshold,
    /// The oracle already holds a claim for this journey.
    DuplicateClaim {
        /// Reference of the existing claim.
        claim_reference_id: String,
    },
    /// The oracle judged the journey ineligible.
    NotEligible,
    /// The oracle answered with a failure and no claim reference.
    ServiceError {
        /// Description from the oracle.
        message: String,
    },
    /// The oracle was unreachable; worth retrying later.
    NetworkError {
        /// Transport-level failure description.
        message: String,
    },
}

impl ClaimOutcome {
    /// Whether a later attempt could succeed without new information.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClaimOutcome::NetworkError { .. })
    }

    /// Short identifier for logs and stored responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimOutcome::Success { .. } => "SUCCESS",
            ClaimOutcome::AlreadyTriggered { .. } => "ALREADY_TRIGGERED",
            ClaimOutcome::BelowThreshold => "BELOW_THRESHOLD",
            ClaimOutcome::DuplicateClaim { .. } => "DUPLICATE_CLAIM",
            ClaimOutcome::NotEligible => "NOT_ELIGIBLE",
            ClaimOutcome::ServiceError { .. } => "SERVICE_ERROR",
            ClaimOutcome::NetworkError { .. } => "NETWORK_ERROR",
        }
    }
}

/// A claim attempt: the classified outcome plus the raw oracle response for
/// audit storage on the alert. Pre-check outcomes carry no response.
#[derive(Debug, Clone)]
pub struct ClaimAttempt {
    /// Classified outcome.
    pub outcome: ClaimOutcome,
    /// Raw oracle response, when the oracle was contacted.
    pub oracle_response: Option<serde_json::Value>,
}

/// Applies pre-checks and hands eligible alerts to the claims oracle.
pub struct ClaimTrigger {
    oracle: Arc<dyn ClaimsApi>,
    threshold_minutes: i32,
}

impl ClaimTrigger {
    /// Create a trigger with the configured claim threshold.
    pub fn new(oracle: Arc<dyn ClaimsApi>, threshold_minutes: i32) -> Self {
        Self {
            oracle,
            threshold_minutes,
        }
    }

    /// Attempt a claim for one alert.
    pub async fn trigger(&self, alert: &DelayAlert, journey: &MonitoredJourney) -> ClaimAttempt {
        if alert.claim_triggered {
            return ClaimAttempt {
                outcome: ClaimOutcome::AlreadyTriggered {
                    claim_reference_id: alert.claim_reference_id.clone(),
                },
                oracle_response: None,
            };
        }

        if alert.delay_minutes < self.threshold_minutes {
            return ClaimAttempt {
                outcome: ClaimOutcome::BelowThreshold,
                oracle_response: None,
            };
        }

        let request = ClaimTriggerRequest {
            delay_alert_id: alert.id.to_string(),
            journey_id: journey.journey_id.clone(),
            user_id: journey.user_id.clone(),
            delay_minutes: alert.delay_minutes,
            delay_reasons: alert.delay_reasons.clone(),
        };

        match self.oracle.trigger_claim(&request).await {
            Ok(response) => {
                let stored = serde_json::to_value(&response).ok();
                let outcome = classify_response(response);
                log_outcome(alert, journey, &outcome);
                ClaimAttempt {
                    outcome,
                    oracle_response: stored,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    alert_id = %alert.id,
                    journey_id = %journey.journey_id,
                    error = %message,
                    "Claims oracle unreachable"
                );
                ClaimAttempt {
                    outcome: ClaimOutcome::NetworkError {
                        message: message.clone(),
                    },
                    oracle_response: Some(serde_json::json!({
                        "error": message,
                        "retryable": true,
                    })),
                }
            }
        }
    }

    /// Attempt claims for a batch of alerts, sequentially.
    ///
    /// One alert's failure does not short-circuit the rest.
    pub async fn trigger_batch(
        &self,
        items: &[(DelayAlert, MonitoredJourney)],
    ) -> Vec<ClaimAttempt> {
        let mut attempts = Vec::with_capacity(items.len());
        for (alert, journey) in items {
            attempts.push(self.trigger(alert, journey).await);
        }
        attempts
    }
}

/// Fold an oracle response into an outcome.
fn classify_response(response: ClaimTriggerResponse) -> ClaimOutcome {
    if response.success && response.eligible != Some(false) {
        if let Some(reference) = response.claim_reference_id.clone() {
            return ClaimOutcome::Success {
                claim_reference_id: reference,
                estimated_compensation: response.estimated_compensation,
            };
        }
    }

    // A failed call that still names a reference means the claim already
    // exists on the oracle side.
    if !response.success {
        if let Some(reference) = response.claim_reference_id.clone() {
            return ClaimOutcome::DuplicateClaim {
                claim_reference_id: reference,
            };
        }
    }

    if response.eligible == Some(false) {
        return ClaimOutcome::NotEligible;
    }

    ClaimOutcome::ServiceError {
        message: response
            .error
            .or(response.message)
            .unwrap_or_else(|| "Claim trigger failed".to_string()),
    }
}

fn log_outcome(alert: &DelayAlert, journey: &MonitoredJourney, outcome: &ClaimOutcome) {
    match outcome {
        ClaimOutcome::Success {
            claim_reference_id, ..
        } => info!(
            alert_id = %alert.id,
            journey_id = %journey.journey_id,
            claim_reference_id = %claim_reference_id,
            "Claim triggered"
        ),
        other => info!(
            alert_id = %alert.id,
            journey_id = %journey.journey_id,
            outcome = other.kind(),
            "Claim not triggered"
        ),
    }
}
