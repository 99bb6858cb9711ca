// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delay detector: pure classification of upstream delay data.

use crate::clients::ServiceDelay;
use crate::db::journeys::MonitoredJourney;
use crate::error::{Error, Result};

/// Outcome of classifying one journey against its upstream delay record.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Observed delay in minutes (zero when on time or data is missing).
    pub delay_minutes: i32,
    /// Any delay or a cancellation was observed.
    pub is_delayed: bool,
    /// The service was cancelled outright.
    pub is_cancelled: bool,
    /// The delay meets the configured threshold.
    pub exceeds_threshold: bool,
    /// The journey qualifies for a compensation claim.
    pub claim_eligible: bool,
    /// No upstream record matched the journey's rid.
    pub data_not_found: bool,
    /// Reason blob carried through from the upstream record.
    pub delay_reasons: Option<serde_json::Value>,
}

/// Classifies journeys against upstream delay records.
///
/// Side-effect free; the detection cycle owns all persistence.
#[derive(Debug, Clone, Copy)]
pub struct DelayDetector {
    threshold_minutes: i32,
}

impl DelayDetector {
    /// Create a detector with the given claim threshold in minutes.
    pub fn new(threshold_minutes: i32) -> Result<Self> {
        if threshold_minutes <= 0 {
            return Err(Error::InvalidRequest(format!(
                "Delay threshold must be positive, got {}",
                threshold_minutes
            )));
        }
        Ok(Self { threshold_minutes })
    }

    /// The configured claim threshold in minutes.
    pub fn threshold_minutes(&self) -> i32 {
        self.threshold_minutes
    }

    /// Classify a journey against its matched delay record.
    ///
    /// `delay` is the record whose rid equals the journey's rid, or `None`
    /// when the upstream response carried no such record.
    pub fn classify(
        &self,
        journey: &MonitoredJourney,
        delay: Option<&ServiceDelay>,
    ) -> DetectionResult {
        let Some(delay) = delay else {
            tracing::debug!(
                journey_id = %journey.journey_id,
                rid = ?journey.rid,
                "No delay data for journey"
            );
            return DetectionResult {
                delay_minutes: 0,
                is_delayed: false,
                is_cancelled: false,
                exceeds_threshold: false,
                claim_eligible: false,
                data_not_found: true,
                delay_reasons: None,
            };
        };

        let exceeds_threshold = delay.delay_minutes >= self.threshold_minutes;
        DetectionResult {
            delay_minutes: delay.delay_minutes,
            is_delayed: delay.delay_minutes > 0 || delay.is_cancelled,
            is_cancelled: delay.is_cancelled,
            exceeds_threshold,
            claim_eligible: exceeds_threshold || delay.is_cancelled,
            data_not_found: false,
            delay_reasons: delay.delay_reasons.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn journey() -> MonitoredJourney {
        let now = Utc::now();
        MonitoredJourney {
            id: Uuid::new_v4(),
            journey_id: "JRN-1".to_string(),
            user_id: "user-1".to_string(),
            service_date: now.date_naive(),
            origin_code: "KGX".to_string(),
            destination_code: "EDB".to_string(),
            scheduled_departure: now,
            scheduled_arrival: now + chrono::Duration::hours(4),
            rid: Some("202601200800999".to_string()),
            monitoring_status: crate::db::journeys::MonitoringStatus::Active,
            last_checked_at: None,
            next_check_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn delay(minutes: i32, cancelled: bool) -> ServiceDelay {
        ServiceDelay {
            rid: "202601200800999".to_string(),
            delay_minutes: minutes,
            is_cancelled: cancelled,
            delay_reasons: None,
        }
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        assert!(DelayDetector::new(0).is_err());
        assert!(DelayDetector::new(-5).is_err());
        assert!(DelayDetector::new(1).is_ok());
    }

    #[test]
    fn test_on_time() {
        let detector = DelayDetector::new(15).unwrap();
        let result = detector.classify(&journey(), Some(&delay(0, false)));

        assert!(!result.is_delayed);
        assert!(!result.is_cancelled);
        assert!(!result.exceeds_threshold);
        assert!(!result.claim_eligible);
        assert!(!result.data_not_found);
    }

    #[test]
    fn test_delayed_below_threshold() {
        let detector = DelayDetector::new(15).unwrap();
        let result = detector.classify(&journey(), Some(&delay(14, false)));

        assert!(result.is_delayed);
        assert!(!result.exceeds_threshold);
        assert!(!result.claim_eligible);
        assert_eq!(result.delay_minutes, 14);
    }

    #[test]
    fn test_threshold_boundary() {
        let detector = DelayDetector::new(15).unwrap();

        let at = detector.classify(&journey(), Some(&delay(15, false)));
        assert!(at.exceeds_threshold);
        assert!(at.claim_eligible);

        let above = detector.classify(&journey(), Some(&delay(16, false)));
        assert!(above.exceeds_threshold);
        assert!(above.claim_eligible);
    }

    #[test]
    fn test_cancellation_is_claim_eligible_regardless_of_minutes() {
        let detector = DelayDetector::new(15).unwrap();
        let result = detector.classify(&journey(), Some(&delay(0, true)));

        assert!(result.is_delayed);
        assert!(result.is_cancelled);
        assert!(!result.exceeds_threshold);
        assert!(result.claim_eligible);
        assert_eq!(result.delay_minutes, 0);
    }

    #[test]
    fn test_missing_data() {
        let detector = DelayDetector::new(15).unwrap();
        let result = detector.classify(&journey(), None);

        assert!(result.data_not_found);
        assert!(!result.is_delayed);
        assert!(!result.is_cancelled);
        assert!(!result.exceeds_threshold);
        assert!(!result.claim_eligible);
    }

    #[test]
    fn test_reasons_carried_through() {
        let detector = DelayDetector::new(15).unwrap();
        let mut d = delay(25, false);
        d.delay_reasons = Some(serde_json::json!([{"code": "signalling"}]));

        let result = detector.classify(&journey(), Some(&d));
        assert!(result.claim_eligible);
        assert_eq!(
            result.delay_reasons,
            Some(serde_json::json!([{"code": "signalling"}]))
        );
    }
}
