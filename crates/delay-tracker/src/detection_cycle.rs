// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Detection cycle: the per-tick orchestration pipeline.
//!
//! One cycle fetches the due set, completes journeys whose arrival has
//! passed, resolves running ids for pending journeys, batch-queries the
//! upstream feed for the active ones, classifies each journey, and commits
//! detections one transaction per journey. A bad row rolls back alone; the
//! cycle carries on with the rest.
//!
//! Every outbox event written during a cycle shares one correlation id.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::claim_trigger::{ClaimOutcome, ClaimTrigger};
use crate::clients::{DelaysApi, MatcherApi, ServiceDelay};
use crate::db::alerts::{self, NewDelayAlert};
use crate::db::journeys::{self, MonitoredJourney, MonitoringStatus};
use crate::db::outbox;
use crate::detector::{DelayDetector, DetectionResult};
use crate::error::{Error, Result};
use crate::events;
use crate::monitor::JourneyMonitor;

/// Counters from one detection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleMetrics {
    /// Journeys in the due set.
    pub journeys_checked: u64,
    /// Alerts created this cycle.
    pub delays_detected: u64,
    /// Claims successfully handed to the oracle.
    pub claims_triggered: u64,
    /// Wall-clock duration of the cycle.
    pub duration_ms: u64,
}

/// Orchestrates one detection pass per tick.
pub struct DetectionCycle {
    pool: PgPool,
    monitor: Arc<JourneyMonitor>,
    detector: DelayDetector,
    claim_trigger: ClaimTrigger,
    matcher: Arc<dyn MatcherApi>,
    delays: Arc<dyn DelaysApi>,
}

impl DetectionCycle {
    /// Assemble a cycle from its collaborators.
    pub fn new(
        pool: PgPool,
        monitor: Arc<JourneyMonitor>,
        detector: DelayDetector,
        claim_trigger: ClaimTrigger,
        matcher: Arc<dyn MatcherApi>,
        delays: Arc<dyn DelaysApi>,
    ) -> Self {
        Self {
            pool,
            monitor,
            detector,
            claim_trigger,
            matcher,
            delays,
        }
    }

    /// Run one cycle at the current time.
    pub async fn run(&self) -> Result<CycleMetrics> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle as of `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CycleMetrics> {
        let started = Instant::now();
        let correlation_id = events::mint_correlation_id();

        let due = self.monitor.due_for_check(now).await?;
        if due.is_empty() {
            debug!("No journeys due for check");
            return Ok(CycleMetrics {
                duration_ms: elapsed_ms(started),
                ..Default::default()
            });
        }

        debug!(
            due = due.len(),
            correlation_id = %correlation_id,
            "Detection cycle started"
        );

        let mut pending_rid: Vec<&MonitoredJourney> = Vec::new();
        let mut active: Vec<&MonitoredJourney> = Vec::new();
        let mut to_pace: Vec<Uuid> = Vec::new();

        // Completion short-circuits everything else this cycle.
        for journey in &due {
            if now > journey.scheduled_arrival {
                if let Err(e) = self.complete_journey(journey, now, &correlation_id).await {
                    error!(
                        journey_id = %journey.journey_id,
                        error = %e,
                        "Failed to complete journey"
                    );
                    to_pace.push(journey.id);
                }
                continue;
            }

            match journey.monitoring_status {
                MonitoringStatus::PendingRid => pending_rid.push(journey),
                MonitoringStatus::Active => active.push(journey),
                // The due query cannot return anything else.
                _ => {}
            }
        }

        for journey in pending_rid {
            if !self.try_resolve_rid(journey, now).await {
                to_pace.push(journey.id);
            }
        }

        let mut delays_detected = 0u64;
        let mut claims_triggered = 0u64;

        if !active.is_empty() {
            let rids: Vec<String> = active.iter().filter_map(|j| j.rid.clone()).collect();

            let services = match self.delays.fetch_delays(&rids).await {
                Ok(services) => services,
                Err(e) => {
                    // No alerts without upstream data: pace everything we
                    // touched and surface the failure to the scheduler.
                    warn!(
                        journeys = active.len(),
                        error = %e,
                        "Upstream delays lookup failed, deferring active journeys"
                    );
                    to_pace.extend(active.iter().map(|j| j.id));
                    journeys::update_schedule(&self.pool, &to_pace, now, self.monitor.paced(now))
                        .await?;
                    return Err(e);
                }
            };

            let by_rid: HashMap<&str, &ServiceDelay> =
                services.iter().map(|s| (s.rid.as_str(), s)).collect();

            for journey in &active {
                let delay = journey
                    .rid
                    .as_deref()
                    .and_then(|rid| by_rid.get(rid))
                    .copied();
                let detection = self.detector.classify(journey, delay);

                if !(detection.exceeds_threshold || detection.is_cancelled) {
                    to_pace.push(journey.id);
                    continue;
                }

                match self
                    .commit_detection(journey, &detection, now, &correlation_id)
                    .await
                {
                    Ok(claimed) => {
                        delays_detected += 1;
                        if claimed {
                            claims_triggered += 1;
                        }
                    }
                    Err(e) => {
                        // Rolled back; the journey is untouched and will be
                        // examined again next tick.
                        error!(
                            journey_id = %journey.journey_id,
                            error = %e,
                            "Detection commit failed, continuing with next journey"
                        );
                        to_pace.push(journey.id);
                    }
                }
            }
        }

        journeys::update_schedule(&self.pool, &to_pace, now, self.monitor.paced(now)).await?;

        let metrics = CycleMetrics {
            journeys_checked: due.len() as u64,
            delays_detected,
            claims_triggered,
            duration_ms: elapsed_ms(started),
        };

        info!(
            journeys_checked = metrics.journeys_checked,
            delays_detected = metrics.delays_detected,
            claims_triggered = metrics.claims_triggered,
            duration_ms = metrics.duration_ms,
            correlation_id = %correlation_id,
            "Detection cycle completed"
        );

        Ok(metrics)
    }

    /// Ask the matcher for a running id and promote the journey on success.
    ///
    /// Returns false when the journey must wait for the next tick: unknown to
    /// the matcher, no resolved segment yet, or a matcher failure.
    async fn try_resolve_rid(&self, journey: &MonitoredJourney, now: DateTime<Utc>) -> bool {
        let matched = match self.matcher.journey_segments(&journey.journey_id).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(
                    journey_id = %journey.journey_id,
                    error = %e,
                    "Journey matcher lookup failed"
                );
                return false;
            }
        };

        // Multi-leg journeys are tracked by their first resolved leg.
        let Some(rid) = matched.as_ref().and_then(|m| m.first_rid()) else {
            debug!(
                journey_id = %journey.journey_id,
                "No running id available yet"
            );
            return false;
        };

        match self.monitor.resolve_rid(journey, rid, now).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    journey_id = %journey.journey_id,
                    rid = %rid,
                    error = %e,
                    "Failed to promote journey"
                );
                false
            }
        }
    }

    /// Mark a journey completed and narrate it, in one transaction.
    async fn complete_journey(
        &self,
        journey: &MonitoredJourney,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        journeys::update_status(&mut *tx, journey.id, MonitoringStatus::Completed, None, None)
            .await?;
        let latest_alert = alerts::find_latest_for_journey(&mut *tx, journey.id).await?;
        outbox::insert(
            &mut *tx,
            &events::journey_completed(journey, now, latest_alert.as_ref(), Some(correlation_id))?,
        )
        .await?;
        tx.commit().await?;

        info!(journey_id = %journey.journey_id, "Journey completed");

        Ok(())
    }

    /// Commit one detection: alert, status change, events, claim.
    ///
    /// Everything lands atomically or not at all. Returns whether a claim was
    /// successfully triggered.
    async fn commit_detection(
        &self,
        journey: &MonitoredJourney,
        detection: &DetectionResult,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<bool> {
        let new_status = if detection.is_cancelled {
            MonitoringStatus::Cancelled
        } else {
            MonitoringStatus::Delayed
        };
        JourneyMonitor::validate_transition(journey.monitoring_status, new_status)?;

        // Cancellations carry no meaningful minute count; the positive-minutes
        // constraint gets the sentinel 1.
        let new_alert = NewDelayAlert {
            id: Uuid::new_v4(),
            monitored_journey_id: journey.id,
            delay_minutes: detection.delay_minutes.max(1),
            delay_detected_at: now,
            delay_reasons: detection.delay_reasons.clone(),
            is_cancellation: detection.is_cancelled,
            threshold_exceeded: detection.exceeds_threshold,
        };

        let mut tx = self.pool.begin().await?;
        alerts::insert(&mut *tx, &new_alert).await?;
        journeys::update_status(
            &mut *tx,
            journey.id,
            new_status,
            None,
            self.monitor.next_check_after(new_status, now),
        )
        .await?;
        outbox::insert(
            &mut *tx,
            &events::delay_detected(
                journey,
                new_alert.id,
                new_alert.delay_minutes,
                detection.delay_reasons.clone(),
                Some(correlation_id),
            )?,
        )
        .await?;

        let mut claimed = false;
        if detection.claim_eligible && !detection.is_cancelled {
            let alert = alerts::find_by_id(&mut *tx, new_alert.id)
                .await?
                .ok_or_else(|| Error::AlertNotFound(new_alert.id.to_string()))?;

            let attempt = self.claim_trigger.trigger(&alert, journey).await;
            match &attempt.outcome {
                ClaimOutcome::Success {
                    claim_reference_id, ..
                } => {
                    let response = attempt
                        .oracle_response
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({}));
                    alerts::record_claim_outcome(
                        &mut *tx,
                        alert.id,
                        claim_reference_id,
                        &response,
                        now,
                    )
                    .await?;
                    outbox::insert(
                        &mut *tx,
                        &events::claim_triggered(
                            journey,
                            alert.id,
                            claim_reference_id,
                            alert.delay_minutes,
                            Some(correlation_id),
                        )?,
                    )
                    .await?;
                    claimed = true;
                }
                _ => {
                    if let Some(response) = &attempt.oracle_response {
                        alerts::record_claim_failure(&mut *tx, alert.id, response).await?;
                    }
                }
            }
        }

        tx.commit().await?;

        info!(
            journey_id = %journey.journey_id,
            alert_id = %new_alert.id,
            delay_minutes = new_alert.delay_minutes,
            cancelled = detection.is_cancelled,
            claim_triggered = claimed,
            "Delay recorded"
        );

        Ok(claimed)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
