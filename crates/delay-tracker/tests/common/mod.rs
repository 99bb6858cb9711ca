// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for delay-tracker integration tests.
//!
//! Provides a database pool helper, journey seeding, and fake collaborators
//! for the detection cycle and the outbox relay.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use delay_tracker::clients::{
    ClaimTriggerRequest, ClaimTriggerResponse, ClaimsApi, DelaysApi, EligibilityRequest,
    EligibilityResponse, JourneySegment, JourneyWithSegments, MatcherApi, ServiceDelay,
};
use delay_tracker::db::journeys::{self, MonitoredJourney, MonitoringStatus, NewMonitoredJourney};
use delay_tracker::db::outbox::OutboxEvent;
use delay_tracker::error::{Error, Result};
use delay_tracker::publisher::EventBus;

/// Helper macro to skip tests if database URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DELAY_TRACKER_DATABASE_URL").is_err()
            && std::env::var("DELAY_TRACKER_DATABASE_URL").is_err()
        {
            eprintln!(
                "Skipping test: TEST_DELAY_TRACKER_DATABASE_URL or DELAY_TRACKER_DATABASE_URL not set"
            );
            return;
        }
    };
}

/// Get a migrated database pool for testing.
pub async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_DELAY_TRACKER_DATABASE_URL")
        .or_else(|_| std::env::var("DELAY_TRACKER_DATABASE_URL"))
        .ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    delay_tracker::migrations::run(&pool).await.ok()?;
    Some(pool)
}

/// A unique external journey id for test isolation.
pub fn unique_journey_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Seed a journey in `pending_rid`, due at `next_check_at`.
pub async fn seed_pending_journey(
    pool: &PgPool,
    journey_id: &str,
    scheduled_departure: DateTime<Utc>,
    scheduled_arrival: DateTime<Utc>,
    next_check_at: DateTime<Utc>,
) -> MonitoredJourney {
    let new_journey = NewMonitoredJourney {
        id: Uuid::new_v4(),
        journey_id: journey_id.to_string(),
        user_id: "test-user".to_string(),
        service_date: scheduled_departure.date_naive(),
        origin_code: "KGX".to_string(),
        destination_code: "EDB".to_string(),
        scheduled_departure,
        scheduled_arrival,
        next_check_at,
    };
    journeys::insert(pool, &new_journey)
        .await
        .expect("Failed to seed journey");
    journeys::find_by_id(pool, new_journey.id)
        .await
        .expect("Failed to load seeded journey")
        .expect("Seeded journey should exist")
}

/// Seed a journey in `active` with a resolved rid, due at `next_check_at`.
pub async fn seed_active_journey(
    pool: &PgPool,
    journey_id: &str,
    rid: &str,
    scheduled_arrival: DateTime<Utc>,
    next_check_at: DateTime<Utc>,
) -> MonitoredJourney {
    let journey = seed_pending_journey(
        pool,
        journey_id,
        scheduled_arrival - ChronoDuration::hours(4),
        scheduled_arrival,
        next_check_at,
    )
    .await;
    journeys::update_status(
        pool,
        journey.id,
        MonitoringStatus::Active,
        Some(rid),
        Some(next_check_at),
    )
    .await
    .expect("Failed to activate seeded journey");
    journeys::find_by_id(pool, journey.id)
        .await
        .expect("Failed to load seeded journey")
        .expect("Seeded journey should exist")
}

/// Delete a seeded journey and the outbox events that mention it.
pub async fn cleanup_journey(pool: &PgPool, journey: &MonitoredJourney) {
    sqlx::query("DELETE FROM delay_tracker.outbox WHERE payload->>'journeyId' = $1")
        .bind(&journey.journey_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM delay_tracker.monitored_journeys WHERE id = $1")
        .bind(journey.id)
        .execute(pool)
        .await
        .ok();
}

/// Matcher fake returning a fixed rid (or nothing).
pub struct FakeMatcher {
    rid: Option<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeMatcher {
    pub fn with_rid(rid: &str) -> Self {
        Self {
            rid: Some(rid.to_string()),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unmatched() -> Self {
        Self {
            rid: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            rid: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatcherApi for FakeMatcher {
    async fn journey_segments(&self, journey_id: &str) -> Result<Option<JourneyWithSegments>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Matcher(
                "Journey Matcher API error: 500 Internal Server Error".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Some(JourneyWithSegments {
            id: journey_id.to_string(),
            user_id: "test-user".to_string(),
            origin_crs: "KGX".to_string(),
            destination_crs: "EDB".to_string(),
            travel_date: now.date_naive(),
            status: "matched".to_string(),
            segments: vec![JourneySegment {
                id: format!("{}-seg-1", journey_id),
                journey_id: journey_id.to_string(),
                sequence: 1,
                rid: self.rid.clone(),
                origin_crs: "KGX".to_string(),
                destination_crs: "EDB".to_string(),
                scheduled_departure: now,
                scheduled_arrival: now + ChronoDuration::hours(4),
                toc_code: Some("GR".to_string()),
            }],
        }))
    }
}

/// Delays-feed fake serving a fixed set of records.
pub struct FakeDelays {
    services: Vec<ServiceDelay>,
    fail: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeDelays {
    pub fn with_services(services: Vec<ServiceDelay>) -> Self {
        Self {
            services,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_services(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            services: Vec::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The rid batches received, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DelaysApi for FakeDelays {
    async fn fetch_delays(&self, rids: &[String]) -> Result<Vec<ServiceDelay>> {
        self.calls.lock().unwrap().push(rids.to_vec());
        if self.fail {
            return Err(Error::Upstream(
                "Upstream API error: 503 Service Unavailable".to_string(),
            ));
        }
        Ok(self
            .services
            .iter()
            .filter(|s| rids.contains(&s.rid))
            .cloned()
            .collect())
    }
}

/// Oracle fake returning a fixed response (or a network failure).
pub struct FakeOracle {
    response: ClaimTriggerResponse,
    fail_network: bool,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn succeeding(reference: &str) -> Self {
        Self {
            response: ClaimTriggerResponse {
                success: true,
                claim_reference_id: Some(reference.to_string()),
                eligible: Some(true),
                estimated_compensation: Some(25.5),
                ..Default::default()
            },
            fail_network: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(response: ClaimTriggerResponse) -> Self {
        Self {
            response,
            fail_network: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            response: ClaimTriggerResponse::default(),
            fail_network: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimsApi for FakeOracle {
    async fn trigger_claim(&self, _request: &ClaimTriggerRequest) -> Result<ClaimTriggerResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_network {
            return Err(Error::OracleNetwork("Claims API request timeout".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn check_eligibility(&self, _request: &EligibilityRequest) -> Result<EligibilityResponse> {
        Ok(EligibilityResponse {
            eligible: true,
            reason: None,
        })
    }
}

/// Event bus fake that fails a configured number of times, then succeeds.
pub struct FlakyBus {
    failures_left: AtomicUsize,
    published: Mutex<Vec<i64>>,
}

impl FlakyBus {
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn reliable() -> Self {
        Self::failing_times(0)
    }

    /// Event ids successfully published, in delivery order.
    pub fn published(&self) -> Vec<i64> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for FlakyBus {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Publish("broker unavailable".to_string()));
        }
        self.published.lock().unwrap().push(event.id);
        Ok(())
    }
}
