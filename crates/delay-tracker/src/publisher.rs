// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbox publisher: relays durable events to the message bus.
//!
//! A relay pass selects pending rows under `FOR UPDATE SKIP LOCKED`, hands
//! each to the injected [`EventBus`], and records the per-row outcome inside
//! the same transaction. Rows locked by another worker are skipped, so any
//! number of relay processes can run against the same outbox without
//! publishing an event twice. Failed rows are retried on later passes until
//! the configured attempt budget is spent.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::db::outbox::{self, OutboxEvent};
use crate::error::Result;

/// Destination for relayed outbox events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Deliver one event. An error leaves the row failed for a later retry.
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

/// Bus implementation that logs events instead of delivering them.
///
/// Delivery beyond durable storage is out of scope for the tracker itself;
/// deployments wire a real broker by implementing [`EventBus`].
pub struct LoggingEventBus;

#[async_trait]
impl EventBus for LoggingEventBus {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        info!(
            event_id = event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            correlation_id = ?event.correlation_id,
            "Outbox event published"
        );
        Ok(())
    }
}

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum events relayed per pass.
    pub batch_size: i64,
    /// Maximum delivery attempts before a row stays failed.
    pub max_retries: i32,
    /// How often the relay worker polls for work.
    pub poll_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Counts from one relay or retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Events delivered and marked processed.
    pub processed: u64,
    /// Events that failed delivery.
    pub failed: u64,
}

/// Relays outbox events to the bus.
pub struct OutboxPublisher {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    config: PublisherConfig,
}

impl OutboxPublisher {
    /// Create a publisher over the given bus.
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, config: PublisherConfig) -> Self {
        Self { pool, bus, config }
    }

    /// One relay pass over pending events.
    ///
    /// Rows are locked for the duration of the pass; concurrent passes skip
    /// each other's rows.
    pub async fn process_outbox(&self) -> Result<RelayStats> {
        let mut tx = self.pool.begin().await?;
        let events = outbox::find_pending_for_processing(&mut tx, self.config.batch_size).await?;

        if events.is_empty() {
            tx.rollback().await?;
            return Ok(RelayStats::default());
        }

        let mut stats = RelayStats::default();
        for event in &events {
            match self.bus.publish(event).await {
                Ok(()) => {
                    outbox::mark_processed(&mut *tx, event.id).await?;
                    stats.processed += 1;
                }
                Err(e) => {
                    warn!(
                        event_id = event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "Failed to publish outbox event"
                    );
                    outbox::mark_failed(&mut *tx, event.id, &e.to_string()).await?;
                    stats.failed += 1;
                }
            }
        }
        tx.commit().await?;

        debug!(
            processed = stats.processed,
            failed = stats.failed,
            "Outbox relay pass completed"
        );

        Ok(stats)
    }

    /// Retry failed events that are still under the attempt budget.
    pub async fn retry_failed_events(&self) -> Result<RelayStats> {
        let failed = outbox::find_failed_for_retry(&self.pool, self.config.max_retries).await?;

        if failed.is_empty() {
            return Ok(RelayStats::default());
        }

        info!(count = failed.len(), "Retrying failed outbox events");

        let mut stats = RelayStats::default();
        for event in &failed {
            outbox::reset_to_pending(&self.pool, event.id).await?;
            match self.bus.publish(event).await {
                Ok(()) => {
                    outbox::mark_processed(&self.pool, event.id).await?;
                    stats.processed += 1;
                }
                Err(e) => {
                    outbox::mark_failed(&self.pool, event.id, &e.to_string()).await?;
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Background worker driving relay and retry passes.
pub struct OutboxRelay {
    publisher: OutboxPublisher,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
}

impl OutboxRelay {
    /// Create a relay worker around a publisher.
    pub fn new(publisher: OutboxPublisher) -> Self {
        let poll_interval = publisher.config.poll_interval;
        Self {
            publisher,
            poll_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the relay loop until shutdown.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.publisher.config.batch_size,
            max_retries = self.publisher.config.max_retries,
            "Outbox relay started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Outbox relay received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.publisher.process_outbox().await {
                        error!(error = %e, "Outbox relay pass failed");
                    }
                    if let Err(e) = self.publisher.retry_failed_events().await {
                        error!(error = %e, "Outbox retry pass failed");
                    }
                }
            }
        }

        info!("Outbox relay stopped");
    }
}
