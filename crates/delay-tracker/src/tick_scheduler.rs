// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tick scheduler: fires the detection cycle on a fixed cadence.
//!
//! `start` is idempotent and fires one tick immediately; `stop` is idempotent
//! and drains an in-flight tick before returning. An in-flight flag drops
//! overlapping ticks rather than queueing them. Cycle failures are counted
//! and logged; nothing short of shutdown stops the scheduler.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::detection_cycle::{CycleMetrics, DetectionCycle};
use crate::error::Result;

/// One tick's worth of work, injected so tests can fake the cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Run one detection cycle.
    async fn run_cycle(&self) -> Result<CycleMetrics>;
}

#[async_trait]
impl CycleRunner for DetectionCycle {
    async fn run_cycle(&self) -> Result<CycleMetrics> {
        self.run().await
    }
}

/// Cumulative scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    executions: AtomicU64,
    errors: AtomicU64,
    ticks_dropped: AtomicU64,
    journeys_processed: AtomicU64,
    delays_detected: AtomicU64,
    claims_triggered: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// Point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Completed tick executions, successful or not.
    pub executions: u64,
    /// Ticks that ended in a cycle error.
    pub errors: u64,
    /// Ticks dropped because another tick was in flight.
    pub ticks_dropped: u64,
    /// Total journeys examined across all ticks.
    pub journeys_processed: u64,
    /// Total alerts created across all ticks.
    pub delays_detected: u64,
    /// Total claims triggered across all ticks.
    pub claims_triggered: u64,
    /// Duration of the most recent tick.
    pub last_duration_ms: u64,
}

impl SchedulerMetrics {
    fn record_cycle(&self, metrics: &CycleMetrics) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.journeys_processed
            .fetch_add(metrics.journeys_checked, Ordering::Relaxed);
        self.delays_detected
            .fetch_add(metrics.delays_detected, Ordering::Relaxed);
        self.claims_triggered
            .fetch_add(metrics.claims_triggered, Ordering::Relaxed);
        self.last_duration_ms
            .store(metrics.duration_ms, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions: self.executions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            journeys_processed: self.journeys_processed.load(Ordering::Relaxed),
            delays_detected: self.delays_detected.load(Ordering::Relaxed),
            claims_triggered: self.claims_triggered.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Drives the detection cycle on a fixed interval.
pub struct TickScheduler {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    metrics: Arc<SchedulerMetrics>,
    in_flight: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    /// Create a scheduler over a cycle runner.
    pub fn new(runner: Arc<dyn CycleRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            metrics: Arc::new(SchedulerMetrics::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Shared handle to the scheduler counters.
    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    /// Whether the scheduler loop is installed.
    pub fn is_running(&self) -> bool {
        self.handle.lock().expect("scheduler handle lock").is_some()
    }

    /// Install the repeating timer and fire one tick immediately.
    ///
    /// Calling `start` on a running scheduler is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock().expect("scheduler handle lock");
        if handle.is_some() {
            debug!("Tick scheduler already running");
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            "Tick scheduler started"
        );

        let runner = self.runner.clone();
        let metrics = self.metrics.clone();
        let in_flight = self.in_flight.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;

        *handle = Some(tokio::spawn(async move {
            Self::execute(&runner, &metrics, &in_flight).await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        info!("Tick scheduler shutting down");
                        break;
                    }

                    _ = tokio::time::sleep(interval) => {
                        Self::execute(&runner, &metrics, &in_flight).await;
                    }
                }
            }
        }));
    }

    /// Cancel the timer and wait for an in-flight tick to drain.
    ///
    /// Calling `stop` on a stopped scheduler is a no-op.
    pub async fn stop(&self) {
        let handle = self.handle.lock().expect("scheduler handle lock").take();
        let Some(handle) = handle else {
            debug!("Tick scheduler already stopped");
            return;
        };

        self.shutdown.notify_one();
        if handle.await.is_err() {
            error!("Tick scheduler task panicked");
        }

        info!("Tick scheduler stopped");
    }

    /// Run one guarded tick outside the timer.
    pub async fn execute_now(&self) {
        Self::execute(&self.runner, &self.metrics, &self.in_flight).await;
    }

    async fn execute(
        runner: &Arc<dyn CycleRunner>,
        metrics: &Arc<SchedulerMetrics>,
        in_flight: &Arc<AtomicBool>,
    ) {
        if in_flight.swap(true, Ordering::SeqCst) {
            warn!("Detection cycle still in flight, dropping tick");
            metrics.record_dropped();
            return;
        }

        match runner.run_cycle().await {
            Ok(cycle) => metrics.record_cycle(&cycle),
            Err(e) => {
                error!(error = %e, "Detection cycle failed");
                metrics.record_error();
            }
        }

        in_flight.store(false, Ordering::SeqCst);
    }
}
