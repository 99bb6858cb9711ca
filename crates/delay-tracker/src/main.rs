// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delay Tracker - Journey Delay Monitoring Service
//!
//! Wires the detection cycle, the tick scheduler, the outbox relay, the
//! cleanup worker, and the HTTP surface, then runs until interrupted.

use std::sync::Arc;
use tracing::{info, warn};

use delay_tracker::claim_trigger::ClaimTrigger;
use delay_tracker::clients::{DelaysClient, MatcherClient, OracleClient};
use delay_tracker::config::Config;
use delay_tracker::db;
use delay_tracker::detection_cycle::DetectionCycle;
use delay_tracker::detector::DelayDetector;
use delay_tracker::monitor::{JourneyMonitor, MonitorConfig};
use delay_tracker::outbox_cleanup_worker::{OutboxCleanupConfig, OutboxCleanupWorker};
use delay_tracker::publisher::{LoggingEventBus, OutboxPublisher, OutboxRelay, PublisherConfig};
use delay_tracker::server::{self, AppState};
use delay_tracker::tick_scheduler::TickScheduler;
use delay_tracker::migrations;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delay_tracker=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        port = config.port,
        cron = %config.cron_expression,
        cron_enabled = config.cron_enabled,
        threshold_minutes = config.delay_threshold_minutes,
        "Starting Delay Tracker"
    );

    // Connect to database and apply migrations
    let pool = db::connect(&config.database_url, config.db_pool_size).await?;
    info!("Connected to database");

    migrations::run(&pool).await?;
    info!("Database schema verified");

    // External collaborators
    let matcher = Arc::new(MatcherClient::new(
        &config.matcher_api_url,
        config.http_timeout,
    )?);
    let delays = Arc::new(DelaysClient::new(
        &config.delays_api_url,
        config.http_timeout,
    )?);
    let oracle = Arc::new(OracleClient::new(
        &config.claims_api_url,
        config.http_timeout,
    )?);

    // Core components
    let monitor = Arc::new(JourneyMonitor::new(
        pool.clone(),
        MonitorConfig {
            tick_interval: config.tick_interval(),
            check_batch_size: config.check_batch_size,
        },
    ));
    let detector = DelayDetector::new(config.delay_threshold_minutes)?;
    let claim_trigger = ClaimTrigger::new(oracle, config.delay_threshold_minutes);

    let cycle = Arc::new(DetectionCycle::new(
        pool.clone(),
        monitor.clone(),
        detector,
        claim_trigger,
        matcher,
        delays,
    ));

    // Tick scheduler
    let scheduler = Arc::new(TickScheduler::new(cycle, config.tick_interval()));
    if config.cron_enabled {
        scheduler.start();
    } else {
        info!("Detection cycle disabled by configuration");
    }

    // Outbox relay
    let publisher = OutboxPublisher::new(
        pool.clone(),
        Arc::new(LoggingEventBus),
        PublisherConfig {
            max_retries: config.outbox_max_retries,
            ..Default::default()
        },
    );
    let relay = OutboxRelay::new(publisher);
    let relay_shutdown = relay.shutdown_handle();
    let relay_handle = tokio::spawn(async move { relay.run().await });

    // Outbox retention pruning
    let cleanup = OutboxCleanupWorker::new(
        pool.clone(),
        OutboxCleanupConfig {
            retention_days: config.outbox_retention_days,
            ..Default::default()
        },
    );
    let cleanup_shutdown = cleanup.shutdown_handle();
    let cleanup_handle = tokio::spawn(async move { cleanup.run().await });

    // HTTP surface
    let state = AppState {
        pool: pool.clone(),
        monitor: monitor.clone(),
        scheduler_metrics: scheduler.metrics(),
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "HTTP surface ready");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, server::router(state)).await {
            warn!(error = %e, "HTTP server exited");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown: drain the in-flight tick, then stop the workers.
    scheduler.stop().await;
    relay_shutdown.notify_one();
    cleanup_shutdown.notify_one();
    let _ = relay_handle.await;
    let _ = cleanup_handle.await;
    server_handle.abort();

    info!("Delay Tracker shut down");

    Ok(())
}
