// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for pruning old outbox records.
//!
//! Processed events older than the retention period are deleted. Pending and
//! failed rows are never pruned, so undelivered events outlive any retention
//! setting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::db::outbox;
use crate::error::Result;

/// Configuration for the outbox cleanup worker.
#[derive(Debug, Clone)]
pub struct OutboxCleanupConfig {
    /// Whether cleanup runs at all.
    pub enabled: bool,
    /// How often to run cleanup.
    pub poll_interval: Duration,
    /// Days a processed row is kept before pruning.
    pub retention_days: i64,
}

impl Default for OutboxCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(3600),
            retention_days: 7,
        }
    }
}

/// Background worker that prunes processed outbox rows.
pub struct OutboxCleanupWorker {
    pool: PgPool,
    config: OutboxCleanupConfig,
    shutdown: Arc<Notify>,
}

impl OutboxCleanupWorker {
    /// Create a new cleanup worker.
    pub fn new(pool: PgPool, config: OutboxCleanupConfig) -> Self {
        Self {
            pool,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the cleanup loop until shutdown.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Outbox cleanup worker disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            retention_days = self.config.retention_days,
            "Outbox cleanup worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Outbox cleanup worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.cleanup_once().await {
                        error!(error = %e, "Failed to prune outbox");
                    }
                }
            }
        }

        info!("Outbox cleanup worker stopped");
    }

    /// One pruning pass.
    pub async fn cleanup_once(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let deleted = outbox::delete_processed_older_than(&self.pool, cutoff).await?;

        if deleted > 0 {
            info!(deleted = deleted, cutoff = %cutoff, "Pruned processed outbox events");
        } else {
            debug!("Outbox cleanup pass found nothing to prune");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = OutboxCleanupConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert_eq!(config.retention_days, 7);
    }

    #[test]
    fn test_config_custom_retention() {
        let config = OutboxCleanupConfig {
            retention_days: 30,
            ..Default::default()
        };
        assert_eq!(config.retention_days, 30);
    }
}
