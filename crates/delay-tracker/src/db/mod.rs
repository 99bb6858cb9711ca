// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database operations for delay-tracker.
//!
//! Every statement is a free async function generic over [`sqlx::PgExecutor`],
//! so the same operation can run against the shared pool or inside a
//! caller-supplied transaction. The detection cycle relies on this to commit
//! an alert, a status change, and the outbox rows that narrate them
//! atomically.

pub mod alerts;
pub mod journeys;
pub mod outbox;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect a pool with the configured size.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await
}

/// Health check for database connectivity.
pub async fn health_check(pool: &PgPool) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| true)
}
