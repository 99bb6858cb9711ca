// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for delay-tracker.

use thiserror::Error;

/// Delay tracker errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A row with the same unique key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested lifecycle transition is not permitted.
    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        /// Status the journey is currently in.
        from: crate::db::journeys::MonitoringStatus,
        /// Status the caller tried to move to.
        to: crate::db::journeys::MonitoringStatus,
    },

    /// Journey was not found.
    #[error("Journey not found: {0}")]
    JourneyNotFound(String),

    /// Alert was not found.
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    /// Upstream delays feed returned an error or timed out.
    #[error("{0}")]
    Upstream(String),

    /// Journey matcher returned an error or timed out.
    #[error("{0}")]
    Matcher(String),

    /// Claims oracle was unreachable or timed out.
    #[error("{0}")]
    OracleNetwork(String),

    /// Event delivery to the bus failed.
    #[error("Publish error: {0}")]
    Publish(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // Unique violations surface as Conflict so callers can map them to a
        // 4xx-equivalent instead of a storage failure.
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return Error::Conflict(db_err.message().to_string());
            }
        }
        Error::Database(err)
    }
}

/// Result type using the delay-tracker [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
