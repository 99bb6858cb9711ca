// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface: health, scheduler metrics, and journey registration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::db::{self, journeys};
use crate::error::Error;
use crate::monitor::{JourneyMonitor, RegisterJourneyRequest};
use crate::tick_scheduler::SchedulerMetrics;

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared connection pool.
    pub pool: PgPool,
    /// Journey monitor for registration and cancellation.
    pub monitor: Arc<JourneyMonitor>,
    /// Scheduler counters exposed at `/metrics`.
    pub scheduler_metrics: Arc<SchedulerMetrics>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/v1/journeys", post(register_journey))
        .route(
            "/api/v1/journeys/{journey_id}",
            get(get_journey).delete(delete_journey),
        )
        .route("/api/v1/journeys/{journey_id}/cancel", post(cancel_journey))
        .route("/api/v1/users/{user_id}/journeys", get(list_user_journeys))
        .with_state(state)
}

/// Error wrapper mapping service errors onto HTTP statuses.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Conflict(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::JourneyNotFound(_) | Error::AlertNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
        }

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn healthz(State(state): State<AppState>) -> Response {
    match db::health_check(&state.pool).await {
        Ok(_) => Json(serde_json::json!({ "status": "ok", "database": "up" })).into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded", "database": "down" })),
            )
                .into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    Json(state.scheduler_metrics.snapshot()).into_response()
}

async fn register_journey(
    State(state): State<AppState>,
    Json(request): Json<RegisterJourneyRequest>,
) -> Result<Response, ApiError> {
    let journey = state.monitor.register_journey(&request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(journey)).into_response())
}

async fn get_journey(
    State(state): State<AppState>,
    Path(journey_id): Path<String>,
) -> Result<Response, ApiError> {
    let journey = journeys::find_by_journey_id(&state.pool, &journey_id)
        .await
        .map_err(Error::from)?
        .ok_or(Error::JourneyNotFound(journey_id))?;
    Ok(Json(journey).into_response())
}

async fn list_user_journeys(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    let list = journeys::find_by_user(&state.pool, &user_id)
        .await
        .map_err(Error::from)?;
    Ok(Json(list).into_response())
}

async fn cancel_journey(
    State(state): State<AppState>,
    Path(journey_id): Path<String>,
) -> Result<Response, ApiError> {
    let journey = journeys::find_by_journey_id(&state.pool, &journey_id)
        .await
        .map_err(Error::from)?
        .ok_or_else(|| Error::JourneyNotFound(journey_id.clone()))?;

    state.monitor.cancel_journey(&journey).await?;

    let cancelled = journeys::find_by_journey_id(&state.pool, &journey_id)
        .await
        .map_err(Error::from)?
        .ok_or(Error::JourneyNotFound(journey_id))?;
    Ok(Json(cancelled).into_response())
}

async fn delete_journey(
    State(state): State<AppState>,
    Path(journey_id): Path<String>,
) -> Result<Response, ApiError> {
    let journey = journeys::find_by_journey_id(&state.pool, &journey_id)
        .await
        .map_err(Error::from)?
        .ok_or(Error::JourneyNotFound(journey_id))?;

    journeys::delete(&state.pool, journey.id)
        .await
        .map_err(Error::from)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
