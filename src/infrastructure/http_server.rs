//! HTTP surface.
//!
//! `GET /sync` triggers a scheduled-style run behind the shared-secret
//! bearer check; `POST /sync` is the manual alias (bypasses the check
//! outside production); `GET /health` serves the derived health
//! report. The trigger endpoints return a JSON summary for any
//! completed run including `partial` and `failed`; only a top-level
//! abort or an auth failure produces a non-200.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::health::HealthSnapshotBuilder;
use crate::application::sync_orchestrator::{SyncOrchestrator, SyncOutcome};
use crate::domain::entities::{SyncRunStatus, SyncTrigger};
use crate::infrastructure::config::AppConfig;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub health: Arc<HealthSnapshotBuilder>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", get(trigger_sync_scheduled).post(trigger_sync_manual))
        .route("/health", get(health_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ===============================
// RESPONSES
// ===============================

/// Run summary returned by the trigger endpoints.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub status: SyncRunStatus,
    pub synced: i64,
    pub failed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub duration: i64,
}

impl SyncResponse {
    fn from_outcome(outcome: SyncOutcome) -> Self {
        Self {
            success: true,
            message: "Stats sync completed".to_string(),
            status: outcome.status,
            synced: outcome.success_count,
            failed: outcome.failure_count,
            errors: if outcome.errors.is_empty() {
                None
            } else {
                Some(outcome.errors)
            },
            timestamp: outcome.completed_at,
            duration: outcome.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncFailureResponse {
    success: bool,
    error: String,
    details: String,
    timestamp: DateTime<Utc>,
    duration: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

// ===============================
// AUTH
// ===============================

fn authorize(headers: &HeaderMap, config: &AppConfig) -> Result<(), Response> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let authorized = match config.cron_secret.as_deref() {
        Some(secret) => provided == Some(format!("Bearer {secret}").as_str()),
        // No secret configured: only acceptable outside production.
        None => !config.production,
    };

    if authorized {
        Ok(())
    } else {
        warn!(
            has_auth_header = provided.is_some(),
            has_secret = config.cron_secret.is_some(),
            "unauthorized sync trigger"
        );
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
                details: None,
            }),
        )
            .into_response())
    }
}

// ===============================
// HANDLERS
// ===============================

async fn trigger_sync_scheduled(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&headers, &state.config) {
        return response;
    }
    run_and_respond(&state, SyncTrigger::Scheduled).await
}

async fn trigger_sync_manual(State(state): State<AppState>, headers: HeaderMap) -> Response {
    // Manual triggers bypass the bearer check outside production.
    if state.config.production {
        if let Err(response) = authorize(&headers, &state.config) {
            return response;
        }
    }
    run_and_respond(&state, SyncTrigger::Manual).await
}

async fn run_and_respond(state: &AppState, trigger: SyncTrigger) -> Response {
    let started_at = Utc::now();
    match state.orchestrator.run_sync(trigger).await {
        Ok(outcome) => Json(SyncResponse::from_outcome(outcome)).into_response(),
        Err(err) => {
            error!(error = %err, "sync run aborted");
            let completed_at = Utc::now();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncFailureResponse {
                    success: false,
                    error: "Stats sync failed".to_string(),
                    details: err.to_string(),
                    timestamp: completed_at,
                    duration: (completed_at - started_at).num_milliseconds(),
                }),
            )
                .into_response()
        }
    }
}

async fn health_report(State(state): State<AppState>) -> Response {
    match state.health.build().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            error!(error = %err, "failed to build health report");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch sync health".to_string(),
                    details: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
