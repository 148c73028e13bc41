//! Axum router and handlers for the read-only Query API.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! CORS/tracing middleware. Handlers are `pub(crate)` so integration tests
//! under `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use sentinel_checks::Check;

use crate::api_types::{
    CheckHistoryResponse, ErrorResponse, HealthResponse, PerCheckStats, StatusSummary,
};
use crate::state::AppState;

const SERVICE_NAME: &str = "sentinel-daemon";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of history rows returned when the caller does not ask for
/// a different count via `?limit=`.
const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/checks/:check_id/history", get(check_history))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: SERVICE_NAME,
            version: SERVICE_VERSION,
            notifications_connected: st.notification_sink_connected,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = st.stats.lock().await;
    let failures = st.failures.lock().await;

    let mut per_check_stats: Vec<PerCheckStats> = stats
        .iter()
        .map(|(check_id, s)| PerCheckStats {
            check_id: check_id.clone(),
            total_runs: s.total_runs,
            pass_count: s.pass_count,
            warn_count: s.warn_count,
            fail_count: s.fail_count,
            mean_latency_ms: s.mean_latency_ms(),
        })
        .collect();
    per_check_stats.sort_by(|a, b| a.check_id.cmp(&b.check_id));

    let enabled_checks: Vec<String> = st.checks.iter().map(|c| c.id().to_string()).collect();

    let summary = StatusSummary {
        running: true,
        total_checks: st.checks.len(),
        enabled_checks,
        recent_failures: failures.len(),
        per_check_stats,
        last_cycle_time: *st.last_cycle_time.read().await,
        last_cycle_duration_ms: *st.last_cycle_duration_ms.read().await,
    };

    (StatusCode::OK, Json(summary))
}

// ---------------------------------------------------------------------------
// GET /v1/checks/:check_id/history
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    limit: Option<i64>,
}

pub(crate) async fn check_history(
    State(st): State<Arc<AppState>>,
    Path(check_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if !st.checks.iter().any(|c| c.id() == check_id) {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown check_id '{check_id}'"),
            }),
        )
            .into_response();
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match sentinel_db::query_history(&st.pool, &check_id, limit).await {
        Ok(results) => (
            StatusCode::OK,
            Json(CheckHistoryResponse { check_id, results }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("failed to query history: {e}"),
            }),
        )
            .into_response(),
    }
}
