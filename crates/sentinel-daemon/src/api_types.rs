//! Request and response types for the Query API. `Serialize`-only where
//! the daemon never accepts a matching request body — this API is
//! read-only by design (spec §4.8: no writes, reconfiguration, or control
//! operations).

use chrono::{DateTime, Utc};
use sentinel_schemas::CheckResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// Outcome of the startup `TestConnection` probe against the
    /// notification sink. `null` if no sink is configured.
    pub notifications_connected: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerCheckStats {
    pub check_id: String,
    pub total_runs: u64,
    pub pass_count: u64,
    pub warn_count: u64,
    pub fail_count: u64,
    pub mean_latency_ms: f64,
}

/// Response for `GET /v1/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub running: bool,
    pub total_checks: usize,
    pub enabled_checks: Vec<String>,
    pub recent_failures: usize,
    pub per_check_stats: Vec<PerCheckStats>,
    pub last_cycle_time: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: Option<f64>,
}

/// Response for `GET /v1/checks/:check_id/history`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckHistoryResponse {
    pub check_id: String,
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
