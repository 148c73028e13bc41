//! Shared runtime state for sentinel-daemon.
//!
//! The runner is the single owner of the ring buffers, check set, and
//! per-check statistics; `AppState` is the `Arc`-wrapped handle threaded
//! into both the scheduler and the Axum handlers. No global/singleton
//! state exists outside this struct.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sentinel_alerts::{AlertManager, SummaryReport};
use sentinel_checks::Check;
use sentinel_config::SentinelConfig;
use sentinel_schemas::{CheckResult, CheckStats};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};

use crate::ring::RingBuffer;

const FAILURES_CAP: usize = 200;
const REPORTS_CAP: usize = 50;
const TRACES_CAP: usize = 500;

/// A lightweight execution record retained for the hot read path; a
/// trimmed-down projection of `CheckResult`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceRecord {
    pub ts: DateTime<Utc>,
    pub check_id: String,
    pub status: String,
    pub latency_ms: f64,
}

impl From<&CheckResult> for TraceRecord {
    fn from(r: &CheckResult) -> Self {
        Self {
            ts: r.timestamp,
            check_id: r.check_id.clone(),
            status: r.status.as_str().to_string(),
            latency_ms: r.latency_ms,
        }
    }
}

pub struct AppState {
    pub config: SentinelConfig,
    pub pool: SqlitePool,
    pub checks: Vec<Arc<dyn Check>>,
    pub alert_manager: Arc<AlertManager>,

    pub stats: Mutex<HashMap<String, CheckStats>>,
    pub failures: Mutex<RingBuffer<CheckResult>>,
    pub reports: Mutex<RingBuffer<SummaryReport>>,
    pub traces: Mutex<RingBuffer<TraceRecord>>,

    pub last_cycle_time: RwLock<Option<DateTime<Utc>>>,
    pub last_cycle_duration_ms: RwLock<Option<f64>>,

    /// Result of the one-time startup `TestConnection` probe against the
    /// notification sink. `None` means no sink is configured at all.
    pub notification_sink_connected: Option<bool>,

    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: SentinelConfig,
        pool: SqlitePool,
        checks: Vec<Arc<dyn Check>>,
        alert_manager: Arc<AlertManager>,
        notification_sink_connected: Option<bool>,
    ) -> Self {
        Self {
            config,
            pool,
            checks,
            alert_manager,
            stats: Mutex::new(HashMap::new()),
            failures: Mutex::new(RingBuffer::new(FAILURES_CAP)),
            reports: Mutex::new(RingBuffer::new(REPORTS_CAP)),
            traces: Mutex::new(RingBuffer::new(TRACES_CAP)),
            last_cycle_time: RwLock::new(None),
            last_cycle_duration_ms: RwLock::new(None),
            notification_sink_connected,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Records one result into stats, the trace ring buffer, and (if
    /// non-pass) the failures ring buffer. Does not touch persistence or
    /// the alert manager — callers run those in the order the invariants
    /// require (persist, then buffers, then alert manager).
    pub async fn record_in_memory(&self, result: &CheckResult) {
        {
            let mut stats = self.stats.lock().await;
            stats.entry(result.check_id.clone()).or_default().record(result);
        }
        {
            let mut traces = self.traces.lock().await;
            traces.push(TraceRecord::from(result));
        }
        if result.status != sentinel_schemas::CheckStatus::Pass {
            let mut failures = self.failures.lock().await;
            failures.push(result.clone());
        }
    }
}
