//! The tick loop: fan out enabled checks on a fixed interval, persist each
//! result, update in-memory state, and hand it to the alert manager — in
//! that order, so nothing derived from a result can outrun its own write.
//!
//! A second, independent loop emits a periodic digest over the same window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sentinel_checks::execute_with_timeout;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::state::AppState;

/// Per-check timeout as a fraction of the cycle interval, so a single slow
/// check can never run past the next tick. Floored at 5s, which only binds
/// for intervals below `sentinel_config::MIN_CHECK_INTERVAL_SECONDS` — a
/// floor `SentinelConfig::from_env` already enforces, so this can never
/// reach or exceed `cycle_interval` in practice.
fn per_check_timeout(cycle_interval: Duration) -> Duration {
    let budget = cycle_interval.mul_f64(0.8);
    budget.max(Duration::from_secs(5))
}

/// Run one fan-out cycle: every enabled check concurrently, joined before
/// returning. Each result is persisted, folded into in-memory state, and
/// then handed to the alert manager.
pub async fn run_cycle(state: &Arc<AppState>) {
    let cycle_interval = Duration::from_secs(state.config.check_interval_seconds);
    let timeout = per_check_timeout(cycle_interval);
    let started = std::time::Instant::now();

    let handles: Vec<_> = state
        .checks
        .iter()
        .cloned()
        .map(|check| tokio::spawn(execute_with_timeout(check, timeout)))
        .collect();

    for handle in handles {
        match handle.await {
            Ok(result) => {
                sentinel_db::store_result_best_effort(&state.pool, &result).await;
                state.record_in_memory(&result).await;
                state.alert_manager.process_result(&result).await;
            }
            Err(join_err) => {
                warn!(error = %join_err, "scheduler task join failed unexpectedly");
            }
        }
    }

    let dispatched = state.alert_manager.process_notification_queue().await;
    if dispatched > 0 {
        info!(dispatched, "drained queued notifications");
    }

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    *state.last_cycle_time.write().await = Some(Utc::now());
    *state.last_cycle_duration_ms.write().await = Some(duration_ms);
}

/// Drive `run_cycle` on a fixed-rate interval until `shutdown` fires. Ticks
/// are skipped (not queued) if a cycle overruns its interval, matching
/// `tokio::time::MissedTickBehavior::Delay`'s default.
pub async fn run_scheduler(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let cycle_interval = Duration::from_secs(state.config.check_interval_seconds);
    let mut ticker = tokio::time::interval(cycle_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Drive the periodic summary digest on its own interval, independent of the
/// check cycle interval. Pushes the rendered report into the in-memory ring
/// buffer and, if a notification sink is configured, dispatches it silently.
pub async fn run_summary_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let period_hours = state.config.summary_interval_hours.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(period_hours as u64 * 3600));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_summary_once(&state, period_hours).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("summary loop received shutdown signal");
                    break;
                }
            }
        }
    }
}

async fn run_summary_once(state: &Arc<AppState>, period_hours: i64) {
    let start = Utc::now() - chrono::Duration::hours(period_hours);
    let results = match sentinel_db::query_window(&state.pool, start).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "failed to query window for summary digest");
            return;
        }
    };

    let Some(report) = sentinel_alerts::summarize(&results, period_hours, state.config.summary_top_n, Utc::now())
    else {
        info!("no results in summary window; skipping digest");
        return;
    };

    state.alert_manager.dispatch_summary(&report).await;

    let mut reports = state.reports.lock().await;
    reports.push(report);
}
