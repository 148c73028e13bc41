//! The alert manager: turns the append-only result stream into a bounded,
//! deduplicated, severity-aware alert stream and fans each alert out to the
//! configured channels.

pub mod sink;
pub mod summary;
pub mod ticket;

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sentinel_db::{
    count_recent_failures, find_open_alert_for_check, find_open_ticket_issue_for_check,
    resolve_alert, set_alert_ticket_issue, store_alert_event,
};
use sentinel_schemas::{dedup_fingerprint, AlertEvent, AlertSeverity, CheckResult, CheckStatus};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub use sink::{render_alert, NotificationSink, RenderedMessage};
pub use summary::{render_summary, summarize, SummaryReport};
pub use ticket::{TicketOutcome, TicketSink};

/// Check IDs whose failures are safety/security or data-integrity class:
/// these escalate straight to `critical` the moment the threshold is
/// crossed, rather than climbing through the warning/high ladder.
const SAFETY_CRITICAL_CHECKS: &[&str] = &["S5-security-negatives", "S6-backup-restore", "S11-firewall-status"];

/// The implicit per-check state machine the alert manager maintains. Checks
/// themselves are stateless; this is the only place "failing" is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckState {
    Ok,
    Degraded,
    Failing,
}

/// Derives alert severity from the check's class and how far past the
/// threshold the failure count has climbed. A small configured table, never
/// sourced from the check body.
fn classify_severity(check_id: &str, failure_count: i64, threshold: u32) -> AlertSeverity {
    if SAFETY_CRITICAL_CHECKS.contains(&check_id) {
        return AlertSeverity::Critical;
    }
    let threshold = threshold.max(1) as i64;
    if failure_count >= threshold * 3 {
        AlertSeverity::Critical
    } else if failure_count >= threshold * 2 {
        AlertSeverity::High
    } else {
        AlertSeverity::Warning
    }
}

pub struct AlertManager {
    pool: SqlitePool,
    threshold_failures: u32,
    dedup_window: ChronoDuration,
    sink: Option<NotificationSink>,
    ticket: Option<TicketSink>,
    state: Mutex<HashMap<String, CheckState>>,
    last_dispatched: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertManager {
    pub fn new(
        pool: SqlitePool,
        threshold_failures: u32,
        dedup_window_minutes: i64,
        sink: Option<NotificationSink>,
        ticket: Option<TicketSink>,
    ) -> Self {
        Self {
            pool,
            threshold_failures,
            dedup_window: ChronoDuration::minutes(dedup_window_minutes),
            sink,
            ticket,
            state: Mutex::new(HashMap::new()),
            last_dispatched: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one emitted result. Assumes the result has already been
    /// persisted by the caller (the scheduler) — the manager only reads
    /// back aggregates it needs (`count_recent_failures`).
    pub async fn process_result(&self, result: &CheckResult) {
        let previous = {
            let state = self.state.lock().await;
            state.get(&result.check_id).copied()
        };

        match result.status {
            CheckStatus::Pass => {
                if previous == Some(CheckState::Failing) {
                    self.auto_resolve(result).await;
                }
                self.set_state(&result.check_id, CheckState::Ok).await;
            }
            CheckStatus::Warn => {
                // warn counts toward neither success nor failure thresholds.
                self.set_state(&result.check_id, CheckState::Degraded).await;
            }
            CheckStatus::Fail => {
                self.set_state(&result.check_id, CheckState::Failing).await;
                self.evaluate_failure(result).await;
            }
        }
    }

    async fn set_state(&self, check_id: &str, next: CheckState) {
        self.state.lock().await.insert(check_id.to_string(), next);
    }

    async fn evaluate_failure(&self, result: &CheckResult) {
        let window = StdDuration::from_secs(5 * 60);
        let count = match count_recent_failures(&self.pool, &result.check_id, window).await {
            Ok(n) => n,
            Err(e) => {
                error!(check_id = %result.check_id, error = %e, "failed to count recent failures; skipping escalation");
                return;
            }
        };

        if count < self.threshold_failures as i64 {
            return;
        }

        let severity = classify_severity(&result.check_id, count, self.threshold_failures);
        let fingerprint = dedup_fingerprint(&result.check_id, result.status, &result.message);

        if self.is_suppressed(&fingerprint).await {
            info!(check_id = %result.check_id, fingerprint = %fingerprint, "alert suppressed by dedup window");
            return;
        }

        self.dispatch(result.check_id.clone(), severity, result.message.clone(), fingerprint, "failure_threshold", result)
            .await;
    }

    async fn auto_resolve(&self, result: &CheckResult) {
        let open = match find_open_alert_for_check(&self.pool, &result.check_id).await {
            Ok(open) => open,
            Err(e) => {
                error!(check_id = %result.check_id, error = %e, "failed to look up open alert for auto-resolve");
                return;
            }
        };

        let Some((alert_id, _original_fingerprint)) = open else {
            return;
        };

        let now = Utc::now();
        if let Err(e) = resolve_alert(&self.pool, alert_id, now).await {
            error!(check_id = %result.check_id, error = %e, "failed to stamp resolved_at on alert_history");
            return;
        }

        let message = format!("{} recovered", result.check_id);
        let fingerprint = dedup_fingerprint(&result.check_id, CheckStatus::Pass, &message);

        if self.is_suppressed(&fingerprint).await {
            return;
        }

        self.dispatch(result.check_id.clone(), AlertSeverity::Info, message, fingerprint, "recovery", result)
            .await;
    }

    async fn is_suppressed(&self, fingerprint: &str) -> bool {
        let mut last = self.last_dispatched.lock().await;
        let now = Utc::now();
        if let Some(previous) = last.get(fingerprint) {
            if now - *previous < self.dedup_window {
                return true;
            }
        }
        last.insert(fingerprint.to_string(), now);
        false
    }

    async fn dispatch(
        &self,
        check_id: String,
        severity: AlertSeverity,
        message: String,
        fingerprint: String,
        alert_type: &str,
        result: &CheckResult,
    ) {
        // Looked up before the new row is inserted: this is the issue
        // number (if any) a *previous* escalation for this check opened,
        // which a ticket sink should comment on rather than duplicate.
        let existing_issue_number = match find_open_ticket_issue_for_check(&self.pool, &check_id).await {
            Ok(number) => number.map(|n| n as u64),
            Err(e) => {
                warn!(check_id = %check_id, error = %e, "could not look up existing open ticket; will open a new one");
                None
            }
        };

        let event = AlertEvent {
            check_id: check_id.clone(),
            alert_type: alert_type.to_string(),
            message: message.clone(),
            severity,
            fingerprint: fingerprint.clone(),
            dispatched_at: Utc::now(),
            resolved_at: None,
        };

        let alert_id = match store_alert_event(&self.pool, &event).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(check_id = %check_id, error = %e, "failed to persist alert_history row");
                None
            }
        };

        match severity {
            AlertSeverity::Critical | AlertSeverity::High => {
                error!(check_id = %check_id, %severity, %message, "alert dispatched")
            }
            AlertSeverity::Warning => warn!(check_id = %check_id, %severity, %message, "alert dispatched"),
            AlertSeverity::Info => info!(check_id = %check_id, %severity, %message, "alert dispatched"),
        }

        if let Some(sink) = &self.sink {
            let rendered = render_alert(result, severity, &message);
            if !sink.send(rendered).await {
                warn!(check_id = %check_id, "notification sink did not deliver synchronously (queued or failed)");
            }
        }

        if let Some(ticket) = &self.ticket {
            let outcome = ticket
                .dispatch(&check_id, severity, &message, &fingerprint, existing_issue_number)
                .await;
            match outcome {
                TicketOutcome::Opened(number) => {
                    if let Some(id) = alert_id {
                        if let Err(e) = set_alert_ticket_issue(&self.pool, id, number as i64).await {
                            error!(check_id = %check_id, error = %e, "failed to record opened ticket issue number");
                        }
                    }
                }
                TicketOutcome::Commented => {}
                TicketOutcome::Failed => warn!(check_id = %check_id, "ticket sink failed to dispatch"),
            }
        }
    }

    /// Drain the notification sink's overflow queue, if configured. Intended
    /// to be called once per scheduler tick, after result processing.
    pub async fn process_notification_queue(&self) -> usize {
        match &self.sink {
            Some(sink) => sink.process_queue().await,
            None => 0,
        }
    }

    /// Route a periodic digest through the same notification sink used for
    /// alerts, always notification-silenced. A no-op if no sink is configured.
    pub async fn dispatch_summary(&self, report: &summary::SummaryReport) {
        if let Some(sink) = &self.sink {
            let message = RenderedMessage {
                text: summary::render_summary(report),
                disable_notification: true,
            };
            if !sink.send(message).await {
                warn!("summary digest did not deliver synchronously (queued or failed)");
            }
        }
    }

    /// Cheap identity check against the configured notification sink, for
    /// startup diagnostics and the Query API health readout. `None` means no
    /// sink is configured at all (not a failed connection).
    pub async fn test_notification_connection(&self) -> Option<bool> {
        match &self.sink {
            Some(sink) => Some(sink.test_connection().await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_db::{connect_in_memory, migrate};

    async fn manager() -> AlertManager {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        AlertManager::new(pool, 3, 30, None, None)
    }

    fn fail(check_id: &str, message: &str) -> CheckResult {
        CheckResult::new(check_id, CheckStatus::Fail, 5.0, message)
    }

    fn pass(check_id: &str) -> CheckResult {
        CheckResult::new(check_id, CheckStatus::Pass, 5.0, "ok")
    }

    /// Mirrors what the scheduler does: persist the result, then hand it to
    /// the alert manager. `process_result` alone never touches persistence
    /// for results (only for alert_history).
    async fn feed(mgr: &AlertManager, result: &CheckResult) {
        sentinel_db::store_result(&mgr.pool, result).await.unwrap();
        mgr.process_result(result).await;
    }

    #[tokio::test]
    async fn below_threshold_does_not_dispatch() {
        let mgr = manager().await;
        for _ in 0..2 {
            feed(&mgr, &fail("S1-probes", "down")).await;
        }
        let rows = sentinel_db::query_history(&mgr.pool, "S1-probes", 10).await.unwrap();
        assert_eq!(rows.len(), 2);

        let open = find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap();
        assert!(open.is_none());
    }

    #[tokio::test]
    async fn threshold_crossing_dispatches_and_persists_alert() {
        let mgr = manager().await;
        for _ in 0..3 {
            feed(&mgr, &fail("S1-probes", "down")).await;
        }

        let open = find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap();
        assert!(open.is_some());
    }

    #[tokio::test]
    async fn repeated_identical_failures_are_deduped_within_window() {
        let mgr = manager().await;
        for _ in 0..5 {
            feed(&mgr, &fail("S1-probes", "down")).await;
        }

        // Only the crossing at count==3 should have dispatched; counts 4
        // and 5 are suppressed by dedup since the message is identical.
        let last = mgr.last_dispatched.lock().await;
        assert_eq!(last.len(), 1);
    }

    #[test]
    fn safety_critical_check_escalates_straight_to_critical() {
        let severity = classify_severity("S11-firewall-status", 3, 3);
        assert_eq!(severity, AlertSeverity::Critical);
    }

    #[test]
    fn health_check_escalates_through_the_ladder() {
        assert_eq!(classify_severity("S1-probes", 3, 3), AlertSeverity::Warning);
        assert_eq!(classify_severity("S1-probes", 6, 3), AlertSeverity::High);
        assert_eq!(classify_severity("S1-probes", 9, 3), AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn warn_status_never_triggers_escalation() {
        let mgr = manager().await;
        for _ in 0..5 {
            mgr.process_result(&CheckResult::new("S1-probes", CheckStatus::Warn, 5.0, "degraded")).await;
        }
        let open = find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap();
        assert!(open.is_none());
    }

    #[tokio::test]
    async fn pass_after_failing_auto_resolves_open_alert() {
        let mgr = manager().await;
        for _ in 0..3 {
            feed(&mgr, &fail("S1-probes", "down")).await;
        }
        assert!(find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap().is_some());

        feed(&mgr, &pass("S1-probes")).await;
        assert!(find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pass_without_prior_failure_does_not_touch_alert_history() {
        let mgr = manager().await;
        feed(&mgr, &pass("S1-probes")).await;
        let open = find_open_alert_for_check(&mgr.pool, "S1-probes").await.unwrap();
        assert!(open.is_none());
    }

    #[tokio::test]
    async fn dispatches_beyond_rate_limit_are_queued_not_dropped() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        let sink = NotificationSink::with_api_base(&server.uri(), "chat1", 2);
        let mgr = AlertManager::new(pool, 1, 30, Some(sink), None);

        // Five distinct checks, each crossing its own threshold on the first
        // failure: five independent dispatches within the same tick, none
        // suppressed by dedup since each has a different check_id.
        for i in 0..5 {
            feed(&mgr, &fail(&format!("check-{i}"), "down")).await;
        }

        assert_eq!(server.received_requests().await.unwrap().len(), 2, "only rate_limit sends go out synchronously");

        // The rolling 60s budget is still exhausted immediately afterwards:
        // draining the queue now should send nothing new (the other three
        // dispatches were queued rather than dropped, but stay queued until
        // the window rolls forward).
        let drained = mgr.process_notification_queue().await;
        assert_eq!(drained, 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
