//! Embedded relational persistence for check results and alert history.
//!
//! Backed by a single SQLite file. The core runs as a single process with
//! a local embedded store — no clustered/HA operation, per spec Non-goals.

use std::path::{Component, Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sentinel_schemas::{AlertEvent, AlertSeverity, CheckResult, CheckStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::error;

pub const ENV_DB_PATH: &str = "SENTINEL_DB_PATH";

// ---------------------------------------------------------------------------
// Path safety
// ---------------------------------------------------------------------------

/// Lexically normalize a path (resolve `.`/`..` without touching the
/// filesystem — the file may not exist yet). Mirrors the approach Cargo
/// uses internally for the same reason: `Path::canonicalize` requires the
/// path to already exist.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn allow_listed_parents() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/var/lib/sentinel"), std::env::temp_dir()];
    if let Some(data_dir) = dirs::data_dir() {
        dirs.push(data_dir.join("sentinel"));
    }
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".sentinel"));
    }
    dirs.into_iter().map(|p| normalize(&p)).collect()
}

/// Validate that `db_path` resolves under one of the allow-listed parent
/// directories. Paths outside the allow-list cause startup failure.
pub fn validate_db_path(db_path: &str) -> Result<PathBuf> {
    let candidate = Path::new(db_path);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolve current_dir for relative db_path")?
            .join(candidate)
    };
    let normalized = normalize(&absolute);

    let allowed = allow_listed_parents();
    if allowed.iter().any(|a| normalized.starts_with(a)) {
        Ok(normalized)
    } else {
        Err(anyhow!(
            "db_path '{}' does not resolve under an allow-listed directory ({:?})",
            db_path,
            allowed
        ))
    }
}

// ---------------------------------------------------------------------------
// Connect / migrate
// ---------------------------------------------------------------------------

pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let validated = validate_db_path(db_path)?;
    if let Some(parent) = validated.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create_dir_all {:?}", parent))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&validated)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connect to sqlite db at {:?}", validated))?;

    Ok(pool)
}

/// Connect to an in-memory database for tests; no path allow-list applies.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("connect to in-memory sqlite db")?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Result persistence
// ---------------------------------------------------------------------------

/// Insert one result row. The timestamp is stored as an RFC-3339 UTC string;
/// `details` is JSON-encoded. Rejects (without writing) a result whose
/// status is outside the closed set or whose latency is negative — these
/// are not silently normalized.
pub async fn store_result(pool: &SqlitePool, result: &CheckResult) -> Result<()> {
    result
        .validate()
        .map_err(|e| anyhow!("rejected result for persistence: {e}"))?;

    let details = result
        .details
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .context("serialize details")?;

    sqlx::query(
        r#"
        INSERT INTO check_results (check_id, timestamp, status, latency_ms, message, details)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&result.check_id)
    .bind(result.timestamp.to_rfc3339())
    .bind(result.status.as_str())
    .bind(result.latency_ms)
    .bind(&result.message)
    .bind(details)
    .execute(pool)
    .await
    .context("insert check_results failed")?;

    Ok(())
}

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<CheckResult> {
    let check_id: String = row.try_get("check_id")?;
    let timestamp_raw: String = row.try_get("timestamp")?;
    let status_raw: String = row.try_get("status")?;
    let latency_ms: f64 = row.try_get("latency_ms")?;
    let message: Option<String> = row.try_get("message")?;
    let details_raw: Option<String> = row.try_get("details")?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("parse stored timestamp '{timestamp_raw}'"))?;
    let status = CheckStatus::parse(&status_raw).map_err(|e| anyhow!(e))?;
    let details = details_raw
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .context("parse stored details JSON")?;

    Ok(CheckResult {
        check_id,
        timestamp,
        status,
        latency_ms,
        message: message.unwrap_or_default(),
        details,
    })
}

/// Count `status='fail'` rows for `check_id` newer than `now - window`.
pub async fn count_recent_failures(
    pool: &SqlitePool,
    check_id: &str,
    window: StdDuration,
) -> Result<i64> {
    let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) as n FROM check_results
        WHERE check_id = ?1 AND status = 'fail' AND timestamp > ?2
        "#,
    )
    .bind(check_id)
    .bind(cutoff.to_rfc3339())
    .fetch_one(pool)
    .await
    .context("count_recent_failures failed")?;

    let n: i64 = row.try_get("n")?;
    Ok(n)
}

/// The `limit` most recent results for a given check, newest first.
pub async fn query_history(pool: &SqlitePool, check_id: &str, limit: i64) -> Result<Vec<CheckResult>> {
    let rows = sqlx::query(
        r#"
        SELECT check_id, timestamp, status, latency_ms, message, details
        FROM check_results
        WHERE check_id = ?1
        ORDER BY timestamp DESC
        LIMIT ?2
        "#,
    )
    .bind(check_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("query_history failed")?;

    rows.iter().map(row_to_result).collect()
}

/// All rows newer than `start`, used by the summary generator.
pub async fn query_window(pool: &SqlitePool, start: DateTime<Utc>) -> Result<Vec<CheckResult>> {
    let rows = sqlx::query(
        r#"
        SELECT check_id, timestamp, status, latency_ms, message, details
        FROM check_results
        WHERE timestamp > ?1
        ORDER BY timestamp DESC
        "#,
    )
    .bind(start.to_rfc3339())
    .fetch_all(pool)
    .await
    .context("query_window failed")?;

    rows.iter().map(row_to_result).collect()
}

// ---------------------------------------------------------------------------
// Alert history
// ---------------------------------------------------------------------------

/// Inserts one alert_history row and returns its primary key, so the caller
/// can later stamp a ticket issue number onto the same row.
pub async fn store_alert_event(pool: &SqlitePool, event: &AlertEvent) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO alert_history (check_id, alert_type, message, severity, fingerprint, timestamp, resolved_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&event.check_id)
    .bind(&event.alert_type)
    .bind(&event.message)
    .bind(event.severity.as_str())
    .bind(&event.fingerprint)
    .bind(event.dispatched_at.to_rfc3339())
    .bind(event.resolved_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await
    .context("insert alert_history failed")?;

    Ok(result.last_insert_rowid())
}

/// The ticket-tracker issue number of the most recent open alert for
/// `check_id`, if the alert manager's last dispatch to that check opened
/// one. `None` means either no open alert exists or it was never ticketed.
pub async fn find_open_ticket_issue_for_check(
    pool: &SqlitePool,
    check_id: &str,
) -> Result<Option<i64>> {
    let row = sqlx::query(
        r#"
        SELECT ticket_issue_number FROM alert_history
        WHERE check_id = ?1 AND resolved_at IS NULL
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(check_id)
    .fetch_optional(pool)
    .await
    .context("find_open_ticket_issue_for_check failed")?;

    Ok(row.and_then(|r| r.try_get::<Option<i64>, _>("ticket_issue_number").ok().flatten()))
}

/// Stamps the ticket-tracker issue number onto a freshly-inserted
/// alert_history row after the ticket sink reports it was opened.
pub async fn set_alert_ticket_issue(pool: &SqlitePool, alert_id: i64, issue_number: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE alert_history SET ticket_issue_number = ?1 WHERE id = ?2
        "#,
    )
    .bind(issue_number)
    .bind(alert_id)
    .execute(pool)
    .await
    .context("set_alert_ticket_issue failed")?;

    Ok(())
}

/// The most recent open (unresolved) alert_history row for `fingerprint`, if any.
/// Used both by auto-resolution and by the ticket sink's open-vs-comment decision.
pub async fn find_open_alert(pool: &SqlitePool, fingerprint: &str) -> Result<Option<i64>> {
    let row = sqlx::query(
        r#"
        SELECT id FROM alert_history
        WHERE fingerprint = ?1 AND resolved_at IS NULL
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await
    .context("find_open_alert failed")?;

    Ok(row.map(|r| r.get::<i64, _>("id")))
}

/// The most recent open alert for `check_id`, regardless of fingerprint.
/// Used by auto-resolution, which does not know in advance which
/// fingerprint the open alert was dispatched under.
pub async fn find_open_alert_for_check(
    pool: &SqlitePool,
    check_id: &str,
) -> Result<Option<(i64, String)>> {
    let row = sqlx::query(
        r#"
        SELECT id, fingerprint FROM alert_history
        WHERE check_id = ?1 AND resolved_at IS NULL
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(check_id)
    .fetch_optional(pool)
    .await
    .context("find_open_alert_for_check failed")?;

    Ok(row.map(|r| (r.get::<i64, _>("id"), r.get::<String, _>("fingerprint"))))
}

/// Stamp `resolved_at` on the alert_history row with the given primary key.
/// `resolved_at` must be >= the row's own `timestamp` (invariant enforced
/// by callers always passing `Utc::now()` for a row already persisted).
pub async fn resolve_alert(pool: &SqlitePool, alert_id: i64, resolved_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE alert_history SET resolved_at = ?1 WHERE id = ?2
        "#,
    )
    .bind(resolved_at.to_rfc3339())
    .bind(alert_id)
    .execute(pool)
    .await
    .context("resolve_alert failed")?;

    Ok(())
}

/// Best-effort store: logs and swallows errors rather than propagating them,
/// so a persistence hiccup never blocks the scheduler from continuing down
/// the in-memory path (ring buffers, alert manager).
pub async fn store_result_best_effort(pool: &SqlitePool, result: &CheckResult) {
    if let Err(e) = store_result(pool, result).await {
        error!(check_id = %result.check_id, error = %e, "failed to persist check result");
    }
}

pub fn severity_from_str(s: &str) -> Option<AlertSeverity> {
    match s {
        "info" => Some(AlertSeverity::Info),
        "warning" => Some(AlertSeverity::Warning),
        "high" => Some(AlertSeverity::High),
        "critical" => Some(AlertSeverity::Critical),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_schemas::CheckResult;

    #[test]
    fn path_outside_allowlist_is_rejected() {
        let result = validate_db_path("/etc/sentinel/sentinel.db");
        assert!(result.is_err());
    }

    #[test]
    fn path_under_tmp_is_allowed() {
        let p = std::env::temp_dir().join("sentinel-test").join("sentinel.db");
        let result = validate_db_path(p.to_str().unwrap());
        assert!(result.is_ok());
    }

    #[test]
    fn traversal_outside_allowlist_via_dotdot_is_rejected() {
        let p = format!("{}/../../../etc/sentinel.db", std::env::temp_dir().display());
        let result = validate_db_path(&p);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn store_and_query_round_trips() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let result = CheckResult::new("S1-probes", CheckStatus::Pass, 12.5, "ok")
            .with_details(serde_json::json!({"k": "v"}));
        store_result(&pool, &result).await.unwrap();

        let history = query_history(&pool, "S1-probes", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].check_id, "S1-probes");
        assert_eq!(history[0].status, CheckStatus::Pass);
        assert_eq!(history[0].message, "ok");
        assert_eq!(history[0].details, Some(serde_json::json!({"k": "v"})));
    }

    #[tokio::test]
    async fn negative_latency_is_rejected_by_persistence() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let bad = CheckResult::new("S1-probes", CheckStatus::Fail, -5.0, "bad");
        assert!(store_result(&pool, &bad).await.is_err());
    }

    #[tokio::test]
    async fn count_recent_failures_only_counts_fail_status() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        store_result(&pool, &CheckResult::new("S1-probes", CheckStatus::Fail, 1.0, "f1"))
            .await
            .unwrap();
        store_result(&pool, &CheckResult::new("S1-probes", CheckStatus::Warn, 1.0, "w1"))
            .await
            .unwrap();
        store_result(&pool, &CheckResult::new("S1-probes", CheckStatus::Fail, 1.0, "f2"))
            .await
            .unwrap();

        let n = count_recent_failures(&pool, "S1-probes", StdDuration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn alert_resolve_round_trips() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let event = AlertEvent {
            check_id: "S1-probes".to_string(),
            alert_type: "failure_threshold".to_string(),
            message: "down".to_string(),
            severity: AlertSeverity::Critical,
            fingerprint: "fp1".to_string(),
            dispatched_at: Utc::now(),
            resolved_at: None,
        };
        store_alert_event(&pool, &event).await.unwrap();

        let open = find_open_alert(&pool, "fp1").await.unwrap();
        assert!(open.is_some());

        resolve_alert(&pool, open.unwrap(), Utc::now()).await.unwrap();
        let open_after = find_open_alert(&pool, "fp1").await.unwrap();
        assert!(open_after.is_none());
    }

    #[tokio::test]
    async fn find_open_alert_for_check_ignores_fingerprint() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let event = AlertEvent {
            check_id: "S1-probes".to_string(),
            alert_type: "failure_threshold".to_string(),
            message: "down".to_string(),
            severity: AlertSeverity::Critical,
            fingerprint: "whatever-fingerprint".to_string(),
            dispatched_at: Utc::now(),
            resolved_at: None,
        };
        store_alert_event(&pool, &event).await.unwrap();

        let open = find_open_alert_for_check(&pool, "S1-probes").await.unwrap();
        assert_eq!(open, Some((1, "whatever-fingerprint".to_string())));
    }

    #[tokio::test]
    async fn ticket_issue_number_round_trips_and_is_found_for_check() {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let event = AlertEvent {
            check_id: "S1-probes".to_string(),
            alert_type: "failure_threshold".to_string(),
            message: "down".to_string(),
            severity: AlertSeverity::Critical,
            fingerprint: "fp1".to_string(),
            dispatched_at: Utc::now(),
            resolved_at: None,
        };
        let alert_id = store_alert_event(&pool, &event).await.unwrap();

        assert_eq!(
            find_open_ticket_issue_for_check(&pool, "S1-probes").await.unwrap(),
            None
        );

        set_alert_ticket_issue(&pool, alert_id, 42).await.unwrap();
        assert_eq!(
            find_open_ticket_issue_for_check(&pool, "S1-probes").await.unwrap(),
            Some(42)
        );
    }
}
