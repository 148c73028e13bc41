//! Periodic summary generator: aggregates the result window into a single
//! digest message, delivered notification-silenced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sentinel_schemas::{CheckResult, CheckStatus};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailureCount {
    pub check_id: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SummaryReport {
    pub period_hours: i64,
    pub total: u64,
    pub pass_count: u64,
    pub warn_count: u64,
    pub fail_count: u64,
    pub avg_latency_ms: f64,
    pub uptime_percent: f64,
    pub top_failures: Vec<FailureCount>,
    pub generated_at: DateTime<Utc>,
}

/// Aggregates `results` (already restricted to the summary window) into a
/// report. Returns `None` if the window contained zero results — the
/// summary is skipped and the caller reschedules without dispatching.
pub fn summarize(results: &[CheckResult], period_hours: i64, top_n: usize, now: DateTime<Utc>) -> Option<SummaryReport> {
    if results.is_empty() {
        return None;
    }

    let mut pass_count = 0u64;
    let mut warn_count = 0u64;
    let mut fail_count = 0u64;
    let mut total_latency_ms = 0.0f64;
    let mut failures_by_check: HashMap<String, u64> = HashMap::new();

    for r in results {
        total_latency_ms += r.latency_ms;
        match r.status {
            CheckStatus::Pass => pass_count += 1,
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => {
                fail_count += 1;
                *failures_by_check.entry(r.check_id.clone()).or_insert(0) += 1;
            }
        }
    }

    let total = results.len() as u64;
    let avg_latency_ms = total_latency_ms / total as f64;
    let uptime_percent = pass_count as f64 / total as f64 * 100.0;

    let mut top_failures: Vec<FailureCount> = failures_by_check
        .into_iter()
        .map(|(check_id, count)| FailureCount { check_id, count })
        .collect();
    top_failures.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.check_id.cmp(&b.check_id)));
    top_failures.truncate(top_n);

    Some(SummaryReport {
        period_hours,
        total,
        pass_count,
        warn_count,
        fail_count,
        avg_latency_ms,
        uptime_percent,
        top_failures,
        generated_at: now,
    })
}

/// Render a summary report as an HTML chat message. Always dispatched with
/// `disable_notification=true`: digests are never urgent.
pub fn render_summary(report: &SummaryReport) -> String {
    let mut lines = vec![
        "<b>\u{1F4CA} Sentinel Report</b>".to_string(),
        "\u{2501}".repeat(21),
        format!("<b>Period:</b> Last {} hours", report.period_hours),
        format!("<b>Total Checks:</b> {}", report.total),
        format!(
            "\u{2705} <b>Passed:</b> {} ({:.1}%)",
            report.pass_count,
            report.pass_count as f64 / report.total as f64 * 100.0
        ),
        format!(
            "\u{274C} <b>Failed:</b> {} ({:.1}%)",
            report.fail_count,
            report.fail_count as f64 / report.total as f64 * 100.0
        ),
    ];

    if !report.top_failures.is_empty() {
        lines.push(String::new());
        lines.push("<b>Top Issues:</b>".to_string());
        for (i, f) in report.top_failures.iter().enumerate() {
            lines.push(format!("{}. {}: {} failures", i + 1, f.check_id, f.count));
        }
    }

    lines.push(String::new());
    lines.push(format!("<b>Avg Response Time:</b> {:.1}ms", report.avg_latency_ms));
    lines.push(format!("<b>Uptime:</b> {:.1}%", report.uptime_percent));
    lines.push("\u{2501}".repeat(21));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(check_id: &str, status: CheckStatus, latency_ms: f64) -> CheckResult {
        CheckResult::new(check_id, status, latency_ms, "x")
    }

    #[test]
    fn empty_window_yields_no_report() {
        assert!(summarize(&[], 24, 5, Utc::now()).is_none());
    }

    #[test]
    fn aggregates_counts_and_top_failures() {
        let results = vec![
            result("S1-probes", CheckStatus::Pass, 10.0),
            result("S1-probes", CheckStatus::Fail, 20.0),
            result("S1-probes", CheckStatus::Fail, 30.0),
            result("S2-golden-fact-recall", CheckStatus::Fail, 40.0),
            result("S2-golden-fact-recall", CheckStatus::Warn, 50.0),
        ];
        let report = summarize(&results, 24, 5, Utc::now()).unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.pass_count, 1);
        assert_eq!(report.warn_count, 1);
        assert_eq!(report.fail_count, 3);
        assert_eq!(report.avg_latency_ms, 30.0);
        assert_eq!(report.uptime_percent, 20.0);
        assert_eq!(report.top_failures[0].check_id, "S1-probes");
        assert_eq!(report.top_failures[0].count, 2);
    }

    #[test]
    fn repeated_runs_over_same_window_are_identical() {
        let results = vec![result("S1-probes", CheckStatus::Pass, 5.0), result("S1-probes", CheckStatus::Fail, 15.0)];
        let now = Utc::now();
        let a = summarize(&results, 24, 5, now).unwrap();
        let b = summarize(&results, 24, 5, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn top_n_truncates_and_orders_by_count_descending() {
        let results = vec![
            result("A", CheckStatus::Fail, 1.0),
            result("B", CheckStatus::Fail, 1.0),
            result("B", CheckStatus::Fail, 1.0),
            result("C", CheckStatus::Fail, 1.0),
            result("C", CheckStatus::Fail, 1.0),
            result("C", CheckStatus::Fail, 1.0),
        ];
        let report = summarize(&results, 24, 2, Utc::now()).unwrap();
        assert_eq!(report.top_failures.len(), 2);
        assert_eq!(report.top_failures[0].check_id, "C");
        assert_eq!(report.top_failures[1].check_id, "B");
    }
}
