//! The check abstraction: identity, timed execution, and the static registry.
//!
//! Every concrete check lives under [`checks`] and implements [`Check`].
//! Nothing outside this crate calls a check body directly — callers always
//! go through [`execute`] or [`execute_with_timeout`], which own the timing,
//! statistics, and panic-to-fail conversion the contract requires.

pub mod checks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sentinel_config::SentinelConfig;
use sentinel_http::ProbeClient;
use sentinel_schemas::{CheckResult, CheckStatus};
use serde_json::Value;
use tracing::warn;

// ---------------------------------------------------------------------------
// Check contract
// ---------------------------------------------------------------------------

/// The un-timed, un-wrapped outcome of a check body. [`execute`] promotes
/// this into a full [`CheckResult`] by attaching `check_id`, `timestamp`,
/// and `latency_ms`.
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub message: String,
    pub details: Option<Value>,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
            details,
        }
    }

    pub fn warn(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
            details,
        }
    }

    pub fn fail(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
            details,
        }
    }
}

/// A named, independently schedulable probe. Implementors own their own
/// HTTP/subprocess calls; they never construct a [`CheckResult`] directly —
/// that is [`execute`]'s job, so the emitted `check_id` can never drift from
/// [`Check::id`].
#[async_trait]
pub trait Check: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn run(&self) -> CheckOutcome;
}

// ---------------------------------------------------------------------------
// Execute / ExecuteWithTimeout
// ---------------------------------------------------------------------------

/// The timed entry point every scheduled check execution goes through.
///
/// Runs the check body on its own task so that a panic inside `run()`
/// (an internal programming error, per the error taxonomy) surfaces as a
/// `JoinError` instead of taking down the scheduler; it is converted to a
/// `fail` result with a structured `details` payload rather than propagated.
pub async fn execute(check: Arc<dyn Check>) -> CheckResult {
    let id = check.id().to_string();
    let start = Instant::now();
    let timestamp = chrono::Utc::now();

    let handle = tokio::spawn(async move { check.run().await });

    match handle.await {
        Ok(outcome) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            CheckResult {
                check_id: id,
                timestamp,
                status: outcome.status,
                latency_ms,
                message: outcome.message,
                details: outcome.details,
            }
        }
        Err(join_err) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            let (exception_type, exception_message) = describe_join_error(join_err);
            warn!(check_id = %id, %exception_type, %exception_message, "check execution failed");
            CheckResult {
                check_id: id,
                timestamp,
                status: CheckStatus::Fail,
                latency_ms,
                message: format!("Check execution failed: {exception_message}"),
                details: Some(serde_json::json!({
                    "exception_type": exception_type,
                    "exception_message": exception_message,
                })),
            }
        }
    }
}

/// Same contract as [`execute`], but yields a synthetic `fail` result whose
/// `latency_ms` equals `timeout` if the body does not complete within it.
/// The scheduler relies entirely on this for cancellation — it never cancels
/// a check itself.
pub async fn execute_with_timeout(check: Arc<dyn Check>, timeout: Duration) -> CheckResult {
    let id = check.id().to_string();
    match tokio::time::timeout(timeout, execute(check)).await {
        Ok(result) => result,
        Err(_) => CheckResult::new(
            id,
            CheckStatus::Fail,
            timeout.as_secs_f64() * 1000.0,
            format!("Check timed out after {:.1}s", timeout.as_secs_f64()),
        ),
    }
}

fn describe_join_error(err: tokio::task::JoinError) -> (String, String) {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ("panic".to_string(), message)
    } else {
        ("cancelled".to_string(), "check task was cancelled".to_string())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Constructor function keyed by check ID. No runtime reflection: this is a
/// plain static table resolved once at startup.
pub type CheckConstructor = fn(&SentinelConfig, ProbeClient) -> Arc<dyn Check>;

pub const CHECK_REGISTRY: &[(&str, CheckConstructor)] = &[
    ("S1-probes", |cfg, client| {
        Arc::new(checks::health::HealthProbeCheck::new(cfg, client)) as Arc<dyn Check>
    }),
    ("S2-golden-fact-recall", |cfg, client| {
        Arc::new(checks::golden_fact::GoldenFactRecallCheck::new(cfg, client)) as Arc<dyn Check>
    }),
    ("S3-paraphrase-robustness", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S3-paraphrase-robustness",
            "Paraphrase robustness of retrieval",
        )) as Arc<dyn Check>
    }),
    ("S4-metrics-wiring", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S4-metrics-wiring",
            "Metrics pipeline wiring",
        )) as Arc<dyn Check>
    }),
    ("S5-security-negatives", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S5-security-negatives",
            "Security negative-path probes",
        )) as Arc<dyn Check>
    }),
    ("S6-backup-restore", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S6-backup-restore",
            "Backup/restore smoke test",
        )) as Arc<dyn Check>
    }),
    ("S7-config-parity", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S7-config-parity",
            "Configuration parity across environments",
        )) as Arc<dyn Check>
    }),
    ("S8-capacity-smoke", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S8-capacity-smoke",
            "Capacity smoke test",
        )) as Arc<dyn Check>
    }),
    ("S9-graph-intent", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S9-graph-intent",
            "Graph intent validation",
        )) as Arc<dyn Check>
    }),
    ("S10-content-pipeline", |_cfg, _client| {
        Arc::new(checks::placeholder::PlaceholderCheck::new(
            "S10-content-pipeline",
            "Content pipeline monitoring",
        )) as Arc<dyn Check>
    }),
    ("S11-firewall-status", |_cfg, _client| {
        Arc::new(checks::firewall::FirewallStatusCheck::new()) as Arc<dyn Check>
    }),
];

/// Instantiate every registry entry whose ID is in `cfg.enabled_checks`,
/// in registry order.
pub fn instantiate_enabled(cfg: &SentinelConfig, client: ProbeClient) -> Vec<Arc<dyn Check>> {
    CHECK_REGISTRY
        .iter()
        .filter(|(id, _)| cfg.is_check_enabled(id))
        .map(|(_, ctor)| ctor(cfg, client.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysPass;

    #[async_trait]
    impl Check for AlwaysPass {
        fn id(&self) -> &str {
            "test-pass"
        }
        fn description(&self) -> &str {
            "always passes"
        }
        async fn run(&self) -> CheckOutcome {
            CheckOutcome::pass("ok", None)
        }
    }

    struct AlwaysPanics;

    #[async_trait]
    impl Check for AlwaysPanics {
        fn id(&self) -> &str {
            "test-panic"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        async fn run(&self) -> CheckOutcome {
            panic!("boom");
        }
    }

    struct NeverReturns;

    #[async_trait]
    impl Check for NeverReturns {
        fn id(&self) -> &str {
            "test-slow"
        }
        fn description(&self) -> &str {
            "never completes within timeout"
        }
        async fn run(&self) -> CheckOutcome {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            CheckOutcome::pass("unreachable", None)
        }
    }

    #[tokio::test]
    async fn execute_assigns_own_id_and_nonnegative_latency() {
        let result = execute(Arc::new(AlwaysPass)).await;
        assert_eq!(result.check_id, "test-pass");
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn execute_converts_panic_to_fail() {
        let result = execute(Arc::new(AlwaysPanics)).await;
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("Check execution failed"));
        assert!(!result.message.is_empty());
        assert!(result.details.is_some());
    }

    #[tokio::test]
    async fn execute_with_timeout_yields_synthetic_fail_at_timeout_boundary() {
        let timeout = Duration::from_millis(20);
        let result = execute_with_timeout(Arc::new(NeverReturns), timeout).await;
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.contains("timed out"));
        assert_eq!(result.latency_ms, timeout.as_secs_f64() * 1000.0);
    }

    #[test]
    fn registry_instantiates_only_enabled_checks() {
        let mut cfg = SentinelConfig::from_env();
        cfg.enabled_checks = vec!["S1-probes".to_string()];
        let client = ProbeClient::new(None);
        let instantiated = instantiate_enabled(&cfg, client);
        assert_eq!(instantiated.len(), 1);
        assert_eq!(instantiated[0].id(), "S1-probes");
    }
}
