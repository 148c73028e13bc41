//! Shared test fixtures for the sentinel workspace's end-to-end scenario
//! tests. Nothing here is exercised by production code; this crate exists
//! solely so `sentinel-daemon`'s `tests/scenario_*.rs` files (and any other
//! crate's integration tests) can stand up a fake target service, a fake
//! Telegram endpoint, and a migrated in-memory database without repeating
//! the wiring in every test file.

use sentinel_checks::{Check, CheckOutcome};
use sentinel_schemas::CheckStatus;
use sqlx::SqlitePool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A migrated in-memory database, ready for `sentinel_db::store_result` and
/// friends. Equivalent to what `sentinel-daemon::main` does against a real
/// file, minus the path allow-list (which is exercised directly in
/// `sentinel-db`'s own unit tests).
pub async fn migrated_pool() -> SqlitePool {
    let pool = sentinel_db::connect_in_memory().await.expect("connect_in_memory");
    sentinel_db::migrate(&pool).await.expect("migrate");
    pool
}

/// A fake target service, standing in for the probed memory/retrieval
/// service's public HTTP surface (spec §6). Tests mount the responses they
/// need via the builder methods below, then point `SentinelConfig::target_base_url`
/// (or a check constructed directly) at `server.uri()`.
pub struct MockTarget {
    pub server: MockServer,
}

impl MockTarget {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// `GET /health/live -> {"status": "alive"}`.
    pub async fn healthy_liveness(&self) -> &Self {
        Mock::given(method("GET"))
            .and(path("/health/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "alive"})))
            .mount(&self.server)
            .await;
        self
    }

    /// `GET /health/ready` reporting every component healthy.
    pub async fn healthy_readiness(&self) -> &Self {
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "components": [
                    {"name": "qdrant", "status": "ok"},
                    {"name": "redis", "status": "healthy"},
                    {"name": "neo4j", "status": "degraded"},
                ]
            })))
            .mount(&self.server)
            .await;
        self
    }

    /// `GET /health/ready` reporting `component` as `status` (e.g. the
    /// primary vector store reporting `down`), every other component healthy.
    pub async fn readiness_with_component_down(&self, component: &str, status: &str) -> &Self {
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "components": [{"name": component, "status": status}]
            })))
            .mount(&self.server)
            .await;
        self
    }

    /// `POST /tools/store_context` and `POST /tools/retrieve_context`, the
    /// latter returning a single result whose content carries every golden
    /// fact's value (`S2-golden-fact-recall` asks every question against
    /// the same mocked endpoint regardless of which fact it concerns, so the
    /// response has to satisfy all of them at once).
    pub async fn golden_fact_recall_succeeds(&self) -> &Self {
        Mock::given(method("POST"))
            .and(path("/tools/store_context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/retrieve_context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "content": {"name": "Matt", "food": "spicy", "location": "San Francisco"},
                    "score": 0.9,
                }]
            })))
            .mount(&self.server)
            .await;
        self
    }
}

/// A fake Telegram Bot API, standing in for the rate-limited notification
/// sink's external dependency. Accepts every `sendMessage` call and records
/// nothing beyond what `wiremock`'s own request log already captures — tests
/// that need call counts use `server.received_requests()`.
pub struct MockTelegram {
    pub server: MockServer,
}

impl MockTelegram {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;
        Self { server }
    }

    pub async fn sent_message_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }
}

/// A check whose outcome is fixed at construction time — used by scheduler
/// and alert-pipeline scenario tests that need deterministic pass/warn/fail
/// sequences without standing up a `MockTarget`.
pub struct ScriptedCheck {
    id: &'static str,
    status: CheckStatus,
    message: String,
}

impl ScriptedCheck {
    pub fn new(id: &'static str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            id,
            status,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl Check for ScriptedCheck {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "scripted test check with a fixed outcome"
    }

    async fn run(&self) -> CheckOutcome {
        match self.status {
            CheckStatus::Pass => CheckOutcome::pass(self.message.clone(), None),
            CheckStatus::Warn => CheckOutcome::warn(self.message.clone(), None),
            CheckStatus::Fail => CheckOutcome::fail(self.message.clone(), None),
        }
    }
}
