//! S1: liveness and readiness probes against the target service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use sentinel_config::SentinelConfig;
use sentinel_http::ProbeClient;
use serde_json::{json, Value};

use crate::{Check, CheckOutcome};

const LIVE_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Secondary dependencies may report `degraded` without failing the check;
/// the primary vector store may not.
const PRIMARY_COMPONENTS: &[&str] = &["qdrant"];
const SECONDARY_COMPONENTS: &[&str] = &["redis", "neo4j"];

pub struct HealthProbeCheck {
    base_url: String,
    client: ProbeClient,
}

impl HealthProbeCheck {
    pub fn new(cfg: &SentinelConfig, client: ProbeClient) -> Self {
        Self {
            base_url: cfg.target_base_url.clone(),
            client,
        }
    }

    async fn check_liveness(&self) -> Result<Value, CheckOutcome> {
        let url = format!("{}/health/live", self.base_url);
        let (ok, message, _latency, body) = self
            .client
            .call_json(Method::GET, &url, None, 200, LIVE_READY_TIMEOUT)
            .await;

        if !ok {
            return Err(CheckOutcome::fail(
                format!("Liveness check failed: {message}"),
                Some(json!({"endpoint": url})),
            ));
        }

        let status = body.as_ref().and_then(|b| b.get("status")).and_then(Value::as_str);
        if status != Some("alive") {
            return Err(CheckOutcome::fail(
                format!("Liveness status not 'alive': {}", status.unwrap_or("missing")),
                Some(json!({"endpoint": url, "response": body})),
            ));
        }

        Ok(body.unwrap_or(Value::Null))
    }

    async fn check_readiness(&self) -> Result<Value, CheckOutcome> {
        let url = format!("{}/health/ready", self.base_url);
        let (ok, message, _latency, body) = self
            .client
            .call_json(Method::GET, &url, None, 200, LIVE_READY_TIMEOUT)
            .await;

        if !ok {
            return Err(CheckOutcome::fail(
                format!("Readiness check failed: {message}"),
                Some(json!({"endpoint": url})),
            ));
        }

        let components = body
            .as_ref()
            .and_then(|b| b.get("components"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for component in &components {
            let name = component.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let status = component.get("status").and_then(Value::as_str).unwrap_or("unknown");

            let acceptable: &[&str] = if PRIMARY_COMPONENTS.contains(&name) {
                &["ok", "healthy"]
            } else if SECONDARY_COMPONENTS.contains(&name) {
                &["ok", "healthy", "degraded"]
            } else {
                continue;
            };

            if !acceptable.contains(&status) {
                return Err(CheckOutcome::fail(
                    format!("{name} not healthy: {status}"),
                    Some(json!({
                        "endpoint": url,
                        "response": body,
                        "failed_component": name,
                        "component_status": status,
                    })),
                ));
            }
        }

        Ok(body.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Check for HealthProbeCheck {
    fn id(&self) -> &str {
        "S1-probes"
    }

    fn description(&self) -> &str {
        "Health probes for live/ready endpoints"
    }

    async fn run(&self) -> CheckOutcome {
        let liveness = match self.check_liveness().await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };
        let readiness = match self.check_readiness().await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        CheckOutcome::pass(
            "All health endpoints responding correctly",
            Some(json!({"liveness": liveness, "readiness": readiness})),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_schemas::CheckStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg_for(base_url: String) -> SentinelConfig {
        let mut cfg = SentinelConfig::from_env();
        cfg.target_base_url = base_url;
        cfg
    }

    #[tokio::test]
    async fn passes_when_live_and_ready_report_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "alive"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "components": [
                    {"name": "qdrant", "status": "ok"},
                    {"name": "redis", "status": "healthy"},
                    {"name": "neo4j", "status": "degraded"},
                ]
            })))
            .mount(&server)
            .await;

        let check = HealthProbeCheck::new(&cfg_for(server.uri()), ProbeClient::new(None));
        let outcome = check.run().await;
        assert_eq!(outcome.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn fails_when_primary_dependency_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "alive"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "components": [{"name": "qdrant", "status": "down"}]
            })))
            .mount(&server)
            .await;

        let check = HealthProbeCheck::new(&cfg_for(server.uri()), ProbeClient::new(None));
        let outcome = check.run().await;
        assert_eq!(outcome.status, CheckStatus::Fail);
        assert!(outcome.message.contains("qdrant"));
    }

    #[tokio::test]
    async fn tolerates_degraded_secondary_dependency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "alive"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "components": [
                    {"name": "qdrant", "status": "ok"},
                    {"name": "redis", "status": "degraded"},
                ]
            })))
            .mount(&server)
            .await;

        let check = HealthProbeCheck::new(&cfg_for(server.uri()), ProbeClient::new(None));
        let outcome = check.run().await;
        assert_eq!(outcome.status, CheckStatus::Pass);
    }
}
