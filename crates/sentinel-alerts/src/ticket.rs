//! Optional ticket sink: opens or comments on an external issue tracker.
//! Only active when both a credential and a repository identifier are
//! configured; failures here are always non-fatal to the alert pipeline.

use sentinel_schemas::AlertSeverity;
use tracing::{error, warn};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Result of a single dispatch. `Opened` carries the tracker's own issue
/// number so the caller can persist it for the next escalation on the same
/// check to comment on instead of opening a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketOutcome {
    Opened(u64),
    Commented,
    Failed,
}

impl TicketOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TicketOutcome::Failed)
    }
}

pub struct TicketSink {
    http: reqwest::Client,
    token: String,
    repo: String,
    api_base: String,
}

impl TicketSink {
    pub fn new(token: &str, repo: &str) -> Self {
        Self::with_base_url(token, repo, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: &str, repo: &str, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.to_string(),
            repo: repo.to_string(),
            api_base: api_base.to_string(),
        }
    }

    /// Opens a new issue, or comments on the matching open issue if
    /// `existing_issue_number` is `Some` (resolved by the caller via the
    /// "open if none matching-fingerprint is open, else comment" rule).
    pub async fn dispatch(
        &self,
        check_id: &str,
        severity: AlertSeverity,
        message: &str,
        fingerprint: &str,
        existing_issue_number: Option<u64>,
    ) -> TicketOutcome {
        match existing_issue_number {
            Some(number) => {
                if self.comment(number, message).await {
                    TicketOutcome::Commented
                } else {
                    TicketOutcome::Failed
                }
            }
            None => match self.open(check_id, severity, message, fingerprint).await {
                Some(number) => TicketOutcome::Opened(number),
                None => TicketOutcome::Failed,
            },
        }
    }

    async fn open(&self, check_id: &str, severity: AlertSeverity, message: &str, fingerprint: &str) -> Option<u64> {
        let url = format!("{}/repos/{}/issues", self.api_base, self.repo);
        let body = serde_json::json!({
            "title": format!("[sentinel] {check_id}: {severity}"),
            "body": format!("{message}\n\n<!-- sentinel-fingerprint: {fingerprint} -->"),
            "labels": ["sentinel", severity.as_str()],
        });

        match self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("User-Agent", "sentinel")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(body) => {
                    let number = body.get("number").and_then(serde_json::Value::as_u64);
                    if number.is_none() {
                        warn!("ticket sink opened an issue but the response carried no 'number' field");
                    }
                    number
                }
                Err(e) => {
                    warn!(error = %e, "ticket sink issue response was not valid JSON");
                    None
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "ticket sink failed to open issue");
                None
            }
            Err(e) => {
                error!(error = %e, "ticket sink transport error opening issue");
                None
            }
        }
    }

    async fn comment(&self, issue_number: u64, message: &str) -> bool {
        let url = format!(
            "{}/repos/{}/issues/{issue_number}/comments",
            self.api_base, self.repo
        );
        let body = serde_json::json!({"body": message});

        match self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("User-Agent", "sentinel")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "ticket sink failed to comment");
                false
            }
            Err(e) => {
                error!(error = %e, "ticket sink transport error commenting");
                false
            }
        }
    }
}
