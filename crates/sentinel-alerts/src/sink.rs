//! The rate-limited chat-bot notification sink (Telegram-style) and its
//! HTML rendering.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sentinel_schemas::{AlertSeverity, CheckResult, CheckStatus};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const RATE_WINDOW: Duration = Duration::from_secs(60);
const INTER_MESSAGE_DELAY: Duration = Duration::from_millis(100);
const QUEUE_CAP: usize = 200;

#[derive(Clone, Debug)]
pub struct RenderedMessage {
    pub text: String,
    pub disable_notification: bool,
}

/// Delivers alerts to an external bot-style chat API with a strict
/// per-minute send budget and a bounded overflow queue.
pub struct NotificationSink {
    http: reqwest::Client,
    api_url: String,
    chat_id: String,
    rate_limit: u32,
    send_times: Mutex<VecDeque<Instant>>,
    queue: Mutex<VecDeque<RenderedMessage>>,
}

impl NotificationSink {
    pub fn new(bot_token: &str, chat_id: &str, rate_limit: u32) -> Self {
        Self::with_api_base(&format!("https://api.telegram.org/bot{bot_token}"), chat_id, rate_limit)
    }

    /// Same as [`NotificationSink::new`] but against an arbitrary API base —
    /// lets tests redirect the sink at a mock server instead of Telegram.
    pub fn with_api_base(api_base: &str, chat_id: &str, rate_limit: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_base.to_string(),
            chat_id: chat_id.to_string(),
            rate_limit,
            send_times: Mutex::new(VecDeque::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Attempts synchronous delivery if under the rolling 60-second budget;
    /// otherwise enqueues and returns `false`.
    pub async fn send(&self, message: RenderedMessage) -> bool {
        if self.reserve_budget().await {
            self.deliver(&message).await
        } else {
            self.enqueue(message).await;
            false
        }
    }

    /// Drains as many queued messages as the current budget allows.
    pub async fn process_queue(&self) -> usize {
        let mut sent = 0;
        loop {
            if !self.reserve_budget().await {
                break;
            }
            let next = {
                let mut q = self.queue.lock().await;
                q.pop_front()
            };
            let Some(message) = next else {
                break;
            };
            if self.deliver(&message).await {
                sent += 1;
            }
            tokio::time::sleep(INTER_MESSAGE_DELAY).await;
        }
        if sent > 0 {
            info!(sent, "processed queued notification sink messages");
        }
        sent
    }

    pub async fn test_connection(&self) -> bool {
        let url = format!("{}/getMe", self.api_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Value>()
                .await
                .map(|body| body.get("ok").and_then(Value::as_bool).unwrap_or(false))
                .unwrap_or(false),
            Ok(resp) => {
                warn!(status = %resp.status(), "telegram test_connection returned non-success");
                false
            }
            Err(e) => {
                error!(error = %e, "telegram test_connection failed");
                false
            }
        }
    }

    async fn reserve_budget(&self) -> bool {
        let mut times = self.send_times.lock().await;
        let cutoff = Instant::now() - RATE_WINDOW;
        while times.front().is_some_and(|t| *t < cutoff) {
            times.pop_front();
        }
        if times.len() < self.rate_limit as usize {
            times.push_back(Instant::now());
            true
        } else {
            false
        }
    }

    async fn enqueue(&self, message: RenderedMessage) {
        let mut q = self.queue.lock().await;
        if q.len() >= QUEUE_CAP {
            q.pop_front();
            warn!("notification sink queue at capacity; dropped oldest queued message");
        }
        q.push_back(message);
    }

    async fn deliver(&self, message: &RenderedMessage) -> bool {
        let url = format!("{}/sendMessage", self.api_url);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message.text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
            "disable_notification": message.disable_notification,
        });

        match self.http.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) if body.get("ok").and_then(Value::as_bool).unwrap_or(false) => true,
                Ok(body) => {
                    warn!(?body, "telegram API reported ok=false");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "telegram response was not valid JSON");
                    false
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "telegram sendMessage returned non-success");
                false
            }
            Err(e) => {
                error!(error = %e, "telegram sendMessage transport error");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn severity_emoji(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "\u{1F6A8}",
        AlertSeverity::High => "\u{26A0}\u{FE0F}",
        AlertSeverity::Warning => "\u{26A1}",
        AlertSeverity::Info => "\u{2139}\u{FE0F}",
    }
}

fn status_emoji(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "\u{2705}",
        CheckStatus::Warn => "\u{26A1}",
        CheckStatus::Fail => "\u{274C}",
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a single alert as an HTML-formatted chat message. Matches the
/// rendering contract: severity header, fixed fields, optional details
/// bullet list, every field HTML-escaped.
pub fn render_alert(result: &CheckResult, severity: AlertSeverity, message: &str) -> RenderedMessage {
    let mut lines = vec![
        format!(
            "<b>{} {}: Sentinel Alert</b>",
            severity_emoji(severity),
            severity.as_str().to_uppercase()
        ),
        "\u{2501}".repeat(21),
        format!("<b>Check:</b> {}", escape_html(&result.check_id)),
        format!(
            "<b>Status:</b> {} {}",
            result.status.as_str().to_uppercase(),
            status_emoji(result.status)
        ),
        format!("<b>Time:</b> {} UTC", result.timestamp.format("%Y-%m-%d %H:%M:%S")),
        format!("<b>Latency:</b> {:.1}ms", result.latency_ms),
        String::new(),
        format!("<b>Message:</b>\n{}", escape_html(message)),
    ];

    if let Some(details) = &result.details {
        lines.push(String::new());
        lines.push("<b>Details:</b>".to_string());
        if let Some(map) = details.as_object() {
            for (key, value) in map {
                lines.push(format!("\u{2022} {}: {}", escape_html(key), escape_html(&value.to_string())));
            }
        }
    }

    if matches!(severity, AlertSeverity::Critical | AlertSeverity::High) {
        lines.push(String::new());
        lines.push("<b>Action Required:</b> Immediate investigation".to_string());
    }

    lines.push("\u{2501}".repeat(21));

    RenderedMessage {
        text: lines.join("\n"),
        disable_notification: severity.disable_notification(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_for(base_url: &str) -> NotificationSink {
        NotificationSink::with_api_base(base_url, "chat1", 2)
    }

    #[test]
    fn escape_html_covers_all_special_characters() {
        let escaped = escape_html("<script>&\"quotes\"</script>");
        assert_eq!(escaped, "&lt;script&gt;&amp;&quot;quotes&quot;&lt;/script&gt;");
    }

    #[test]
    fn render_alert_disables_notification_only_for_info() {
        let result = CheckResult::new("S1-probes", CheckStatus::Fail, 12.0, "down");
        let msg = render_alert(&result, AlertSeverity::Info, "recovered");
        assert!(msg.disable_notification);

        let msg2 = render_alert(&result, AlertSeverity::Critical, "still down");
        assert!(!msg2.disable_notification);
    }

    #[test]
    fn render_alert_adds_action_required_for_high_and_critical_only() {
        let result = CheckResult::new("S1-probes", CheckStatus::Fail, 12.0, "down");

        let critical = render_alert(&result, AlertSeverity::Critical, "down");
        assert!(critical.text.contains("Action Required"));

        let high = render_alert(&result, AlertSeverity::High, "down");
        assert!(high.text.contains("Action Required"));

        let warning = render_alert(&result, AlertSeverity::Warning, "down");
        assert!(!warning.text.contains("Action Required"));

        let info = render_alert(&result, AlertSeverity::Info, "recovered");
        assert!(!info.text.contains("Action Required"));
    }

    #[tokio::test]
    async fn rate_limit_enforced_within_rolling_window() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let sink = sink_for(&server.uri());
        let msg = RenderedMessage {
            text: "hi".to_string(),
            disable_notification: false,
        };

        assert!(sink.send(msg.clone()).await);
        assert!(sink.send(msg.clone()).await);
        assert!(!sink.send(msg.clone()).await);
        assert_eq!(sink.queue.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_queued_message() {
        let sink = NotificationSink::with_api_base("http://127.0.0.1:1", "chat1", 0);

        for i in 0..(QUEUE_CAP + 1) {
            sink.enqueue(RenderedMessage {
                text: format!("msg-{i}"),
                disable_notification: false,
            })
            .await;
        }

        let q = sink.queue.lock().await;
        assert_eq!(q.len(), QUEUE_CAP);
        assert_eq!(q.front().unwrap().text, "msg-1");
        assert_eq!(q.back().unwrap().text, format!("msg-{QUEUE_CAP}"));
    }
}
