//! S2: stores small structured facts, then recalls them through the
//! natural-language retrieval endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use sentinel_config::SentinelConfig;
use sentinel_http::ProbeClient;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{Check, CheckOutcome};

const STORE_TIMEOUT: Duration = Duration::from_secs(10);
const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(15);

struct GoldenFact {
    kv: Value,
    questions: &'static [&'static str],
    expect_contains: &'static str,
}

fn test_dataset() -> Vec<GoldenFact> {
    vec![
        GoldenFact {
            kv: json!({"name": "Matt"}),
            questions: &["What's my name?", "Who am I?"],
            expect_contains: "Matt",
        },
        GoldenFact {
            kv: json!({"food": "spicy"}),
            questions: &["What kind of food do I like?", "What food preference do I have?"],
            expect_contains: "spicy",
        },
        GoldenFact {
            kv: json!({"location": "San Francisco"}),
            questions: &["Where do I live?", "What's my location?"],
            expect_contains: "San Francisco",
        },
    ]
}

pub struct GoldenFactRecallCheck {
    base_url: String,
    client: ProbeClient,
}

impl GoldenFactRecallCheck {
    pub fn new(cfg: &SentinelConfig, client: ProbeClient) -> Self {
        Self {
            base_url: cfg.target_base_url.clone(),
            client,
        }
    }

    async fn store_fact(&self, fact: &Value, user_id: &str) -> (bool, String, Option<Value>) {
        let payload = json!({
            "content": fact,
            "type": "log",
            "author": user_id,
            "metadata": {"test_type": "golden_recall", "sentinel": true},
        });

        let (ok, message, _latency, body) = self
            .client
            .call_json(
                Method::POST,
                &format!("{}/tools/store_context", self.base_url),
                Some(payload),
                200,
                STORE_TIMEOUT,
            )
            .await;

        (ok, message, body)
    }

    async fn recall(&self, question: &str, expected: &str, user_id: &str) -> bool {
        let payload = json!({
            "query": question,
            "limit": 5,
            "filters": {"author": user_id},
        });

        let (ok, _message, _latency, body) = self
            .client
            .call_json(
                Method::POST,
                &format!("{}/tools/retrieve_context", self.base_url),
                Some(payload),
                200,
                RETRIEVE_TIMEOUT,
            )
            .await;

        if !ok {
            return false;
        }

        let results = match body.as_ref().and_then(|b| b.get("results")).and_then(Value::as_array) {
            Some(r) => r,
            None => return false,
        };

        results.iter().any(|r| {
            let content = r.get("content").cloned().unwrap_or(Value::Null);
            let content_str = content.to_string();
            content_str.to_lowercase().contains(&expected.to_lowercase())
        })
    }
}

#[async_trait]
impl Check for GoldenFactRecallCheck {
    fn id(&self) -> &str {
        "S2-golden-fact-recall"
    }

    fn description(&self) -> &str {
        "Golden fact recall with natural questions"
    }

    async fn run(&self) -> CheckOutcome {
        let mut total_questions = 0usize;
        let mut passed_questions = 0usize;
        let mut test_results = Vec::new();

        for fact in test_dataset() {
            let user_id = format!("sentinel_test_{}", &Uuid::new_v4().simple().to_string()[..8]);
            let (store_ok, store_message, _store_body) = self.store_fact(&fact.kv, &user_id).await;

            if !store_ok {
                test_results.push(json!({
                    "kv": fact.kv,
                    "store_success": false,
                    "store_error": store_message,
                    "passed_questions": 0,
                    "total_questions": fact.questions.len(),
                }));
                total_questions += fact.questions.len();
                continue;
            }

            let mut this_passed = 0usize;
            for question in fact.questions {
                if self.recall(question, fact.expect_contains, &user_id).await {
                    this_passed += 1;
                }
            }

            total_questions += fact.questions.len();
            passed_questions += this_passed;
            test_results.push(json!({
                "kv": fact.kv,
                "store_success": true,
                "passed_questions": this_passed,
                "total_questions": fact.questions.len(),
            }));
        }

        let success_rate = if total_questions == 0 {
            0.0
        } else {
            passed_questions as f64 / total_questions as f64
        };

        let details = json!({
            "total_tests": total_questions,
            "passed_tests": passed_questions,
            "success_rate": success_rate,
            "test_results": test_results,
        });

        if success_rate >= 0.8 {
            CheckOutcome::pass(
                format!("Golden fact recall successful: {passed_questions}/{total_questions} tests passed"),
                Some(details),
            )
        } else if success_rate >= 0.6 {
            CheckOutcome::warn(
                format!("Golden fact recall degraded: {passed_questions}/{total_questions} tests passed"),
                Some(details),
            )
        } else {
            CheckOutcome::fail(
                format!("Golden fact recall failed: {passed_questions}/{total_questions} tests passed"),
                Some(details),
            )
        }
    }
}
