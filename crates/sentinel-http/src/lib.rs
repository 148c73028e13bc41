//! HTTP probe primitives shared by every check body.
//!
//! Uniform outbound HTTP with a consistent authentication and timeout
//! discipline. Every operation here converts failures into a return value;
//! nothing raises to the caller (`sentinel-checks`'s [`Execute`] wrapper
//! still exists as a backstop for anything that slips through, but these
//! primitives are designed to never need it).

use std::time::{Duration, Instant};

use reqwest::Method;
use sentinel_schemas::Credential;
use serde_json::Value;
use tracing::debug;

/// Outbound HTTP client shared by all check bodies in one process.
///
/// Holds a single resolved [`Credential`] (or none) read once at process
/// start; never re-reads the environment.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    credential: Option<Credential>,
}

impl ProbeClient {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credential,
        }
    }

    fn auth_header_value(&self) -> Option<&str> {
        self.credential.as_ref().map(|c| c.bare_key())
    }

    /// `GET` a health-style endpoint. Never fails outward: transport errors,
    /// timeouts, and status mismatches all surface as `ok=false` with a
    /// short diagnostic message. Latency is measured regardless of outcome.
    pub async fn check_endpoint_health(
        &self,
        url: &str,
        expected_status: u16,
        timeout: Duration,
    ) -> (bool, String, f64) {
        let start = Instant::now();

        let mut req = self.http.get(url).timeout(timeout);
        if let Some(key) = self.auth_header_value() {
            req = req.header("X-API-Key", key);
            debug!(prefix = %redacted_prefix(key), "attaching X-API-Key to health probe");
        }

        match req.send().await {
            Ok(resp) => {
                let latency_ms = elapsed_ms(start);
                let status = resp.status().as_u16();
                if status == expected_status {
                    (true, format!("Endpoint healthy (HTTP {status})"), latency_ms)
                } else {
                    (false, format!("Unexpected status: HTTP {status}"), latency_ms)
                }
            }
            Err(e) => {
                let latency_ms = elapsed_ms(start);
                if e.is_timeout() {
                    (false, format!("Endpoint timeout after {:.1}s", timeout.as_secs_f64()), latency_ms)
                } else {
                    (false, format!("Endpoint error: {e}"), latency_ms)
                }
            }
        }
    }

    /// Issue a request with an optional JSON body, attaching the resolved
    /// credential as `X-API-Key`. JSON parse failures on the response body
    /// yield `parsed_body=None` without failing the call, provided the
    /// status matches.
    pub async fn call_json(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        expected_status: u16,
        timeout: Duration,
    ) -> (bool, String, f64, Option<Value>) {
        let start = Instant::now();

        let mut req = self.http.request(method, url).timeout(timeout);
        if let Some(key) = self.auth_header_value() {
            req = req.header("X-API-Key", key);
            debug!(prefix = %redacted_prefix(key), "attaching X-API-Key to JSON call");
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        match req.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text_result = resp.text().await;
                let latency_ms = elapsed_ms(start);

                let parsed: Option<Value> = match &text_result {
                    Ok(text) => serde_json::from_str(text).ok(),
                    Err(_) => None,
                };

                if status == expected_status {
                    (true, format!("API call successful (HTTP {status})"), latency_ms, parsed)
                } else {
                    (false, format!("API call failed: HTTP {status}"), latency_ms, parsed)
                }
            }
            Err(e) => {
                let latency_ms = elapsed_ms(start);
                if e.is_timeout() {
                    (
                        false,
                        format!("API timeout after {:.1}s", timeout.as_secs_f64()),
                        latency_ms,
                        None,
                    )
                } else {
                    (false, format!("API error: {e}"), latency_ms, None)
                }
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn redacted_prefix(key: &str) -> String {
    if key.len() > 12 {
        format!("{}...", &key[..12])
    } else {
        "***".to_string()
    }
}
