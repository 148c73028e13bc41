//! Shared wire/data types for the sentinel workspace.
//!
//! Every other `sentinel-*` crate depends on this one and nothing else in
//! the reverse direction; it owns no IO and no async.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// CheckStatus
// ---------------------------------------------------------------------------

/// The closed set of outcomes a check execution can report.
///
/// Any value outside this set is a persistence-layer rejection, not a
/// normalization target — see [`CheckResult::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        }
    }

    /// Parse a status string read back from persistence. Unknown values are
    /// an error, never silently coerced into a known variant.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "pass" => Ok(CheckStatus::Pass),
            "warn" => Ok(CheckStatus::Warn),
            "fail" => Ok(CheckStatus::Fail),
            other => Err(format!("unrecognized check status '{other}'")),
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CheckResult
// ---------------------------------------------------------------------------

/// The immutable record emitted by every check execution.
///
/// Append-only: never mutated after emission. Produced exactly once per
/// scheduled execution of a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: CheckStatus,
    pub latency_ms: f64,
    pub message: String,
    pub details: Option<Value>,
}

impl CheckResult {
    pub fn new(
        check_id: impl Into<String>,
        status: CheckStatus,
        latency_ms: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            timestamp: Utc::now(),
            status,
            latency_ms,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Rejects a result whose `latency_ms` is negative. A value of exactly
    /// `0.0` is legal (fast-path).
    pub fn validate(&self) -> Result<(), String> {
        if self.latency_ms < 0.0 {
            return Err(format!(
                "negative latency_ms ({}) for check '{}'",
                self.latency_ms, self.check_id
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AlertSeverity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Only `info` alerts are silenced (no notification ping).
    pub fn disable_notification(&self) -> bool {
        matches!(self, AlertSeverity::Info)
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AlertEvent
// ---------------------------------------------------------------------------

/// Emitted by the alert manager. Lifecycle: `pending -> dispatched ->
/// (optional) resolved`. The in-memory struct models the row shape of
/// `alert_history`; `fingerprint` is never persisted as a primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub check_id: String,
    pub alert_type: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub fingerprint: String,
    pub dispatched_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Deterministic dedup fingerprint over (check_id, status, normalized message).
///
/// Normalization lowercases and collapses internal whitespace so cosmetic
/// differences in a message do not fracture the dedup key.
pub fn dedup_fingerprint(check_id: &str, status: CheckStatus, message: &str) -> String {
    let normalized: String = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{check_id}|{}|{normalized}", status.as_str())
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Outbound API credential, parsed once at process start.
///
/// Two accepted shapes:
/// - Bare: `vmk_{prefix}_{hash}`
/// - Extended: `vmk_{prefix}_{hash}:user:role:isAgent`
///
/// Only the bare key portion is ever transmitted, in `X-API-Key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bare(String),
    Extended {
        key: String,
        user: String,
        role: String,
        is_agent: bool,
    },
}

impl Credential {
    /// The portion transmitted over the wire. Never contains a colon.
    pub fn bare_key(&self) -> &str {
        match self {
            Credential::Bare(k) => k,
            Credential::Extended { key, .. } => key,
        }
    }

    /// Parse a raw secret value. Returns `None` on any format violation;
    /// callers treat that as "no credential" rather than hard-failing.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let parts: Vec<&str> = raw.split(':').collect();
        let key_part = parts[0];
        if !is_well_formed_key(key_part) {
            return None;
        }

        match parts.len() {
            1 => Some(Credential::Bare(key_part.to_string())),
            4 => {
                let is_agent = match parts[3] {
                    "true" => true,
                    "false" => false,
                    _ => return None,
                };
                Some(Credential::Extended {
                    key: key_part.to_string(),
                    user: parts[1].to_string(),
                    role: parts[2].to_string(),
                    is_agent,
                })
            }
            _ => None,
        }
    }
}

/// `vmk_{prefix}_{hash}`: three underscore-delimited segments, alphanumeric.
fn is_well_formed_key(s: &str) -> bool {
    let segs: Vec<&str> = s.splitn(3, '_').collect();
    segs.len() == 3
        && segs[0] == "vmk"
        && !segs[1].is_empty()
        && !segs[2].is_empty()
        && segs[1].chars().all(|c| c.is_ascii_alphanumeric())
        && segs[2].chars().all(|c| c.is_ascii_alphanumeric())
}

// ---------------------------------------------------------------------------
// Per-check statistics
// ---------------------------------------------------------------------------

/// Mutable in-memory aggregate keyed by check_id. Reset only on process
/// restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckStats {
    pub total_runs: u64,
    pub pass_count: u64,
    pub warn_count: u64,
    pub fail_count: u64,
    pub total_latency_ms: f64,
    pub last_result: Option<CheckResult>,
}

impl CheckStats {
    pub fn record(&mut self, result: &CheckResult) {
        self.total_runs += 1;
        self.total_latency_ms += result.latency_ms;
        match result.status {
            CheckStatus::Pass => self.pass_count += 1,
            CheckStatus::Warn => self.warn_count += 1,
            CheckStatus::Fail => self.fail_count += 1,
        }
        self.last_result = Some(result.clone());
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_latency_ms / self.total_runs as f64
        }
    }
}
