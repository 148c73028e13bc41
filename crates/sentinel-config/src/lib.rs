//! Runtime configuration resolution for the sentinel daemon.
//!
//! Single source of truth for every env-var-backed knob in the
//! configuration table. Resolved once at startup via [`SentinelConfig::from_env`]
//! and threaded explicitly into constructors — no scattered `std::env::var`
//! calls, no globals.

use sentinel_schemas::Credential;
use tracing::warn;

/// The built-in default set of enabled checks, used when `SENTINEL_ENABLED_CHECKS`
/// is unset or empty.
pub const DEFAULT_ENABLED_CHECKS: &[&str] = &[
    "S1-probes",
    "S2-golden-fact-recall",
    "S3-paraphrase-robustness",
    "S4-metrics-wiring",
    "S5-security-negatives",
    "S6-backup-restore",
    "S7-config-parity",
    "S8-capacity-smoke",
    "S9-graph-intent",
    "S10-content-pipeline",
];

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
const VALID_ENVIRONMENTS: &[&str] = &["development", "staging", "production", "test"];

/// Floor for `check_interval_seconds`. `per_check_timeout` budgets 80% of the
/// cycle interval and floors at 5s, so any cycle interval below this would
/// let the per-check timeout reach or exceed the tick period itself — the
/// invariant the scheduler depends on to never overlap cycles.
pub const MIN_CHECK_INTERVAL_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct SentinelConfig {
    pub target_base_url: String,
    pub check_interval_seconds: u64,
    pub alert_threshold_failures: u32,
    pub dedup_window_minutes: i64,
    pub summary_interval_hours: i64,
    pub summary_top_n: usize,
    pub enabled_checks: Vec<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_rate_limit: u32,
    pub github_token: Option<String>,
    pub github_repo: Option<String>,
    pub credential: Option<Credential>,
    pub log_level: String,
    pub environment: String,
    pub db_path: String,
}

impl std::fmt::Debug for SentinelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelConfig")
            .field("target_base_url", &self.target_base_url)
            .field("check_interval_seconds", &self.check_interval_seconds)
            .field("alert_threshold_failures", &self.alert_threshold_failures)
            .field("dedup_window_minutes", &self.dedup_window_minutes)
            .field("summary_interval_hours", &self.summary_interval_hours)
            .field("summary_top_n", &self.summary_top_n)
            .field("enabled_checks", &self.enabled_checks)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_rate_limit", &self.telegram_rate_limit)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "<REDACTED>"),
            )
            .field("github_repo", &self.github_repo)
            .field("credential", &self.credential.as_ref().map(|_| "<REDACTED>"))
            .field("log_level", &self.log_level)
            .field("environment", &self.environment)
            .field("db_path", &self.db_path)
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SentinelConfig {
    pub fn from_env() -> Self {
        let enabled_checks = non_empty_env("SENTINEL_ENABLED_CHECKS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_ENABLED_CHECKS.iter().map(|s| s.to_string()).collect());

        let raw_credential = non_empty_env("SENTINEL_API_KEY").or_else(|| non_empty_env("API_KEY_MCP"));
        let credential = raw_credential.as_deref().and_then(|raw| {
            let parsed = Credential::parse(raw);
            if parsed.is_none() {
                let redacted = if raw.len() > 8 { &raw[..8] } else { "***" };
                warn!(
                    prefix = redacted,
                    "SENTINEL_API_KEY/API_KEY_MCP format invalid; proceeding without a credential"
                );
            }
            parsed
        });

        let raw_check_interval = non_empty_env("SENTINEL_CHECK_INTERVAL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        if raw_check_interval < MIN_CHECK_INTERVAL_SECONDS {
            warn!(
                configured = raw_check_interval,
                floor = MIN_CHECK_INTERVAL_SECONDS,
                "SENTINEL_CHECK_INTERVAL below minimum; clamping so per-check timeouts stay shorter than the cycle"
            );
        }

        let cfg = Self {
            target_base_url: non_empty_env("SENTINEL_TARGET_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            check_interval_seconds: raw_check_interval.max(MIN_CHECK_INTERVAL_SECONDS),
            alert_threshold_failures: non_empty_env("ALERT_THRESHOLD_FAILURES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            dedup_window_minutes: non_empty_env("ALERT_DEDUP_WINDOW_MIN")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            summary_interval_hours: non_empty_env("SUMMARY_INTERVAL_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            summary_top_n: non_empty_env("SUMMARY_TOP_N")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            enabled_checks,
            telegram_bot_token: non_empty_env("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty_env("TELEGRAM_CHAT_ID"),
            telegram_rate_limit: non_empty_env("TELEGRAM_RATE_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            github_token: non_empty_env("GITHUB_TOKEN"),
            github_repo: non_empty_env("SENTINEL_GITHUB_REPO")
                .or_else(|| non_empty_env("GITHUB_REPO")),
            credential,
            log_level: non_empty_env("LOG_LEVEL").unwrap_or_default(),
            environment: non_empty_env("ENVIRONMENT").unwrap_or_default(),
            db_path: non_empty_env("SENTINEL_DB_PATH")
                .unwrap_or_else(default_db_path),
        };

        cfg.validate_environment();
        cfg
    }

    pub fn is_check_enabled(&self, check_id: &str) -> bool {
        self.enabled_checks.iter().any(|c| c == check_id)
    }

    /// Validate critical environment variables at startup. Invalid values
    /// are logged as warnings, never fatal — only persistence path
    /// allow-list violations and missing required secrets are fatal.
    fn validate_environment(&self) {
        if self.log_level.is_empty() {
            warn!("LOG_LEVEL is not set; S7 config-parity check may flag this");
        } else if !VALID_LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            warn!(
                log_level = %self.log_level,
                "invalid LOG_LEVEL; expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
            );
        }

        if self.environment.is_empty() {
            warn!("ENVIRONMENT is not set; S7 config-parity check may flag this");
        } else if !VALID_ENVIRONMENTS.contains(&self.environment.to_lowercase().as_str()) {
            warn!(
                environment = %self.environment,
                "invalid ENVIRONMENT; expected one of development, staging, production, test"
            );
        }
    }
}

/// Default database path: `$XDG_DATA_HOME`-ish system data dir when present,
/// otherwise a per-user `.sentinel` directory under `$HOME`. Both land inside
/// the allow-list enforced by `sentinel-db`.
fn default_db_path() -> String {
    if let Some(dir) = dirs::data_dir() {
        dir.join("sentinel").join("sentinel.db").to_string_lossy().into_owned()
    } else if let Some(home) = dirs::home_dir() {
        home.join(".sentinel").join("sentinel.db").to_string_lossy().into_owned()
    } else {
        "/tmp/sentinel/sentinel.db".to_string()
    }
}
