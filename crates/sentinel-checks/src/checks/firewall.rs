//! S11: local subprocess introspection of the host firewall. Not part of the
//! default enabled set — opt in via `SENTINEL_ENABLED_CHECKS`.

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use crate::{Check, CheckOutcome};

const REQUIRED_TCP_PORTS: &[u16] = &[22, 2222, 8000, 8001, 8080, 9090];
const REQUIRED_UDP_RANGES: &[(u32, u32)] = &[(60000, 61000)];
const DOCKER_INTEGRATION_PORTS: &[u16] = &[8000, 8080, 9090];

pub struct FirewallStatusCheck;

impl FirewallStatusCheck {
    pub fn new() -> Self {
        Self
    }

    async fn ufw_status(&self) -> UfwStatus {
        match Command::new("sudo").args(["ufw", "status", "verbose"]).output().await {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                UfwStatus {
                    active: stdout.contains("Status: active"),
                    rule_count: stdout.matches("ALLOW").count() + stdout.matches("DENY").count(),
                    checked_via: "ufw",
                }
            }
            Err(_) => match Command::new("systemctl").args(["is-active", "ufw"]).output().await {
                Ok(out) => {
                    let stdout = String::from_utf8_lossy(&out.stdout);
                    UfwStatus {
                        active: stdout.trim() == "active",
                        rule_count: 0,
                        checked_via: "systemctl",
                    }
                }
                Err(_) => UfwStatus {
                    active: false,
                    rule_count: 0,
                    checked_via: "unavailable",
                },
            },
        }
    }

    /// Checks required TCP ports and the Mosh UDP range against `ufw status
    /// numbered`. Falls back to `iptables -L -n` (checking for each port's
    /// `dpt:` match, since iptables has no ufw-style allow-list summary) if
    /// ufw itself can't be queried.
    async fn missing_rules(&self) -> Vec<String> {
        match Command::new("sudo").args(["ufw", "status", "numbered"]).output().await {
            Ok(out) if out.status.success() => {
                let output = String::from_utf8_lossy(&out.stdout);
                let mut missing: Vec<String> = REQUIRED_TCP_PORTS
                    .iter()
                    .filter(|port| {
                        let tcp_form = format!("{port}/tcp");
                        !output.contains(&tcp_form) && !output.contains(&port.to_string())
                    })
                    .map(|port| format!("TCP port {port}"))
                    .collect();

                for (start, end) in REQUIRED_UDP_RANGES {
                    let range_form = format!("{start}:{end}/udp");
                    if !output.contains(&range_form) {
                        missing.push(format!("UDP range {start}-{end}"));
                    }
                }
                missing
            }
            _ => self.missing_rules_via_iptables().await,
        }
    }

    async fn missing_rules_via_iptables(&self) -> Vec<String> {
        match Command::new("sudo").args(["iptables", "-L", "-n"]).output().await {
            Ok(out) if out.status.success() => {
                let output = String::from_utf8_lossy(&out.stdout);
                REQUIRED_TCP_PORTS
                    .iter()
                    .filter(|port| !output.contains(&format!("dpt:{port}")))
                    .map(|port| format!("Port {port} (iptables)"))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Reports whether Docker's iptables `DOCKER` chain carries rules for
    /// any of the service ports it forwards. Purely informational — never
    /// contributes to pass/warn/fail, matching the pass-path detail it is
    /// grounded on.
    async fn docker_integration(&self) -> bool {
        match Command::new("sudo").args(["iptables", "-L", "DOCKER", "-n"]).output().await {
            Ok(out) if out.status.success() => {
                let output = String::from_utf8_lossy(&out.stdout);
                DOCKER_INTEGRATION_PORTS
                    .iter()
                    .any(|port| output.contains(&format!("dpt:{port}")))
            }
            _ => false,
        }
    }
}

impl Default for FirewallStatusCheck {
    fn default() -> Self {
        Self::new()
    }
}

struct UfwStatus {
    active: bool,
    rule_count: usize,
    checked_via: &'static str,
}

#[async_trait]
impl Check for FirewallStatusCheck {
    fn id(&self) -> &str {
        "S11-firewall-status"
    }

    fn description(&self) -> &str {
        "Host firewall status and required-port exposure"
    }

    async fn run(&self) -> CheckOutcome {
        let status = self.ufw_status().await;

        if !status.active {
            return CheckOutcome::fail(
                "Firewall is disabled",
                Some(json!({
                    "ufw_active": false,
                    "checked_via": status.checked_via,
                    "security_risk": "high",
                })),
            );
        }

        let missing = self.missing_rules().await;
        if !missing.is_empty() {
            return CheckOutcome::warn(
                format!("Firewall active but missing {} rules", missing.len()),
                Some(json!({
                    "ufw_active": true,
                    "missing_rules": missing,
                    "configured_rules": status.rule_count,
                })),
            );
        }

        let docker_integration = self.docker_integration().await;
        CheckOutcome::pass(
            "Firewall active with all required rules",
            Some(json!({
                "ufw_active": true,
                "configured_rules": status.rule_count,
                "docker_integration": docker_integration,
                "protected_ports": REQUIRED_TCP_PORTS,
            })),
        )
    }
}
