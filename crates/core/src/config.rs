//! Governance configuration, read once from the environment.

use std::str::FromStr;

/// Timeouts, versions, and sweep cadence for the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernanceConfig {
    /// Semver recorded on every ledger event.
    pub policy_version: String,
    /// How long a human approval stays consumable.
    pub approval_ttl_seconds: i64,
    /// Escalations older than this need a human.
    pub escalation_initial_timeout_seconds: i64,
    /// Escalations older than this are auto-denied.
    pub escalation_max_timeout_seconds: i64,
    /// How often the sweeper scans for expired escalations.
    pub sweep_interval_seconds: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            policy_version: "1.0.0".to_string(),
            approval_ttl_seconds: 3600,
            escalation_initial_timeout_seconds: 300,
            escalation_max_timeout_seconds: 3600,
            sweep_interval_seconds: 30,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl GovernanceConfig {
    /// Read all knobs from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            policy_version: std::env::var("GAVEL_POLICY_VERSION")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.policy_version),
            approval_ttl_seconds: env_parse("APPROVAL_TTL_SECONDS", defaults.approval_ttl_seconds),
            escalation_initial_timeout_seconds: env_parse(
                "ESCALATION_INITIAL_TIMEOUT_SECONDS",
                defaults.escalation_initial_timeout_seconds,
            ),
            escalation_max_timeout_seconds: env_parse(
                "ESCALATION_MAX_TIMEOUT_SECONDS",
                defaults.escalation_max_timeout_seconds,
            ),
            sweep_interval_seconds: env_parse(
                "GAVEL_SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval_seconds,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GovernanceConfig::default();
        assert_eq!(config.policy_version, "1.0.0");
        assert_eq!(config.approval_ttl_seconds, 3600);
        assert_eq!(config.escalation_initial_timeout_seconds, 300);
        assert_eq!(config.escalation_max_timeout_seconds, 3600);
        assert_eq!(config.sweep_interval_seconds, 30);
    }
}
