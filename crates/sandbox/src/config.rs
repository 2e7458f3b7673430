//! Tunable limits for a single sandbox run.

/// Container limits, all overridable through the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct BlastBoxConfig {
    pub image: String,
    /// Docker memory string, e.g. `256m`.
    pub memory_limit: String,
    pub cpu_limit: f64,
    pub timeout_seconds: u64,
    /// `none` keeps the container off the network entirely.
    pub network_mode: String,
}

impl Default for BlastBoxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            memory_limit: "256m".to_string(),
            cpu_limit: 1.0,
            timeout_seconds: 30,
            network_mode: "none".to_string(),
        }
    }
}

impl BlastBoxConfig {
    /// Read limits from `BLASTBOX_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image: env_string("BLASTBOX_IMAGE", defaults.image),
            memory_limit: env_string("BLASTBOX_MEMORY_LIMIT", defaults.memory_limit),
            cpu_limit: env_parsed("BLASTBOX_CPU_LIMIT", defaults.cpu_limit),
            timeout_seconds: env_parsed("BLASTBOX_TIMEOUT_SECONDS", defaults.timeout_seconds),
            network_mode: env_string("BLASTBOX_NETWORK_MODE", defaults.network_mode),
        }
    }

    /// The `environment` block recorded in evidence packets.
    pub fn environment_json(&self) -> serde_json::Value {
        serde_json::json!({
            "image": self.image,
            "network_mode": self.network_mode,
            "memory_limit": self.memory_limit,
            "cpu_limit": self.cpu_limit,
            "timeout_seconds": self.timeout_seconds,
        })
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
