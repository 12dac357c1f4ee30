//! Configuration schema definitions.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::gate::LockConfig;
use parley_core::listener::ListenerConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-thread lock tuning.
    #[serde(default)]
    pub lock: LockSettings,

    /// Persistent listener tuning.
    #[serde(default)]
    pub listener: ListenerSettings,

    /// HTTP front-end settings.
    #[serde(default)]
    pub http: HttpSettings,

    /// Adapter-specific settings, keyed by adapter name. The runtime does
    /// not interpret these; each adapter deserializes its own section.
    #[serde(default)]
    pub adapters: HashMap<String, serde_json::Value>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line compact output (default).
    #[default]
    Compact,
    /// Default tracing-subscriber formatting.
    Full,
    /// Multi-line human-oriented output.
    Pretty,
    /// Machine-readable JSON lines (requires the `json-log` feature).
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module level overrides, e.g. `{ "parley_core" = "debug" }`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            filters: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-thread lock tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Lease time-to-live in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Initial retry delay in milliseconds.
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    /// Retry delay cap in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Overall acquisition timeout in seconds.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lease_ttl_secs: default_lease_ttl_secs(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl LockSettings {
    /// Converts to the core lock config.
    pub fn to_lock_config(&self) -> LockConfig {
        LockConfig {
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
            retry_initial: Duration::from_millis(self.retry_initial_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

fn default_lease_ttl_secs() -> u64 {
    60
}

fn default_retry_initial_ms() -> u64 {
    50
}

fn default_retry_max_ms() -> u64 {
    2000
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Persistent listener tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Hard cap on a single invocation's connection lifetime, in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

impl ListenerSettings {
    /// Converts to the core listener config.
    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            max_duration: Duration::from_secs(self.max_duration_secs),
        }
    }
}

fn default_max_duration_secs() -> u64 {
    540
}

/// HTTP front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl HttpSettings {
    /// The bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ParleyConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.lock.lease_ttl_secs, 60);
        assert_eq!(config.listener.max_duration_secs, 540);
        assert_eq!(config.http.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn lock_settings_convert_to_core_config() {
        let lock = LockSettings {
            lease_ttl_secs: 30,
            retry_initial_ms: 25,
            retry_max_ms: 500,
            acquire_timeout_secs: 10,
        };
        let core = lock.to_lock_config();
        assert_eq!(core.lease_ttl, Duration::from_secs(30));
        assert_eq!(core.retry_initial, Duration::from_millis(25));
        assert_eq!(core.retry_max, Duration::from_millis(500));
        assert_eq!(core.acquire_timeout, Duration::from_secs(10));
    }
}
