//! Configuration schema definitions.
//!
//! Two layers of configuration exist:
//! - [`HotswapConfig`]: process settings, read once at startup from an optional TOML file.
//! - [`ServerConfig`]: the serving configuration, rebuilt from the payload file on every
//!   reload cycle and handed to exactly one server instance.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Serving configuration for one server instance.
///
/// Immutable once loaded; every reload cycle produces a fresh value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the instance binds (e.g. "0.0.0.0:8080").
    pub bind_address: String,

    /// Message served on the hello route, byte for byte.
    pub payload: Bytes,
}

/// Root process configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HotswapConfig {
    /// Listener settings shared by every server instance.
    pub listener: ListenerConfig,

    /// Reload loop settings.
    pub reload: ReloadConfig,

    /// Graceful drain settings.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). A bare ":port" binds all IPv4 interfaces.
    pub bind_address: String,

    /// Pending connection queue length passed to `listen(2)`.
    pub backlog: u32,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Reload loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// File whose whole contents become the served payload.
    pub payload_path: String,

    /// Pause between reload iterations in milliseconds.
    pub interval_ms: u64,

    /// Also reload early when the payload file changes on disk.
    pub watch: bool,
}

impl ReloadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            payload_path: "config.txt".to_string(),
            interval_ms: 3_000,
            watch: false,
        }
    }
}

/// Graceful drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time a retiring instance may spend draining, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 2_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let config = HotswapConfig::default();
        assert_eq!(config.reload.interval(), Duration::from_secs(3));
        assert_eq!(config.shutdown.drain_timeout(), Duration::from_secs(2));
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.reload.payload_path, "config.txt");
        assert!(!config.reload.watch);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: HotswapConfig = toml::from_str(
            r#"
            [reload]
            interval_ms = 500

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.reload.interval(), Duration::from_millis(500));
        assert_eq!(config.reload.payload_path, "config.txt");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.shutdown.drain_timeout_ms, 2_000);
    }

    #[test]
    fn effective_settings_render_as_toml() {
        let mut config = HotswapConfig::default();
        config.listener.bind_address = ":9000".to_string();
        config.observability.log_format = LogFormat::Json;

        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("[listener]"));
        assert!(rendered.contains("bind_address = \":9000\""));
        assert!(rendered.contains("log_format = \"json\""));

        let parsed: HotswapConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.listener.bind_address, ":9000");
        assert_eq!(parsed.reload.interval(), Duration::from_secs(3));
    }
}
