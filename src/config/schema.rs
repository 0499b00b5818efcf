//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a service
//! process. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a service process.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Network service settings (name, bind address, timeouts).
    pub service: ServiceConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Metrics settings.
    pub observability: ObservabilityConfig,

    /// In-memory cache settings.
    pub cache: CacheConfig,

    /// In-memory queue settings.
    pub queue: QueueConfig,
}

/// Settings for a single network service driven by a lifecycle controller.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Identifying label used in logs and metrics.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:3000"). Port 0 picks an ephemeral port.
    pub address: String,

    /// Graceful drain budget used when shutdown is triggered without an
    /// explicit deadline (external cancellation, OS signals).
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl ServiceConfig {
    /// Config for a service with the given name and address, defaults elsewhere.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "http".to_string(),
            address: "0.0.0.0:3000".to_string(),
            shutdown_timeout_secs: 30,
            request_timeout_secs: 15,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Output format for log records.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Write to stdout.
    pub stdout: bool,

    /// Also append to this file (no ANSI colors).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            stdout: true,
            file: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// In-memory cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live applied when a value is stored without one.
    pub default_ttl_secs: u64,

    /// Interval between sweeps of expired entries.
    pub cleanup_interval_secs: u64,

    /// Maximum number of live entries.
    pub max_entries: usize,

    /// Prefix added to every key as `prefix:key`.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            cleanup_interval_secs: 600,
            max_entries: 10_000,
            key_prefix: String::new(),
        }
    }
}

/// In-memory queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued messages.
    pub max_size: usize,

    /// Messages handed out per batch pop.
    pub batch_size: usize,

    /// Poll interval for consumers in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            batch_size: 100,
            poll_interval_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.service.address, "0.0.0.0:3000");
        assert_eq!(config.service.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.service.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.cache.default_ttl_secs, 300);
        assert_eq!(config.queue.max_size, 10_000);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [service]
            name = "api"
            address = "127.0.0.1:8080"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.name, "api");
        assert_eq!(config.service.address, "127.0.0.1:8080");
        assert_eq!(config.service.shutdown_timeout_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.stdout);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn logging_file_output() {
        let config: AppConfig = toml::from_str(
            r#"
            [logging]
            stdout = false
            file = "/var/log/service.log"
            "#,
        )
        .unwrap();

        assert!(!config.logging.stdout);
        assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/service.log")));
    }
}
