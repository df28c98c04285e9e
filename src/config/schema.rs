//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (host, port, worker threads).
    pub listener: ListenerConfig,

    /// Outbound connection pool settings.
    pub pool: PoolConfig,

    /// Outbound timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Memory monitor thresholds.
    pub memory: MemoryConfig,

    /// Forwarding engine settings.
    pub forwarding: ForwardingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port to bind.
    pub port: u16,

    /// Number of Tokio worker threads.
    pub workers: usize,
}

impl ListenerConfig {
    /// Combined `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 1,
        }
    }
}

/// Outbound connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent outbound requests per pool handle.
    pub max_connections: usize,

    /// Maximum idle connections kept alive per host.
    pub max_keepalive_connections: usize,

    /// Idle connection expiry in seconds.
    pub keepalive_expiry_secs: f64,

    /// Verify upstream TLS certificates.
    ///
    /// Off by default so that targets with self-signed or expired
    /// certificates remain reachable. Enabling it is recommended whenever the
    /// target set is known.
    pub verify_ssl: bool,

    /// Follow upstream redirects.
    pub follow_redirects: bool,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` for outbound calls.
    pub trust_env_proxy: bool,
}

impl PoolConfig {
    pub fn keepalive_expiry(&self) -> Duration {
        secs(self.keepalive_expiry_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_keepalive_connections: 20,
            keepalive_expiry_secs: 30.0,
            verify_ssl: false,
            follow_redirects: true,
            trust_env_proxy: true,
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: f64,

    /// Per-read timeout in seconds (response headers and each body read).
    pub read_secs: f64,

    /// Request write timeout in seconds.
    pub write_secs: f64,

    /// Time to wait for a free pool slot in seconds.
    pub pool_secs: f64,

    /// Upper bound on draining in-flight requests at shutdown, in seconds.
    pub shutdown_grace_secs: f64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        secs(self.write_secs)
    }

    pub fn pool(&self) -> Duration {
        secs(self.pool_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10.0,
            read_secs: 60.0,
            write_secs: 10.0,
            pool_secs: 5.0,
            shutdown_grace_secs: 30.0,
        }
    }
}

/// Memory monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Run the periodic monitor.
    pub enabled: bool,

    /// Sampling interval in seconds.
    pub check_interval_secs: u64,

    /// Resident memory (MB) above which a full cleanup runs.
    pub max_memory_mb: u64,

    /// Resident memory (MB) above which a light reclaim runs.
    pub cleanup_threshold_mb: u64,
}

impl MemoryConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 30,
            max_memory_mb: 500,
            cleanup_threshold_mb: 400,
        }
    }
}

/// Forwarding engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Maximum size of a relayed chunk in bytes.
    pub chunk_size: usize,

    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,

    /// Target hosts allowed through the proxy. Empty means unrestricted.
    pub allowed_hosts: Vec<String>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            max_body_size: 64 * 1024 * 1024, // 64MB
            allowed_hosts: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional file that receives a copy of all log lines.
    pub log_file: Option<String>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by `/admin/*` routes. `None` leaves them open.
    pub api_key: Option<String>,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.pool.max_connections, 100);
        assert_eq!(config.pool.max_keepalive_connections, 20);
        assert_eq!(config.pool.keepalive_expiry(), Duration::from_secs(30));
        assert!(!config.pool.verify_ssl);
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));
        assert_eq!(config.timeouts.read(), Duration::from_secs(60));
        assert_eq!(config.timeouts.write(), Duration::from_secs(10));
        assert_eq!(config.timeouts.pool(), Duration::from_secs(5));
        assert_eq!(config.memory.check_interval(), Duration::from_secs(30));
        assert_eq!(config.memory.max_memory_mb, 500);
        assert_eq!(config.memory.cleanup_threshold_mb, 400);
        assert_eq!(config.forwarding.chunk_size, 8192);
        assert!(config.forwarding.allowed_hosts.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            port = 9000

            [timeouts]
            read_secs = 5.5
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.timeouts.read(), Duration::from_millis(5500));
        assert_eq!(config.timeouts.connect(), Duration::from_secs(10));
    }

    #[test]
    fn negative_seconds_collapse_to_zero() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
    }
}
