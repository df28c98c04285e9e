//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A value that must be strictly positive was zero or negative.
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    /// Two related values are in the wrong order.
    #[error("{lower} ({lower_value}) must not exceed {upper} ({upper_value})")]
    Ordering {
        lower: &'static str,
        lower_value: u64,
        upper: &'static str,
        upper_value: u64,
    },

    /// Unknown log level string.
    #[error("unknown log level '{0}'")]
    LogLevel(String),

    /// Metrics address does not parse as a socket address.
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    /// An allowed-hosts entry is blank.
    #[error("allowed_hosts contains an empty entry")]
    EmptyAllowedHost,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.workers == 0 {
        errors.push(ValidationError::NotPositive { field: "listener.workers" });
    }
    if config.pool.max_connections == 0 {
        errors.push(ValidationError::NotPositive { field: "pool.max_connections" });
    }
    if config.pool.max_keepalive_connections > config.pool.max_connections {
        errors.push(ValidationError::Ordering {
            lower: "pool.max_keepalive_connections",
            lower_value: config.pool.max_keepalive_connections as u64,
            upper: "pool.max_connections",
            upper_value: config.pool.max_connections as u64,
        });
    }

    let seconds = [
        ("pool.keepalive_expiry_secs", config.pool.keepalive_expiry_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("timeouts.pool_secs", config.timeouts.pool_secs),
        ("timeouts.shutdown_grace_secs", config.timeouts.shutdown_grace_secs),
    ];
    for (field, value) in seconds {
        if !(value.is_finite() && value > 0.0) {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    if config.memory.check_interval_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "memory.check_interval_secs" });
    }
    if config.memory.cleanup_threshold_mb > config.memory.max_memory_mb {
        errors.push(ValidationError::Ordering {
            lower: "memory.cleanup_threshold_mb",
            lower_value: config.memory.cleanup_threshold_mb,
            upper: "memory.max_memory_mb",
            upper_value: config.memory.max_memory_mb,
        });
    }

    if config.forwarding.chunk_size == 0 {
        errors.push(ValidationError::NotPositive { field: "forwarding.chunk_size" });
    }
    if config.forwarding.max_body_size == 0 {
        errors.push(ValidationError::NotPositive { field: "forwarding.max_body_size" });
    }
    if config.forwarding.allowed_hosts.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::EmptyAllowedHost);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
