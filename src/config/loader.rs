//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest first: built-in defaults, TOML file, `PROXY_*`
//! environment variables, command-line overrides.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied on the command line. Unset fields leave the config alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub debug: bool,
}

/// Load, override, and validate the configuration.
pub fn load_config(path: Option<&Path>, cli: &CliOverrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    apply_cli_overrides(&mut config, cli);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML file into a configuration without validating it.
pub fn load_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply `PROXY_*` variables, reading them through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(lookup);

    if let Some(v) = env.string("PROXY_HOST") {
        config.listener.host = v;
    }
    env.parse("PROXY_PORT", &mut config.listener.port)?;
    env.parse("PROXY_WORKERS", &mut config.listener.workers)?;

    env.parse("PROXY_MAX_CONNECTIONS", &mut config.pool.max_connections)?;
    env.parse("PROXY_MAX_KEEPALIVE_CONNECTIONS", &mut config.pool.max_keepalive_connections)?;
    env.parse("PROXY_KEEPALIVE_EXPIRY", &mut config.pool.keepalive_expiry_secs)?;
    env.flag("PROXY_VERIFY_SSL", &mut config.pool.verify_ssl);

    env.parse("PROXY_CONNECT_TIMEOUT", &mut config.timeouts.connect_secs)?;
    env.parse("PROXY_READ_TIMEOUT", &mut config.timeouts.read_secs)?;
    env.parse("PROXY_WRITE_TIMEOUT", &mut config.timeouts.write_secs)?;
    env.parse("PROXY_POOL_TIMEOUT", &mut config.timeouts.pool_secs)?;

    env.parse("PROXY_MEMORY_CHECK_INTERVAL", &mut config.memory.check_interval_secs)?;
    env.parse("PROXY_MAX_MEMORY_USAGE", &mut config.memory.max_memory_mb)?;
    env.parse("PROXY_CLEANUP_THRESHOLD", &mut config.memory.cleanup_threshold_mb)?;

    if let Some(v) = env.string("PROXY_LOG_LEVEL") {
        config.observability.log_level = v.to_ascii_lowercase();
    }
    if let Some(v) = env.string("PROXY_LOG_FILE") {
        config.observability.log_file = Some(v).filter(|p| !p.is_empty());
    }

    if let Some(v) = env.string("PROXY_ALLOWED_HOSTS") {
        config.forwarding.allowed_hosts = v
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty() && *h != "*")
            .map(str::to_string)
            .collect();
    }
    env.parse("PROXY_CHUNK_SIZE", &mut config.forwarding.chunk_size)?;

    Ok(())
}

fn apply_cli_overrides(config: &mut ProxyConfig, cli: &CliOverrides) {
    if let Some(host) = &cli.host {
        config.listener.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(workers) = cli.workers {
        config.listener.workers = workers;
    }
    if cli.debug {
        config.observability.log_level = "debug".to_string();
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
    }

    fn parse<T: FromStr>(&self, var: &'static str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = self.string(var) {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var, value: raw.clone() })?;
        }
        Ok(())
    }

    fn flag(&self, var: &str, slot: &mut bool) {
        if let Some(raw) = self.string(var) {
            *slot = raw.trim().eq_ignore_ascii_case("true");
        }
    }
}
