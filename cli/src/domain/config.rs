//! Domain types and validators for Stratus configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "server.url",
    "server.username",
    "refresh.interval_secs",
    "timeouts.request_secs",
    "timeouts.deployment_secs",
    "timeouts.upload_secs",
    "timeouts.poll_interval_ms",
    "timeouts.login_interval_ms",
    "timeouts.login_attempts",
    "proxy.url",
    "tunnel_app",
];

/// Name of the application that proxies local ports to services.
pub const DEFAULT_TUNNEL_APP: &str = "caldecott";

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.stratus/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StratusConfig {
    pub server: ServerConfig,
    pub refresh: RefreshConfig,
    pub timeouts: TimeoutConfig,
    pub proxy: ProxyConfig,
    pub tunnel_app: String,
}

impl Default for StratusConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            refresh: RefreshConfig::default(),
            timeouts: TimeoutConfig::default(),
            proxy: ProxyConfig::default(),
            tunnel_app: DEFAULT_TUNNEL_APP.to_string(),
        }
    }
}

/// Target control plane.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Periodic module refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Zero or negative disables periodic refresh.
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

impl RefreshConfig {
    /// Interval as a duration, `None` when disabled.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        u64::try_from(self.interval_secs)
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

fn default_refresh_interval() -> i64 {
    60
}

/// Independent timeouts per call site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for staging-aware and stopped-state-aware retries.
    pub request_secs: u64,
    /// Readiness wait after a start.
    pub deployment_secs: u64,
    /// Post-create existence confirmation.
    pub upload_secs: u64,
    pub poll_interval_ms: u64,
    pub login_interval_ms: u64,
    pub login_attempts: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            deployment_secs: 600,
            upload_secs: 60,
            poll_interval_ms: 2000,
            login_interval_ms: 2000,
            login_attempts: 3,
        }
    }
}

/// Outbound proxy for control-plane calls.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let invalid = |valid: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    };
    match key {
        "server.url" | "proxy.url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(invalid("an http:// or https:// URL").into());
            }
        }
        "server.username" | "tunnel_app" => {
            if value.trim().is_empty() {
                return Err(invalid("a non-empty string").into());
            }
        }
        "refresh.interval_secs" => {
            if value.parse::<i64>().is_err() {
                return Err(invalid("an integer (0 or less disables refresh)").into());
            }
        }
        "timeouts.login_attempts" => {
            if !matches!(value.parse::<u32>(), Ok(n) if n > 0) {
                return Err(invalid("a positive integer").into());
            }
        }
        _ => {
            if !matches!(value.parse::<u64>(), Ok(n) if n > 0) {
                return Err(invalid("a positive integer").into());
            }
        }
    }
    Ok(())
}

/// Apply an already validated `key = value` to the config.
///
/// # Errors
///
/// Returns an error for keys outside the whitelist or unparsable values.
pub fn apply_config_value(config: &mut StratusConfig, key: &str, value: &str) -> Result<()> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    match key {
        "server.url" => config.server.url = Some(value.trim_end_matches('/').to_string()),
        "server.username" => config.server.username = Some(value.to_string()),
        "refresh.interval_secs" => config.refresh.interval_secs = value.parse()?,
        "timeouts.request_secs" => config.timeouts.request_secs = value.parse()?,
        "timeouts.deployment_secs" => config.timeouts.deployment_secs = value.parse()?,
        "timeouts.upload_secs" => config.timeouts.upload_secs = value.parse()?,
        "timeouts.poll_interval_ms" => config.timeouts.poll_interval_ms = value.parse()?,
        "timeouts.login_interval_ms" => config.timeouts.login_interval_ms = value.parse()?,
        "timeouts.login_attempts" => config.timeouts.login_attempts = value.parse()?,
        "proxy.url" => config.proxy.url = Some(value.to_string()),
        "tunnel_app" => config.tunnel_app = value.to_string(),
        _ => anyhow::bail!("Unknown setting: {key}"),
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
