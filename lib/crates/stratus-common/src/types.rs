use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of an application as reported by the control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    /// Instances are up. Older control planes report this as `STARTED`.
    #[serde(alias = "STARTED")]
    Running,
    Stopped,
    /// The platform is applying a change (staging, scaling).
    Updating,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Updating => "updating",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Debug launch mode for an application started under a debugger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebugMode {
    /// Debugger port is open; the application runs without waiting.
    Run,
    /// The application pauses on entry until a debugger attaches.
    Suspend,
}

impl DebugMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Suspend => "suspend",
        }
    }
}

/// Error returned when parsing an unknown debug mode string.
#[derive(Debug, Error)]
#[error("unknown debug mode '{0}' (expected 'run' or 'suspend')")]
pub struct ParseDebugModeError(pub String);

impl FromStr for DebugMode {
    type Err = ParseDebugModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Self::Run),
            "suspend" => Ok(Self::Suspend),
            other => Err(ParseDebugModeError(other.to_string())),
        }
    }
}

/// Staging descriptor: how the platform should build and run the content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Staging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildpack_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// An application as returned by `GET /apps` and `GET /apps/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudApplication {
    pub name: String,
    #[serde(default)]
    pub state: AppState,
    #[serde(default)]
    pub instances: u32,
    #[serde(default)]
    pub running_instances: u32,
    /// Memory per instance in megabytes.
    #[serde(default)]
    pub memory: u32,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub staging: Staging,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugMode>,
}

impl CloudApplication {
    /// Minimal application record, mostly useful for tests and fixtures.
    #[must_use]
    pub fn new(name: impl Into<String>, state: AppState) -> Self {
        Self {
            name: name.into(),
            state,
            instances: 1,
            running_instances: u32::from(state == AppState::Running),
            memory: 0,
            uris: Vec::new(),
            services: Vec::new(),
            staging: Staging::default(),
            debug: None,
        }
    }
}

/// Returned by a start request; points at the staging log of this start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_file: Option<String>,
}

/// State of a single application instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Running,
    Starting,
    Crashed,
    Flapping,
    Down,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Resource usage for one running instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStats {
    pub id: String,
    #[serde(default)]
    pub state: InstanceState,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem_bytes: u64,
    #[serde(default)]
    pub disk_bytes: u64,
    #[serde(default)]
    pub uptime_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApplicationStats {
    #[serde(default)]
    pub records: Vec<InstanceStats>,
}

/// Placement information for one instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub index: u32,
    #[serde(default)]
    pub state: InstanceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstancesInfo {
    #[serde(default)]
    pub instances: Vec<InstanceInfo>,
}

/// A routable domain applications may use for their URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CloudDomain {
    pub name: String,
}

/// Marketplace entry describing a provisionable service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOffering {
    pub label: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A provisioned service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudService {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Result of `GET /info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CloudInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub allow_debug: bool,
    #[serde(default)]
    pub support_url: Option<String>,
}

/// Fingerprint of one archive entry, sent before an incremental upload so the
/// control plane can answer which files it already holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceFingerprint {
    #[serde(rename = "fn")]
    pub path: String,
    pub sha256: String,
    pub size: u64,
}
