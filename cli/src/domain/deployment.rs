//! Deployment descriptors and their validation.
//!
//! A `DeploymentInfo` is never edited in place. Callers take a
//! [`DeploymentWorkingCopy`], change it, and hand it back to the owning
//! module which swaps the whole value.

use serde::{Deserialize, Serialize};
use stratus_common::{DebugMode, Staging};

use crate::domain::error::DeployError;

/// Memory assigned to new applications when none is given.
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// How an application should be launched after it is pushed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Run,
    Debug,
}

/// What should be pushed and started for one module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeploymentInfo {
    /// Remote application name. `None` until the user picks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    /// Memory per instance in megabytes.
    #[serde(default)]
    pub memory: u32,
    #[serde(default)]
    pub uris: Vec<String>,
    /// Names of services bound to the application.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub staging: Staging,
    /// `None` pushes the content without starting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LaunchMode>,
    #[serde(default)]
    pub incremental: bool,
}

impl DeploymentInfo {
    /// Deployment name, if set and non-blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.deployment_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Validate before any deploy operation runs against this info.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Validation` when the name is missing, memory is
    /// zero, or a bound service name is blank.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.name().is_none() {
            return Err(DeployError::Validation(
                "no deployment name set".to_string(),
            ));
        }
        if self.memory == 0 {
            return Err(DeployError::Validation(
                "memory must be greater than 0 MB".to_string(),
            ));
        }
        if self.services.iter().any(|s| s.trim().is_empty()) {
            return Err(DeployError::Validation(
                "bound service names must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.mode == Some(LaunchMode::Debug)
    }

    /// Start an edit of this info.
    #[must_use]
    pub fn working_copy(&self) -> DeploymentWorkingCopy {
        DeploymentWorkingCopy { info: self.clone() }
    }
}

/// Mutable copy of a `DeploymentInfo` awaiting commit.
#[derive(Debug, Clone)]
pub struct DeploymentWorkingCopy {
    info: DeploymentInfo,
}

impl DeploymentWorkingCopy {
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.info.deployment_name = Some(name.into());
        self
    }

    pub fn set_memory(&mut self, memory: u32) -> &mut Self {
        self.info.memory = memory;
        self
    }

    pub fn set_uris(&mut self, uris: Vec<String>) -> &mut Self {
        self.info.uris = uris;
        self
    }

    pub fn set_services(&mut self, services: Vec<String>) -> &mut Self {
        self.info.services = services;
        self
    }

    pub fn set_staging(&mut self, staging: Staging) -> &mut Self {
        self.info.staging = staging;
        self
    }

    pub fn set_mode(&mut self, mode: Option<LaunchMode>) -> &mut Self {
        self.info.mode = mode;
        self
    }

    pub fn set_incremental(&mut self, incremental: bool) -> &mut Self {
        self.info.incremental = incremental;
        self
    }

    /// Read the pending values.
    #[must_use]
    pub fn pending(&self) -> &DeploymentInfo {
        &self.info
    }

    /// Finish the edit, producing the replacement value.
    #[must_use]
    pub fn into_info(self) -> DeploymentInfo {
        self.info
    }
}

impl From<DeploymentInfo> for DeploymentWorkingCopy {
    /// Wrap a complete replacement, e.g. one returned by a prompt.
    fn from(info: DeploymentInfo) -> Self {
        Self { info }
    }
}

/// Launch mode implied by a remote debug flag.
#[must_use]
pub fn launch_mode_for(debug: Option<DebugMode>) -> LaunchMode {
    if debug.is_some() {
        LaunchMode::Debug
    } else {
        LaunchMode::Run
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
