//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use thiserror::Error;

// ── Control-plane errors ──────────────────────────────────────────────────────

/// CF error code returned while an application is still staging.
pub const CODE_STAGING_NOT_FINISHED: u32 = 170_002;
/// CF error code returned when a mutation hits an application that is stopped.
pub const CODE_APP_STOPPED: u32 = 200_003;

/// A failure reported by the control-plane client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
    #[error("control plane returned {status}: {description}")]
    Http {
        status: u16,
        code: Option<u32>,
        description: String,
    },

    #[error("control plane unreachable: {0}")]
    Transport(String),
}

impl CloudError {
    /// Build an HTTP error without a platform error code.
    #[must_use]
    pub fn http(status: u16, description: impl Into<String>) -> Self {
        Self::Http {
            status,
            code: None,
            description: description.into(),
        }
    }

    /// HTTP status, if the failure came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// 401 or 403: the session expired or the credentials were rejected.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Recognized transient failures that a poll-retry policy may wait out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientSignature {
    /// The application has been started but staging has not completed.
    StagingNotFinished,
    /// The application was rejected for being in the stopped state.
    AppStopped,
}

impl TransientSignature {
    /// Whether `err` carries this signature.
    #[must_use]
    pub fn matches(self, err: &CloudError) -> bool {
        let CloudError::Http {
            code, description, ..
        } = err
        else {
            return false;
        };
        let description = description.to_ascii_lowercase();
        match self {
            Self::StagingNotFinished => {
                *code == Some(CODE_STAGING_NOT_FINISHED)
                    || description.contains("staging not finished")
                    || description.contains("not finished staging")
            }
            Self::AppStopped => {
                *code == Some(CODE_APP_STOPPED) || description.contains("stopped state")
            }
        }
    }
}

// ── Deployment errors ─────────────────────────────────────────────────────────

/// Errors surfaced by deployment and application operations.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Invalid deployment: {0}")]
    Validation(String),

    #[error("Module '{0}' is not tracked on this server.")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{label} failed: {source}")]
    Remote {
        label: String,
        #[source]
        source: CloudError,
    },

    #[error("Application '{name}' did not start within {}s.", timeout.as_secs())]
    Timeout { name: String, timeout: Duration },

    #[error("Operation canceled.")]
    Canceled,

    #[error("Could not build application archive: {0}")]
    Archive(String),
}

impl DeployError {
    /// Cancellation is reported to users as information, not failure.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// The wrapped control-plane error, when this is a remote failure.
    #[must_use]
    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Module errors ─────────────────────────────────────────────────────────────

/// Errors related to tracking local modules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("Module '{0}' is already tracked.")]
    AlreadyTracked(String),

    #[error("Application name '{name}' is already used by module '{existing}'.")]
    NameInUse { name: String, existing: String },
}

// ── URL errors ────────────────────────────────────────────────────────────────

/// Errors raised when validating an application URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Application URL is empty.")]
    Empty,

    #[error("No domain of this space matches '{0}'.")]
    UnknownDomain(String),

    #[error("Invalid host '{0}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidHost(String),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nValid values: {valid}")]
    InvalidValue {
        key: String,
        value: String,
        valid: String,
    },

    #[error("No server configured. Run 'stratus login <url>' first.")]
    NoServer,
}
