//! Server connection state visible to the user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::module::PublishState;

/// Connection state of a server as shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
    Unknown,
}

impl ServerState {
    /// Not connected, or on the way down.
    #[must_use]
    pub fn is_down(self) -> bool {
        matches!(self, Self::Stopped | Self::Stopping)
    }
}

/// Visible state plus publish state for one server.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ServerStatus {
    pub state: ServerState,
    pub publish: PublishState,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            state: ServerState::Stopped,
            publish: PublishState::None,
        }
    }
}

/// Whether the server allows starting applications in debug mode. Checked
/// lazily once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSupport {
    #[default]
    Unchecked,
    Supported,
    Unsupported,
}

/// Login credentials for one server. The password is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
