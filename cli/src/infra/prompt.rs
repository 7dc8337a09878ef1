//! Infrastructure implementation of the `CredentialPrompt` port.
//!
//! Credentials come from the environment first and the terminal second.
//! Prompt failures (no TTY, Ctrl-C inside a prompt) read as "no answer".

use dialoguer::{Input, Password};
use tracing::debug;

use crate::application::ports::CredentialPrompt;
use crate::domain::deployment::DEFAULT_MEMORY_MB;
use crate::domain::{Credentials, DeploymentInfo};

/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "STRATUS_PASSWORD";

/// Terminal prompt backed by `dialoguer`.
pub struct TerminalPrompt {
    username: Option<String>,
    interactive: bool,
}

impl TerminalPrompt {
    #[must_use]
    pub fn new(username: Option<String>, interactive: bool) -> Self {
        Self {
            username,
            interactive,
        }
    }

    fn ask_username(&self) -> Option<String> {
        if let Some(user) = self.username.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(user.clone());
        }
        if !self.interactive {
            return None;
        }
        Input::<String>::new()
            .with_prompt("Email")
            .interact_text()
            .ok()
    }

    fn ask_password(&self) -> Option<String> {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            return Some(password);
        }
        if !self.interactive {
            return None;
        }
        Password::new().with_prompt("Password").interact().ok()
    }
}

/// Read a password to set, from `STRATUS_PASSWORD` or a confirmed prompt.
#[must_use]
pub fn choose_password(interactive: bool) -> Option<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Some(password);
    }
    if !interactive {
        return None;
    }
    Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .ok()
}

impl CredentialPrompt for TerminalPrompt {
    fn credentials(&self, server_url: &str) -> Option<Credentials> {
        debug!(url = server_url, "asking for credentials");
        let username = self.ask_username()?;
        let password = self.ask_password()?;
        Some(Credentials::new(username, password))
    }

    fn complete_deployment(&self, module_id: &str, draft: &DeploymentInfo) -> Option<DeploymentInfo> {
        if !self.interactive {
            return Some(draft.clone());
        }
        let mut copy = draft.working_copy();
        if draft.name().is_none() {
            let name: String = Input::new()
                .with_prompt("Application name")
                .default(module_id.to_string())
                .interact_text()
                .ok()?;
            copy.set_name(name);
        }
        if draft.memory == 0 {
            let memory: u32 = Input::new()
                .with_prompt("Memory (MB)")
                .default(DEFAULT_MEMORY_MB)
                .interact_text()
                .ok()?;
            copy.set_memory(memory);
        }
        Some(copy.into_info())
    }
}
