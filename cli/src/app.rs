//! Per-invocation state shared by all command handlers.
//!
//! `AppContext` owns the output context, the stores and the cancellation
//! token of the running command. Commands that talk to a server build their
//! `ServerConnection` through it so every connection is wired the same way.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::application::ports::{ConfigStore, ModuleStore};
use crate::application::services::app_ops;
use crate::application::services::session::{ConnectionOptions, ServerConnection};
use crate::domain::{ConfigError, StratusConfig};
use crate::infra::archive::DirectoryArchiver;
use crate::infra::cloud_client::HttpClientFactory;
use crate::infra::config::YamlConfigStore;
use crate::infra::prompt::TerminalPrompt;
use crate::infra::state::JsonModuleStore;
use crate::output::{ConsoleEvents, OutputContext};

/// Connection type used by every command.
pub type Connection = ServerConnection<HttpClientFactory>;

/// Human tables or one JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Global `--no-color`, `--quiet` and `--json`.
pub struct OutputFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
}

/// Global flags that change how commands interact.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `STRATUS_YES` env vars).
    pub yes: bool,
}

/// Top-level flags, split out of the clap parser.
pub struct AppFlags {
    pub output: OutputFlags,
    pub behaviour: BehaviourFlags,
}

/// Everything a command needs besides its own arguments.
pub struct AppContext {
    pub output: OutputContext,
    pub mode: OutputMode,
    pub config_store: YamlConfigStore,
    /// Tracked modules per server.
    pub module_store: JsonModuleStore,
    pub archiver: DirectoryArchiver,
    /// Prompts answer with their defaults (`--yes`, `CI` or `STRATUS_YES`).
    pub non_interactive: bool,
    /// Fired on Ctrl-C.
    pub cancel: CancellationToken,
}

impl AppContext {
    /// Build the context for one invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new(flags: &AppFlags, cancel: CancellationToken) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("STRATUS_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            mode,
            config_store: YamlConfigStore,
            module_store: JsonModuleStore::new()?,
            archiver: DirectoryArchiver::new()?,
            non_interactive,
            cancel,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `STRATUS_YES` env),
    /// returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }

    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn config(&self) -> Result<StratusConfig> {
        self.config_store.load()
    }

    /// Build a connection to the configured server with its tracked modules
    /// loaded. Nothing is sent to the server yet.
    ///
    /// # Errors
    ///
    /// Returns an error when no server is configured or the module file is
    /// unreadable.
    pub async fn connection(&self) -> Result<Arc<Connection>> {
        let config = self.config()?;
        let url = config.server.url.clone().ok_or(ConfigError::NoServer)?;
        let events = Arc::new(ConsoleEvents::new(&self.output));
        let prompt = TerminalPrompt::new(config.server.username.clone(), !self.non_interactive);

        let conn = ServerConnection::new(
            url.clone(),
            HttpClientFactory,
            ConnectionOptions::from_config(&config),
        )
        .with_prompt(Arc::new(prompt))
        .with_listener(events.clone())
        .with_hooks(events);
        conn.load_records(self.module_store.load_modules(&url).await?);
        Ok(Arc::new(conn))
    }

    /// Build a connection and log in, refreshing the tracked modules.
    ///
    /// # Errors
    ///
    /// As for [`Self::connection`], plus login and refresh failures.
    pub async fn connect(&self) -> Result<Arc<Connection>> {
        let conn = self.connection().await?;
        app_ops::connect(&conn, &self.cancel).await?;
        Ok(conn)
    }

    /// Persist the connection's tracked modules. Failures are reported but
    /// never fail the command that already succeeded remotely.
    pub async fn save_modules(&self, conn: &Connection) {
        if let Err(e) = self
            .module_store
            .save_modules(conn.url(), &conn.records())
            .await
        {
            warn!(error = %e, "could not save tracked modules");
            self.output
                .warn(&format!("Could not save tracked modules: {e:#}"));
        }
    }
}
