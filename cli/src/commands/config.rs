//! `stratus config` — show and set configuration values.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::domain::config::apply_config_value;
use crate::output::{HumanRenderer, JsonRenderer};

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the key or value is invalid or the file cannot be
/// read or written.
pub fn run(app: &AppContext, cmd: ConfigCommand) -> Result<ExitCode> {
    match cmd {
        ConfigCommand::Show => show_config(app),
        ConfigCommand::Set { key, value } => set_config(app, &key, &value),
    }
}

fn show_config(app: &AppContext) -> Result<ExitCode> {
    let config = app.config()?;
    let path = app.config_store.path()?;
    if app.is_json() {
        JsonRenderer::print(&json!({ "path": path, "config": config }))?;
    } else {
        HumanRenderer::new(&app.output).render_config(&config, &path);
    }
    Ok(ExitCode::SUCCESS)
}

fn set_config(app: &AppContext, key: &str, value: &str) -> Result<ExitCode> {
    let mut config = app.config()?;
    apply_config_value(&mut config, key, value)?;
    app.config_store.save(&config)?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "key": key, "value": value }))?;
    } else {
        app.output.success(&format!("Set {key} = {value}"));
    }
    Ok(ExitCode::SUCCESS)
}
