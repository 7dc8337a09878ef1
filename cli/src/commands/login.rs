//! `stratus login` / `stratus logout` — select a server and authenticate.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::app_ops;
use crate::domain::ConfigError;
use crate::domain::config::apply_config_value;
use crate::output::JsonRenderer;

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Control-plane URL (defaults to the configured server)
    pub url: Option<String>,

    /// Account email
    #[arg(long)]
    pub email: Option<String>,
}

/// Run `stratus login`.
///
/// Saves the server and email to the config file, then logs in and
/// refreshes the tracked modules. The password is never stored.
///
/// # Errors
///
/// Returns an error if no server is known, the config cannot be saved, or
/// login fails.
pub async fn run(app: &AppContext, args: &LoginArgs) -> Result<ExitCode> {
    let mut config = app.config()?;
    if let Some(url) = &args.url {
        apply_config_value(&mut config, "server.url", url)?;
    }
    if let Some(email) = &args.email {
        apply_config_value(&mut config, "server.username", email)?;
    }
    if config.server.url.is_none() {
        return Err(ConfigError::NoServer.into());
    }
    app.config_store.save(&config)?;

    let conn = app.connect().await?;
    app.save_modules(&conn).await;

    let tracked = conn.modules().len();
    if app.is_json() {
        JsonRenderer::print(&json!({
            "url": conn.url(),
            "status": conn.status(),
            "modules": tracked,
        }))?;
    } else {
        app.output.success(&format!("Logged in to {}", conn.url()));
        app.output.kv("applications:", &tracked.to_string());
    }
    Ok(ExitCode::SUCCESS)
}

/// Run `stratus logout`: forget the stored email and drop the session.
///
/// # Errors
///
/// Returns an error if the config cannot be read or saved.
pub async fn logout(app: &AppContext) -> Result<ExitCode> {
    let mut config = app.config()?;
    let Some(url) = config.server.url.clone() else {
        app.output.info("Not logged in.");
        return Ok(ExitCode::SUCCESS);
    };

    let conn = app.connection().await?;
    app_ops::disconnect(&conn).await;
    config.server.username = None;
    app.config_store.save(&config)?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "url": url, "status": conn.status() }))?;
    } else {
        app.output.success(&format!("Logged out of {url}"));
    }
    Ok(ExitCode::SUCCESS)
}
