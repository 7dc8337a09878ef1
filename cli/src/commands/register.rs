//! `stratus register EMAIL` — create an account on the server.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::app_ops;
use crate::domain::ConfigError;
use crate::domain::config::apply_config_value;
use crate::infra::cloud_client::HttpClientFactory;
use crate::infra::prompt::choose_password;
use crate::output::JsonRenderer;

/// Arguments for the register command.
#[derive(Args)]
pub struct RegisterArgs {
    /// Email of the new account
    pub email: String,

    /// Control-plane URL (defaults to the configured server)
    #[arg(long)]
    pub url: Option<String>,
}

/// Run `stratus register`.
///
/// # Errors
///
/// Returns an error if no server is known, no password is provided, or the
/// server rejects the registration.
pub async fn run(app: &AppContext, args: &RegisterArgs) -> Result<ExitCode> {
    let mut config = app.config()?;
    if let Some(url) = &args.url {
        apply_config_value(&mut config, "server.url", url)?;
    }
    let url = config.server.url.clone().ok_or(ConfigError::NoServer)?;
    let password = choose_password(!app.non_interactive)
        .context("A password is required (set STRATUS_PASSWORD or run interactively)")?;

    app_ops::register_account(&HttpClientFactory, &url, &args.email, &password).await?;

    apply_config_value(&mut config, "server.username", &args.email)?;
    app.config_store.save(&config)?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "url": url, "email": args.email }))?;
    } else {
        app.output
            .success(&format!("Registered {} on {url}", args.email));
        app.output.info("Log in: stratus login");
    }
    Ok(ExitCode::SUCCESS)
}
