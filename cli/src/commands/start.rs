//! `stratus start|restart|debug APP` — (re)launch a pushed application.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::deploy::{self, DeployOutcome};
use crate::commands::resolve_module;
use crate::output::{HumanRenderer, JsonRenderer};

/// Arguments for `start` and `debug`.
#[derive(Args)]
pub struct StartArgs {
    /// Module id or application name
    pub app: String,

    /// Start in debug mode
    #[arg(long)]
    pub debug: bool,
}

/// Arguments for `restart`.
#[derive(Args)]
pub struct RestartArgs {
    /// Module id or application name
    pub app: String,

    /// Upload changed files before restarting
    #[arg(long)]
    pub update: bool,

    /// Restart in debug mode
    #[arg(long)]
    pub debug: bool,
}

/// Run `stratus start`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved or does not
/// start.
pub async fn run_start(app: &AppContext, args: &StartArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let ids = vec![resolve_module(&conn, &args.app)?];
    let result = if args.debug {
        deploy::restart_debug(&conn, &ids, &app.cancel).await
    } else {
        deploy::restart(&conn, &ids, &app.cancel).await
    };
    app.save_modules(&conn).await;
    render(app, &result?)
}

/// Run `stratus restart`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved, the update
/// upload fails, or the application does not start.
pub async fn run_restart(app: &AppContext, args: &RestartArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let ids = vec![resolve_module(&conn, &args.app)?];
    let result = match (args.update, args.debug) {
        (true, debug) => {
            deploy::update_restart(&conn, &app.archiver, &ids, debug, &app.cancel).await
        }
        (false, true) => deploy::restart_debug(&conn, &ids, &app.cancel).await,
        (false, false) => deploy::restart(&conn, &ids, &app.cancel).await,
    };
    app.save_modules(&conn).await;
    render(app, &result?)
}

fn render(app: &AppContext, outcome: &DeployOutcome) -> Result<ExitCode> {
    if app.is_json() {
        JsonRenderer::render_outcome(outcome)?;
    } else {
        HumanRenderer::new(&app.output).render_outcome(outcome);
    }
    Ok(ExitCode::SUCCESS)
}
