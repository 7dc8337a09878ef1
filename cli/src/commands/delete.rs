//! `stratus delete APP...` — remove applications from the server.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::output::JsonRenderer;

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Module ids or application names
    #[arg(required = true)]
    pub apps: Vec<String>,

    /// Also delete the services bound to the applications
    #[arg(long)]
    pub services: bool,
}

/// Run `stratus delete`.
///
/// # Errors
///
/// Returns an error if an application cannot be resolved or a deletion
/// fails.
pub async fn run(app: &AppContext, args: &DeleteArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let ids = args
        .apps
        .iter()
        .map(|a| resolve_module(&conn, a))
        .collect::<Result<Vec<_>, _>>()?;

    let what = if args.services {
        "and their bound services "
    } else {
        ""
    };
    if !app.confirm(&format!("Delete {} {what}?", ids.join(", ")), false)? {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let result = app_ops::delete_modules(&conn, &ids, args.services, &app.cancel).await;
    app.save_modules(&conn).await;
    let deleted = result?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "deleted": deleted }))?;
    } else {
        for name in &deleted {
            app.output.success(&format!("{name} deleted"));
        }
    }
    Ok(ExitCode::SUCCESS)
}
