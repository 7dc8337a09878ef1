//! `stratus stop APP` — stop a running application.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::application::services::deploy;
use crate::commands::resolve_module;
use crate::output::JsonRenderer;

/// Arguments for the stop command.
#[derive(Args)]
pub struct StopArgs {
    /// Module id or application name
    pub app: String,
}

/// Run `stratus stop`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved or stopped.
pub async fn run(app: &AppContext, args: &StopArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;
    let result = deploy::stop_module(&conn, &module_id, &app.cancel).await;
    app.save_modules(&conn).await;
    result?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "module": module_id, "status": "stopped" }))?;
    } else {
        app.output.success(&format!("{module_id} stopped"));
    }
    Ok(ExitCode::SUCCESS)
}
