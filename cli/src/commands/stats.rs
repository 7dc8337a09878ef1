//! `stratus stats APP` — per-instance resource usage.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::output::{HumanRenderer, JsonRenderer, progress};

/// Arguments for the stats command.
#[derive(Args)]
pub struct StatsArgs {
    /// Module id or application name
    pub app: String,
}

/// Run `stratus stats`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved or the stats
/// request fails.
pub async fn run(app: &AppContext, args: &StatsArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;

    let pb = progress::maybe_spinner(&app.output, "Reading instance stats...");
    let result = app_ops::refresh_module_stats(&conn, &module_id, &app.cancel).await;
    progress::finish_clear(pb);
    let snapshot = result?;

    if app.is_json() {
        JsonRenderer::print(&snapshot)?;
    } else {
        HumanRenderer::new(&app.output).render_stats(&snapshot);
    }
    Ok(ExitCode::SUCCESS)
}
