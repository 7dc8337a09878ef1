//! `stratus logs APP` — print the staging log of an application.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::output::{HumanRenderer, JsonRenderer};

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Module id or application name
    pub app: String,

    /// Byte offset to start reading from
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

/// Run `stratus logs`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved or the log
/// request fails.
pub async fn run(app: &AppContext, args: &LogsArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;
    let chunk = app_ops::staging_log(&conn, &module_id, args.offset, &app.cancel).await?;

    if app.is_json() {
        JsonRenderer::print(&json!({ "module": module_id, "offset": args.offset, "log": chunk }))?;
    } else {
        HumanRenderer::new(&app.output).render_log(chunk.as_deref());
    }
    Ok(ExitCode::SUCCESS)
}
