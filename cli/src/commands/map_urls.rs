//! `stratus map APP URL...` — replace the URLs mapped to an application.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::output::JsonRenderer;

/// Arguments for the map command.
#[derive(Args)]
pub struct MapArgs {
    /// Module id or application name
    pub app: String,

    /// URLs to map; pass none to unmap everything
    pub urls: Vec<String>,
}

/// Run `stratus map`.
///
/// # Errors
///
/// Returns an error if a URL is not under a known domain or the update
/// fails.
pub async fn run(app: &AppContext, args: &MapArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;

    let lookup = app_ops::url_lookup(&conn, &app.cancel).await?;
    let uris = args
        .urls
        .iter()
        .map(|u| lookup.validate(u).map(|v| v.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    let result = app_ops::update_uris(&conn, &module_id, uris, &app.cancel).await;
    app.save_modules(&conn).await;
    let cloud_app = result?;

    if app.is_json() {
        JsonRenderer::print(&cloud_app)?;
    } else if cloud_app.uris.is_empty() {
        app.output.success(&format!("{} has no URLs", cloud_app.name));
    } else {
        app.output.success(&format!("{} mapped", cloud_app.name));
        for uri in &cloud_app.uris {
            app.output.kv("url:", uri);
        }
    }
    Ok(ExitCode::SUCCESS)
}
