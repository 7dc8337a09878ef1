//! `stratus bind|unbind APP SERVICE` — change an application's services.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::output::JsonRenderer;

/// Arguments for `bind` and `unbind`.
#[derive(Args)]
pub struct BindArgs {
    /// Module id or application name
    pub app: String,

    /// Provisioned service name
    pub service: String,
}

/// Run `stratus bind` (`unbind == false`) or `stratus unbind`.
///
/// # Errors
///
/// Returns an error if the application cannot be resolved or the update
/// fails.
pub async fn run(app: &AppContext, args: &BindArgs, unbind: bool) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;

    let current = conn
        .with_module(&module_id, |m| m.deployment().services.clone())
        .unwrap_or_default();
    let services = edit_services(current, &args.service, unbind);

    let result = app_ops::update_services(&conn, &module_id, services, &app.cancel).await;
    app.save_modules(&conn).await;
    let cloud_app = result?;

    if app.is_json() {
        JsonRenderer::print(&cloud_app)?;
    } else if unbind {
        app.output
            .success(&format!("{} unbound from {}", args.service, cloud_app.name));
    } else {
        app.output
            .success(&format!("{} bound to {}", args.service, cloud_app.name));
    }
    Ok(ExitCode::SUCCESS)
}

fn edit_services(mut services: Vec<String>, service: &str, unbind: bool) -> Vec<String> {
    if unbind {
        services.retain(|s| s != service);
    } else if !services.iter().any(|s| s == service) {
        services.push(service.to_string());
    }
    services
}
