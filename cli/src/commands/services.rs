//! `stratus services` — list, create and delete provisioned services.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use stratus_common::CloudService;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::output::{HumanRenderer, JsonRenderer};

/// Services subcommands.
#[derive(Subcommand)]
pub enum ServicesCommand {
    /// List provisioned services
    List,
    /// Provision a service from the marketplace
    Create {
        /// Offering label, e.g. `postgresql`
        label: String,
        /// Name of the new service
        name: String,
        /// Plan to provision
        #[arg(long)]
        plan: Option<String>,
        /// Offering version
        #[arg(long = "offering-version")]
        offering_version: Option<String>,
    },
    /// Delete provisioned services
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

/// Run the services command.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn run(app: &AppContext, cmd: ServicesCommand) -> Result<ExitCode> {
    let conn = app.connect().await?;
    match cmd {
        ServicesCommand::List => {
            let services = app_ops::list_services(&conn, &app.cancel).await?;
            if app.is_json() {
                JsonRenderer::print(&services)?;
            } else {
                HumanRenderer::new(&app.output).render_services(&services);
            }
        }
        ServicesCommand::Create {
            label,
            name,
            plan,
            offering_version,
        } => {
            let service = CloudService {
                name,
                label: Some(label),
                plan,
                version: offering_version,
            };
            app_ops::create_service(&conn, &service, &app.cancel).await?;
            if app.is_json() {
                JsonRenderer::print(&service)?;
            } else {
                app.output.success(&format!("Service {} created", service.name));
            }
        }
        ServicesCommand::Delete { names } => {
            if !app.confirm(&format!("Delete {}?", names.join(", ")), false)? {
                app.output.info("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }
            app_ops::delete_services_by_name(&conn, &names, &app.cancel).await?;
            if app.is_json() {
                JsonRenderer::print(&json!({ "deleted": names }))?;
            } else {
                for name in &names {
                    app.output.success(&format!("Service {name} deleted"));
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
