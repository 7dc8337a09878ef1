//! `stratus domains` — list domains applications can be mapped under.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::output::{HumanRenderer, JsonRenderer};

/// Arguments for the domains command.
#[derive(Args)]
pub struct DomainsArgs {
    /// List organization-wide domains instead of the space's
    #[arg(long)]
    pub org: bool,
}

/// Run `stratus domains`.
///
/// # Errors
///
/// Returns an error if the domains cannot be read.
pub async fn run(app: &AppContext, args: &DomainsArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let domains = if args.org {
        app_ops::org_domains(&conn, &app.cancel).await?
    } else {
        app_ops::space_domains(&conn, &app.cancel).await?
    };
    if app.is_json() {
        JsonRenderer::print(&domains)?;
    } else {
        HumanRenderer::new(&app.output).render_domains(&domains);
    }
    Ok(ExitCode::SUCCESS)
}
