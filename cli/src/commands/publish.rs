//! `stratus publish` — push every tracked module with pending changes.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::publish::{self, PublishKind};
use crate::output::{HumanRenderer, JsonRenderer};

/// Arguments for the publish command.
#[derive(Args)]
pub struct PublishArgs {
    /// Re-upload full archives instead of changed files only
    #[arg(long)]
    pub clean: bool,
}

/// Run `stratus publish`.
///
/// Per-module failures are reported and make the command exit with 1;
/// they do not stop the remaining modules.
///
/// # Errors
///
/// Returns an error if the connection fails or the run is canceled.
pub async fn run(app: &AppContext, args: &PublishArgs) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let kind = if args.clean {
        PublishKind::Clean
    } else {
        PublishKind::Incremental
    };
    let result = publish::publish(&conn, &app.archiver, kind, &app.cancel).await;
    app.save_modules(&conn).await;
    let report = result?;

    if app.is_json() {
        JsonRenderer::render_publish(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_publish(&report);
    }
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
