//! `stratus marketplace` — list service offerings.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::output::{HumanRenderer, JsonRenderer};

/// Run `stratus marketplace`.
///
/// # Errors
///
/// Returns an error if the offerings cannot be read.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let offerings = app_ops::service_offerings(&conn, &app.cancel).await?;
    if app.is_json() {
        JsonRenderer::print(&offerings)?;
    } else {
        HumanRenderer::new(&app.output).render_offerings(&offerings);
    }
    Ok(ExitCode::SUCCESS)
}
