//! Version command

use std::process::ExitCode;

use anyhow::Result;
use serde_json::json;

use crate::app::AppContext;
use crate::output::{HumanRenderer, JsonRenderer};

/// Run the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(app: &AppContext) -> Result<ExitCode> {
    let version = env!("CARGO_PKG_VERSION");
    if app.is_json() {
        JsonRenderer::print(&json!({ "version": version }))?;
    } else {
        HumanRenderer::new(&app.output).render_version(version);
    }
    Ok(ExitCode::SUCCESS)
}
