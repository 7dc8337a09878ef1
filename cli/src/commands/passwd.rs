//! `stratus passwd` — change the password of the logged in account.

use std::process::ExitCode;

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::services::app_ops;
use crate::infra::prompt::choose_password;

/// Run `stratus passwd`.
///
/// Logs in with the current password first. The new password is read with
/// confirmation and is not stored.
///
/// # Errors
///
/// Returns an error if login fails, no new password is provided, or the
/// server rejects the change.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let conn = app.connect().await?;
    let password = choose_password(!app.non_interactive)
        .context("A new password is required (set STRATUS_PASSWORD or run interactively)")?;
    app_ops::update_password(&conn, &password, &app.cancel).await?;
    app.output.success("Password changed");
    Ok(ExitCode::SUCCESS)
}
