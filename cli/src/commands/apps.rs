//! `stratus apps` — list tracked modules and untracked applications.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::{AppContext, Connection};
use crate::application::services::reconcile;
use crate::domain::ApplicationModule;
use crate::output::{HumanRenderer, JsonRenderer};

/// Arguments for the apps command.
#[derive(Args)]
pub struct AppsArgs {
    /// Keep refreshing on the configured interval until interrupted
    #[arg(long)]
    pub watch: bool,
}

/// Run `stratus apps`.
///
/// # Errors
///
/// Returns an error if the server cannot be reached.
pub async fn run(app: &AppContext, args: &AppsArgs) -> Result<ExitCode> {
    anyhow::ensure!(!(args.watch && app.is_json()), "--watch cannot be combined with --json");
    let conn = app.connect().await?;
    app.save_modules(&conn).await;
    render(app, &conn)?;

    if !args.watch {
        return Ok(ExitCode::SUCCESS);
    }
    let Some(interval) = conn.refresh().current().active_interval() else {
        anyhow::bail!("Periodic refresh is disabled. Set refresh.interval_secs to watch.");
    };

    let task = reconcile::spawn_periodic_refresh(conn.clone(), app.cancel.clone());
    loop {
        tokio::select! {
            () = app.cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                println!();
                render(app, &conn)?;
            }
        }
    }
    let _ = task.await;
    app.save_modules(&conn).await;
    Ok(ExitCode::SUCCESS)
}

fn render(app: &AppContext, conn: &Connection) -> Result<()> {
    let (modules, external): (Vec<ApplicationModule>, Vec<_>) = {
        let set = conn.modules();
        (set.modules().cloned().collect(), set.external().cloned().collect())
    };
    if app.is_json() {
        JsonRenderer::render_apps(&modules, &external)?;
    } else {
        HumanRenderer::new(&app.output).render_apps(&modules, &external);
    }
    Ok(())
}
