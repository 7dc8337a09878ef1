//! `stratus push [PATH]` — upload a project directory and start it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::{AppContext, Connection};
use crate::application::ports::ProgressReporter;
use crate::application::services::{app_ops, deploy};
use crate::domain::deployment::DEFAULT_MEMORY_MB;
use crate::domain::{ApplicationModule, DeploymentInfo, LaunchMode};
use crate::output::{HumanRenderer, JsonRenderer, TerminalReporter};

/// Arguments for the push command.
#[derive(Args, Default)]
pub struct PushArgs {
    /// Project directory to upload
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Remote application name (defaults to the directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Memory per instance in megabytes
    #[arg(long)]
    pub memory: Option<u32>,

    /// Map a URL to the application (repeatable)
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Bind a provisioned service (repeatable)
    #[arg(long = "service")]
    pub services: Vec<String>,

    /// Start command passed to the stager
    #[arg(long)]
    pub command: Option<String>,

    /// Upload only, do not start
    #[arg(long, conflicts_with = "debug")]
    pub no_start: bool,

    /// Start in debug mode
    #[arg(long)]
    pub debug: bool,

    /// Upload only files the server does not already have
    #[arg(long)]
    pub incremental: bool,
}

impl PushArgs {
    fn mode(&self) -> Option<LaunchMode> {
        if self.no_start {
            None
        } else if self.debug {
            Some(LaunchMode::Debug)
        } else {
            Some(LaunchMode::Run)
        }
    }
}

/// Run `stratus push`.
///
/// # Errors
///
/// Returns an error if the directory is unusable, the connection fails, or
/// the deployment does not reach a terminal success stage.
pub async fn run(app: &AppContext, args: &PushArgs) -> Result<ExitCode> {
    let path = std::fs::canonicalize(&args.path)
        .with_context(|| format!("project directory {}", args.path.display()))?;
    anyhow::ensure!(path.is_dir(), "{} is not a directory", path.display());

    let conn = app.connect().await?;
    let reporter = TerminalReporter::new(&app.output);

    let module_id = prepare_module(&conn, app, args, &path).await?;
    reporter.step(&format!("Pushing {} from {}", module_id, path.display()));

    let result = deploy::deploy_or_start(
        &conn,
        &app.archiver,
        std::slice::from_ref(&module_id),
        &app.cancel,
    )
    .await;
    app.save_modules(&conn).await;
    let outcome = result?;

    if app.is_json() {
        JsonRenderer::render_outcome(&outcome)?;
    } else {
        HumanRenderer::new(&app.output).render_outcome(&outcome);
    }
    Ok(ExitCode::SUCCESS)
}

/// Find the module for `path`, creating and tracking it on first push, and
/// apply the command-line overrides to its deployment.
async fn prepare_module(
    conn: &Connection,
    app: &AppContext,
    args: &PushArgs,
    path: &Path,
) -> Result<String> {
    let existing = conn
        .modules()
        .modules()
        .find(|m| m.project_path() == Some(path))
        .map(|m| m.module_id().to_string());

    let module_id = match existing {
        Some(id) => id,
        None => {
            let id = match &args.name {
                Some(name) => name.clone(),
                None => dir_name(path)?,
            };
            let mut deployment = DeploymentInfo {
                deployment_name: Some(id.clone()),
                memory: DEFAULT_MEMORY_MB,
                ..DeploymentInfo::default()
            };
            if args.urls.is_empty() {
                let lookup = app_ops::url_lookup(conn, &app.cancel).await?;
                if let Some(url) = lookup.suggest(&id) {
                    deployment.uris.push(url.to_string());
                }
            }
            app_ops::track_module(
                conn,
                ApplicationModule::new(id.clone(), deployment).with_project_path(path.to_path_buf()),
            )?;
            id
        }
    };

    let uris = if args.urls.is_empty() {
        None
    } else {
        let lookup = app_ops::url_lookup(conn, &app.cancel).await?;
        let validated = args
            .urls
            .iter()
            .map(|u| lookup.validate(u).map(|v| v.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Some(validated)
    };

    conn.with_module(&module_id, |m| {
        let mut copy = m.working_copy();
        if let Some(name) = &args.name {
            copy.set_name(name.clone());
        }
        if let Some(memory) = args.memory {
            copy.set_memory(memory);
        }
        if let Some(uris) = uris {
            copy.set_uris(uris);
        }
        if !args.services.is_empty() {
            copy.set_services(args.services.clone());
        }
        if let Some(command) = &args.command {
            let mut staging = copy.pending().staging.clone();
            staging.command = Some(command.clone());
            copy.set_staging(staging);
        }
        copy.set_mode(args.mode()).set_incremental(args.incremental);
        m.commit(copy);
    });
    Ok(module_id)
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive an application name from {}", path.display()))
}
