//! `stratus scale APP` — change instance count or memory.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use stratus_common::CloudApplication;

use crate::app::{AppContext, Connection};
use crate::application::services::app_ops;
use crate::commands::resolve_module;
use crate::domain::DeployError;
use crate::output::JsonRenderer;

/// Arguments for the scale command.
#[derive(Args)]
pub struct ScaleArgs {
    /// Module id or application name
    pub app: String,

    /// Number of instances
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub instances: Option<u32>,

    /// Memory per instance in megabytes
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub memory: Option<u32>,
}

/// Run `stratus scale`.
///
/// # Errors
///
/// Returns an error if neither option is given or the update fails.
pub async fn run(app: &AppContext, args: &ScaleArgs) -> Result<ExitCode> {
    anyhow::ensure!(
        args.instances.is_some() || args.memory.is_some(),
        "Nothing to change. Pass --instances and/or --memory."
    );
    let conn = app.connect().await?;
    let module_id = resolve_module(&conn, &args.app)?;

    let result = scale(app, &conn, &module_id, args).await;
    app.save_modules(&conn).await;

    if let Some(cloud_app) = result? {
        if app.is_json() {
            JsonRenderer::print(&cloud_app)?;
        } else {
            app.output.success(&format!(
                "{}: {} instance(s), {}M",
                cloud_app.name, cloud_app.instances, cloud_app.memory
            ));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn scale(
    app: &AppContext,
    conn: &Connection,
    module_id: &str,
    args: &ScaleArgs,
) -> Result<Option<CloudApplication>, DeployError> {
    let mut latest = None;
    if let Some(instances) = args.instances {
        latest = Some(app_ops::update_instances(conn, module_id, instances, &app.cancel).await?);
    }
    if let Some(memory) = args.memory {
        latest = Some(app_ops::update_memory(conn, module_id, memory, &app.cancel).await?);
    }
    Ok(latest)
}
