//! Command implementations

pub mod apps;
pub mod bind;
pub mod config;
pub mod delete;
pub mod domains;
pub mod login;
pub mod logs;
pub mod map_urls;
pub mod marketplace;
pub mod passwd;
pub mod publish;
pub mod push;
pub mod register;
pub mod scale;
pub mod services;
pub mod start;
pub mod stats;
pub mod stop;
pub mod version;

use crate::app::Connection;
use crate::application::services::app_ops;
use crate::domain::DeployError;

/// Resolve a command-line application reference to a tracked module id.
///
/// Accepts a module id or a remote application name. An application that
/// exists remotely but is not tracked yet is adopted as an external module.
///
/// # Errors
///
/// Returns `NotFound` when neither a module nor a remote application
/// matches.
pub fn resolve_module(conn: &Connection, app: &str) -> Result<String, DeployError> {
    {
        let modules = conn.modules();
        if modules.get(app).is_some() {
            return Ok(app.to_string());
        }
        if let Some(module) = modules.by_app_name(app) {
            return Ok(module.module_id().to_string());
        }
    }
    app_ops::track_external(conn, app)
}

