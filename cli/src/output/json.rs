//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document on
//! stdout. Failures use the error object from [`format_error`].

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use stratus_common::CloudApplication;

use crate::application::services::deploy::{DeployOutcome, Stage};
use crate::application::services::publish::PublishReport;
use crate::domain::ApplicationModule;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Renders command results as JSON documents.
pub struct JsonRenderer;

impl JsonRenderer {
    /// Print any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("JSON serialization failed")?
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_apps<'m>(
        modules: impl IntoIterator<Item = &'m ApplicationModule>,
        external: &[CloudApplication],
    ) -> Result<()> {
        let modules: Vec<_> = modules.into_iter().collect();
        Self::print(&json!({ "modules": modules, "external": external }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_outcome(outcome: &DeployOutcome) -> Result<()> {
        let stage = match outcome.stage {
            Stage::Started => "started",
            _ => "stopped",
        };
        Self::print(&json!({
            "module": outcome.module_id,
            "stage": stage,
            "app": outcome.app,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_publish(report: &PublishReport) -> Result<()> {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(id, err)| json!({ "module": id, "message": err.to_string() }))
            .collect();
        Self::print(&json!({ "published": report.published, "failed": failed }))
    }
}
