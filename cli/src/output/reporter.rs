//! Presentation-layer implementations of the progress and notification
//! ports.
//!
//! `TerminalReporter` wraps `&OutputContext` for synchronous progress
//! messages. `ConsoleEvents` is owned (it is shared with the connection as
//! `Arc<dyn ..>`) and prints deployment notifications as they arrive.

use owo_colors::OwoColorize as _;
use stratus_common::{CloudApplication, StartingInfo};
use tracing::debug;

use crate::application::ports::{DeploymentListener, LifecycleHooks, ProgressReporter};
use crate::output::{OutputContext, Styles};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ! {message}"` (suppressed when `ctx.quiet`)
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
        }
    }

    fn success(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "✓".style(self.ctx.styles.success));
        }
    }

    fn warn(&self, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", "!".style(self.ctx.styles.warning));
        }
    }
}

/// Prints deployment notifications and lifecycle hooks to stderr, keeping
/// stdout free for command results.
#[derive(Clone)]
pub struct ConsoleEvents {
    styles: Styles,
    quiet: bool,
}

impl ConsoleEvents {
    #[must_use]
    pub fn new(ctx: &OutputContext) -> Self {
        Self {
            styles: ctx.styles.clone(),
            quiet: ctx.quiet,
        }
    }

    fn line(&self, marker: &str, message: &str) {
        if !self.quiet {
            eprintln!("  {} {message}", marker.style(self.styles.dim));
        }
    }
}

impl DeploymentListener for ConsoleEvents {
    fn application_about_to_start(&self, module_id: &str) {
        self.line("→", &format!("Starting {module_id}"));
    }

    fn application_starting(&self, module_id: &str, info: &StartingInfo) {
        match &info.staging_file {
            Some(file) => self.line("→", &format!("{module_id} staging (log: {file})")),
            None => self.line("→", &format!("{module_id} staging")),
        }
    }

    fn application_stopped(&self, module_id: &str) {
        self.line("■", &format!("{module_id} stopped"));
    }

    fn server_refreshed(&self) {
        debug!("server refreshed");
    }
}

impl LifecycleHooks for ConsoleEvents {
    fn attach_debugger(&self, module_id: &str, app: &CloudApplication) {
        let mode = app.debug.map_or("suspend", |m| m.as_str());
        self.line(
            "⚙",
            &format!("{module_id} is waiting for a debugger ({mode}); see `stratus stats {}`", app.name),
        );
    }

    fn close_all_tunnels(&self) {
        debug!("no tunnels open");
    }

    fn close_tunnel(&self, service: &str) {
        debug!(service, "no tunnel open");
    }
}
