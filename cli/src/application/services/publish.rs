//! Server-wide publish: redeploy every module that needs it.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{ArchiveProvider, ClientFactory};
use crate::application::services::deploy::{deploy_or_start, redeploy_full};
use crate::application::services::session::ServerConnection;
use crate::domain::{ApplicationModule, DeployError, PublishState};

/// Which modules a publish covers and how their content is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishKind {
    /// Every module that is not externally managed, with full archives.
    Clean,
    /// Modules with a remote application whose content is not up to date.
    Incremental,
}

/// Per-module outcome of a publish.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub published: Vec<String>,
    pub failed: Vec<(String, DeployError)>,
}

impl PublishReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Module ids a publish of `kind` would redeploy.
#[must_use]
pub fn publish_candidates<F: ClientFactory>(
    conn: &ServerConnection<F>,
    kind: PublishKind,
) -> Vec<String> {
    conn.modules()
        .modules()
        .filter(|m| !m.external)
        .filter(|m| match kind {
            PublishKind::Clean => true,
            PublishKind::Incremental => {
                m.snapshot().is_some() && m.publish != PublishState::None
            }
        })
        .map(|m| m.module_id().to_string())
        .collect()
}

/// Flag up-to-date modules whose local files changed since their last push.
/// An unknown change set means the whole module is republished.
pub async fn mark_changed<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
) {
    let up_to_date: Vec<ApplicationModule> = conn
        .modules()
        .modules()
        .filter(|m| !m.external && m.publish == PublishState::None)
        .cloned()
        .collect();
    for module in up_to_date {
        let state = match archives.changed_files(&module).await {
            Ok(Some(changed)) if changed.is_empty() => continue,
            Ok(Some(_)) => PublishState::Incremental,
            Ok(None) => PublishState::Full,
            Err(e) => {
                warn!(module = module.module_id(), error = %e, "could not compute changed files");
                PublishState::Unknown
            }
        };
        debug!(module = module.module_id(), ?state, "module has unpublished changes");
        conn.with_module(module.module_id(), |m| m.publish = state);
    }
}

/// Redeploy the candidates one at a time. A failing module does not stop
/// the others; cancellation does.
///
/// # Errors
///
/// Only `Canceled` is returned as an error; other failures are collected
/// in the report.
pub async fn publish<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
    kind: PublishKind,
    cancel: &CancellationToken,
) -> Result<PublishReport, DeployError> {
    let mut report = PublishReport::default();
    if kind == PublishKind::Incremental {
        mark_changed(conn, archives).await;
    }
    for module_id in publish_candidates(conn, kind) {
        let ids = [module_id.clone()];
        let result = match kind {
            PublishKind::Clean => redeploy_full(conn, archives, &ids, cancel).await,
            PublishKind::Incremental => deploy_or_start(conn, archives, &ids, cancel).await,
        };
        match result {
            Ok(_) => report.published.push(module_id),
            Err(DeployError::Canceled) => return Err(DeployError::Canceled),
            Err(e) => {
                warn!(module = %module_id, error = %e, "publish failed");
                report.failed.push((module_id, e));
            }
        }
    }
    if report.is_success() {
        conn.set_publish_state(PublishState::None);
    }
    info!(
        ?kind,
        published = report.published.len(),
        failed = report.failed.len(),
        "publish finished"
    );
    Ok(report)
}
