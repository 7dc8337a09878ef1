//! Module reconciler: keeps tracked modules in step with the server's
//! application list, on demand and on a periodic schedule.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{ClientFactory, CloudClient};
use crate::application::services::retry::RetryPolicy;
use crate::application::services::session::ServerConnection;
use crate::domain::{DeployError, ReconcileReport};

/// Fetch every application once and rebuild the module association.
///
/// # Errors
///
/// Returns the executor's error when the application list cannot be read.
pub async fn refresh_modules<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<ReconcileReport, DeployError> {
    let apps = conn
        .execute("refresh applications", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.get_applications().await
        })
        .await?;
    let report = conn.modules().reconcile(apps);
    debug!(
        updated = report.updated.len(),
        cleared = report.cleared.len(),
        external = report.external.len(),
        "modules reconciled"
    );
    conn.listener().server_refreshed();
    Ok(report)
}

/// Spawn the periodic refresh task for `conn`.
///
/// The task sleeps for the active interval and refreshes, re-reading the
/// schedule whenever it changes. A paused or disabled schedule idles until
/// it is changed again. The task stops when `cancel` fires.
pub fn spawn_periodic_refresh<F: ClientFactory>(
    conn: Arc<ServerConnection<F>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut schedule = conn.refresh().subscribe();
        loop {
            let setting = *schedule.borrow_and_update();
            match setting.active_interval() {
                Some(interval) => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        changed = schedule.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        () = tokio::time::sleep(interval) => {
                            if let Err(e) = refresh_modules(&conn, &cancel).await {
                                if e.is_canceled() {
                                    break;
                                }
                                warn!(error = %e, "periodic refresh failed");
                            }
                        }
                    }
                }
                None => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        changed = schedule.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!(url = %conn.url(), "periodic refresh stopped");
    })
}
