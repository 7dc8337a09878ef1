//! Readiness polling for applications that were just started or created.
//!
//! Both waits observe the cancellation token at every iteration and use
//! `tokio::time`, so tests can drive them with a paused clock.

use std::time::Duration;

use stratus_common::{AppState, CloudApplication};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::application::ports::CloudClient;
use crate::application::services::session::Timeouts;
use crate::domain::CloudError;

/// Result of a readiness wait. Running out of time is not an error here.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready(CloudApplication),
    TimedOut,
    Canceled,
}

/// Returns `true` when canceled before `duration` elapsed.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}

/// Wait until `name` reports running, or `until` passes.
///
/// Sleeps the short interval first so the platform can begin the
/// transition, then polls once per readiness interval.
///
/// # Errors
///
/// Propagates control-plane failures; the caller's retry policy decides
/// whether they are transient.
pub async fn wait_for_start<C: CloudClient>(
    client: &C,
    name: &str,
    until: Instant,
    timeouts: &Timeouts,
    cancel: &CancellationToken,
) -> Result<Readiness, CloudError> {
    let first = timeouts
        .short_interval
        .min(until.saturating_duration_since(Instant::now()));
    if pause(first, cancel).await {
        return Ok(Readiness::Canceled);
    }
    loop {
        if cancel.is_cancelled() {
            return Ok(Readiness::Canceled);
        }
        let app = client.get_application(name).await?;
        if app.state == AppState::Running {
            return Ok(Readiness::Ready(app));
        }
        debug!(app = name, state = %app.state, "waiting for application to run");
        let now = Instant::now();
        if now >= until {
            return Ok(Readiness::TimedOut);
        }
        if pause(timeouts.readiness_interval.min(until - now), cancel).await {
            return Ok(Readiness::Canceled);
        }
    }
}

/// Wait until a freshly created application resolves by name.
///
/// "Not found" answers are expected while the creation propagates and are
/// retried until the upload timeout.
///
/// # Errors
///
/// Propagates control-plane failures other than 404.
pub async fn wait_for_deployed<C: CloudClient>(
    client: &C,
    name: &str,
    timeouts: &Timeouts,
    cancel: &CancellationToken,
) -> Result<Readiness, CloudError> {
    let deadline = Instant::now() + timeouts.upload;
    loop {
        if cancel.is_cancelled() {
            return Ok(Readiness::Canceled);
        }
        match client.get_application(name).await {
            Ok(app) if app.name == name => return Ok(Readiness::Ready(app)),
            Ok(other) => debug!(expected = name, got = %other.name, "name not resolved yet"),
            Err(e) if e.is_not_found() => debug!(app = name, "application not visible yet"),
            Err(e) => return Err(e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Readiness::TimedOut);
        }
        if pause(timeouts.short_interval.min(deadline - now), cancel).await {
            return Ok(Readiness::Canceled);
        }
    }
}
