//! Deployment state machine — push, start, restart and stop of one module.
//!
//! A flow walks `Validated → Creating → ContentPushed → Starting →
//! Verifying → Started`. `Stopped` ends a push without a launch mode and
//! `Failed` ends any stage that errors. Each stage has one transition
//! function that returns the next stage.
//!
//! Periodic refresh is paused for the whole flow and restored to its
//! configured interval afterwards, whatever the outcome.

use anyhow::Result;
use chrono::Utc;
use stratus_common::{AppState, CloudApplication, DebugMode, StartingInfo};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{ArchiveProvider, ClientFactory, CloudClient};
use crate::application::services::app_ops::{debug_support, deployed_name};
use crate::application::services::readiness::{Readiness, wait_for_deployed, wait_for_start};
use crate::application::services::retry::RetryPolicy;
use crate::application::services::session::ServerConnection;
use crate::domain::deployment::launch_mode_for;
use crate::domain::{
    ApplicationArchive, ApplicationModule, CachingArchive, CloudError, DebugSupport, DeployError,
    DeploymentInfo, DeploymentWorkingCopy, LaunchMode, ModuleStatus, PublishState, Upload,
    UploadPayload,
};

/// Which entry point started the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Push content (unless externally managed), then launch.
    DeployOrStart,
    /// As `DeployOrStart`, but always with the full archive.
    FullPush,
    /// Launch the existing application without pushing.
    Restart,
}

/// Step of a deployment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validated,
    /// Archive built; application located or created.
    Creating,
    /// Content uploaded and the application visible by name.
    ContentPushed,
    /// Stop and start requests issued.
    Starting,
    /// Waiting for the application to report running.
    Verifying,
    Started,
    Stopped,
    Failed,
}

impl Flow {
    fn pushes(self) -> bool {
        matches!(self, Self::DeployOrStart | Self::FullPush)
    }
}

impl Stage {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Started | Self::Stopped | Self::Failed)
    }
}

/// Result of a completed flow.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub module_id: String,
    /// `Started` or `Stopped`.
    pub stage: Stage,
    /// Last remote view of the application.
    pub app: Option<CloudApplication>,
}

/// The single module a deployment operates on.
///
/// # Errors
///
/// `Validation` for an empty list or more than one module.
pub fn single_module(module_ids: &[String]) -> Result<&str, DeployError> {
    match module_ids {
        [only] => Ok(only.as_str()),
        [] => Err(DeployError::Validation("no module selected".to_string())),
        _ => Err(DeployError::Validation(format!(
            "expected one module, got {}",
            module_ids.len()
        ))),
    }
}

struct Deployment<'a, F: ClientFactory, A> {
    conn: &'a ServerConnection<F>,
    archives: &'a A,
    cancel: &'a CancellationToken,
    flow: Flow,
    module_id: String,
    name: String,
    info: DeploymentInfo,
    external: bool,
    mode: Option<LaunchMode>,
    archive: Option<ApplicationArchive>,
    app: Option<CloudApplication>,
    stage: Stage,
}

impl<'a, F: ClientFactory, A: ArchiveProvider> Deployment<'a, F, A> {
    /// Resolve and validate the module. Nothing remote happens here except
    /// through the completion prompt.
    fn prepare(
        conn: &'a ServerConnection<F>,
        archives: &'a A,
        cancel: &'a CancellationToken,
        flow: Flow,
        module_id: &str,
        mode: Option<LaunchMode>,
    ) -> Result<Self, DeployError> {
        let (mut info, external) = conn
            .modules()
            .get(module_id)
            .map(|m| (m.deployment().clone(), m.external))
            .ok_or_else(|| DeployError::NotFound(module_id.to_string()))?;

        if flow.pushes() {
            let completed = conn
                .prompt()
                .complete_deployment(module_id, &info)
                .ok_or(DeployError::Canceled)?;
            if completed != info {
                conn.with_module(module_id, |m| {
                    m.commit(DeploymentWorkingCopy::from(completed.clone()));
                });
                info = completed;
            }
        }
        info.validate()?;

        let name = info
            .name()
            .map(str::to_string)
            .ok_or_else(|| DeployError::Validation("no deployment name set".to_string()))?;
        let mode = match flow {
            Flow::DeployOrStart | Flow::FullPush => info.mode,
            Flow::Restart => mode,
        };
        Ok(Self {
            conn,
            archives,
            cancel,
            flow,
            module_id: module_id.to_string(),
            name,
            info,
            external,
            mode,
            archive: None,
            app: None,
            stage: Stage::Validated,
        })
    }

    async fn run(&mut self) -> Result<Stage, DeployError> {
        loop {
            let next = match self.stage {
                Stage::Validated => Ok(self.route()),
                Stage::Creating => self.push_content().await,
                Stage::ContentPushed => self.launch().await,
                Stage::Starting => Ok(Stage::Verifying),
                Stage::Verifying => self.verify().await,
                Stage::Started | Stage::Stopped | Stage::Failed => return Ok(self.stage),
            };
            match next {
                Ok(stage) => self.advance(stage),
                Err(e) => {
                    self.advance(Stage::Failed);
                    return Err(e);
                }
            }
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!(module = %self.module_id, from = ?self.stage, to = ?stage, "deployment stage");
        self.stage = stage;
    }

    // ── Transitions ──

    /// Validated: pick the first step of the flow.
    fn route(&self) -> Stage {
        if self.flow.pushes() && !self.external {
            Stage::Creating
        } else {
            Stage::ContentPushed
        }
    }

    /// Build the archive and make sure the application exists, then upload.
    async fn push_content(&mut self) -> Result<Stage, DeployError> {
        self.create().await?;
        self.upload().await?;
        self.confirm_deployed().await?;
        Ok(Stage::ContentPushed)
    }

    async fn create(&mut self) -> Result<(), DeployError> {
        let module = self.module()?;
        self.archive = Some(self.obtain_archive(&module).await?);

        let (conn, cancel, name) = (self.conn, self.cancel, self.name.as_str());
        let apps = conn
            .execute("list applications", RetryPolicy::AuthRetry, cancel, |c| async move {
                c.get_applications().await
            })
            .await?;
        if apps.iter().any(|a| a.name == name) {
            debug!(app = name, "application exists, skipping create");
            return Ok(());
        }

        info!(app = name, memory = self.info.memory, "creating application");
        let info = &self.info;
        conn.execute("create application", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.create_application(name, &info.staging, info.memory, &info.uris, &info.services)
                .await
        })
        .await
    }

    /// Delegate archive first, then an incremental archive, then a full
    /// rebuild. Only the full rebuild is allowed to fail the flow.
    async fn obtain_archive(
        &self,
        module: &ApplicationModule,
    ) -> Result<ApplicationArchive, DeployError> {
        match self.archives.delegate_archive(module).await {
            Ok(Some(archive)) => return Ok(archive),
            Ok(None) => {}
            Err(e) => warn!(module = %self.module_id, error = %e, "delegate archive failed"),
        }
        if self.info.incremental && self.flow != Flow::FullPush {
            if let Some(archive) = self.incremental_archive(module).await {
                return Ok(ApplicationArchive::Incremental(archive));
            }
        }
        self.archives
            .full_archive(module)
            .await
            .map_err(|e| DeployError::Archive(format!("{e:#}")))
    }

    async fn incremental_archive(&self, module: &ApplicationModule) -> Option<CachingArchive> {
        let changed = match self.archives.changed_files(module).await {
            Ok(Some(changed)) => changed,
            Ok(None) => {
                debug!(module = %self.module_id, "change set unknown, rebuilding");
                return None;
            }
            Err(e) => {
                warn!(module = %self.module_id, error = %e, "could not compute changed files");
                return None;
            }
        };
        match self.archives.incremental_archive(module, &changed).await {
            Ok(archive) => archive,
            Err(e) => {
                warn!(module = %self.module_id, error = %e, "incremental archive failed");
                None
            }
        }
    }

    async fn upload(&mut self) -> Result<(), DeployError> {
        let archive = self
            .archive
            .take()
            .ok_or_else(|| DeployError::Archive("no archive was built".to_string()))?;
        let (conn, cancel, name) = (self.conn, self.cancel, self.name.as_str());

        let upload = match archive {
            ApplicationArchive::File(path) => Upload::full(UploadPayload::File(path)),
            ApplicationArchive::Bytes(bytes) => Upload::full(UploadPayload::Bytes(bytes)),
            ApplicationArchive::Incremental(archive) => {
                let fingerprints = archive.fingerprints();
                let matched = conn
                    .execute("match resources", RetryPolicy::AuthRetry, cancel, |c| {
                        let fingerprints = fingerprints.as_slice();
                        async move { c.match_resources(fingerprints).await }
                    })
                    .await?;
                let missing = archive.unmatched(&matched);
                debug!(
                    app = name,
                    cached = matched.len(),
                    sending = missing.len(),
                    "incremental upload"
                );
                Upload {
                    payload: UploadPayload::Entries(missing),
                    resources: matched,
                }
            }
        };

        info!(app = name, "uploading application");
        let upload = &upload;
        conn.execute("upload application", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.upload_application(name, upload).await
        })
        .await
    }

    async fn confirm_deployed(&mut self) -> Result<(), DeployError> {
        let (conn, cancel, name) = (self.conn, self.cancel, self.name.as_str());
        let timeouts = *conn.timeouts();
        let timeouts = &timeouts;
        let readiness = conn
            .execute("confirm upload", RetryPolicy::AuthRetry, cancel, |c| async move {
                wait_for_deployed(c.as_ref(), name, timeouts, cancel).await
            })
            .await?;
        let app = match readiness {
            Readiness::Ready(app) => app,
            Readiness::Canceled => return Err(DeployError::Canceled),
            Readiness::TimedOut => {
                return Err(DeployError::Remote {
                    label: "confirm upload".to_string(),
                    source: CloudError::http(404, format!("application '{name}' not found")),
                });
            }
        };
        conn.with_module(&self.module_id, |m| {
            m.bind_snapshot(app.clone());
            m.publish = PublishState::None;
            m.last_deployed_at = Some(Utc::now());
        });
        self.app = Some(app);
        Ok(())
    }

    /// ContentPushed: stop, then start in the requested mode.
    async fn launch(&mut self) -> Result<Stage, DeployError> {
        let Some(mode) = self.mode else {
            self.conn
                .with_module(&self.module_id, |m| m.status = ModuleStatus::Stopped);
            return Ok(Stage::Stopped);
        };
        let (conn, cancel, name) = (self.conn, self.cancel, self.name.as_str());
        conn.listener().application_about_to_start(&self.module_id);

        if mode == LaunchMode::Debug
            && debug_support(conn, cancel).await? == DebugSupport::Unsupported
        {
            return Err(DeployError::Validation(
                "the server does not support debugging".to_string(),
            ));
        }

        conn.execute("stop application", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.stop_application(name).await
        })
        .await?;

        info!(app = name, ?mode, "starting application");
        let starting: StartingInfo = match mode {
            LaunchMode::Run => {
                conn.execute("start application", RetryPolicy::AuthRetry, cancel, |c| async move {
                    c.start_application(name).await
                })
                .await?
            }
            LaunchMode::Debug => {
                conn.execute("debug application", RetryPolicy::AuthRetry, cancel, |c| async move {
                    c.debug_application(name, DebugMode::Suspend).await
                })
                .await?
            }
        };
        conn.record_starting(&self.module_id, &starting);
        conn.listener()
            .application_starting(&self.module_id, &starting);
        Ok(Stage::Starting)
    }

    /// Verifying: wait until running under the deployment timeout.
    async fn verify(&mut self) -> Result<Stage, DeployError> {
        let (conn, cancel, name) = (self.conn, self.cancel, self.name.as_str());
        let timeouts = *conn.timeouts();
        let until = Instant::now() + timeouts.deployment;
        let policy = RetryPolicy::staging_within(&timeouts, timeouts.deployment);
        let timeouts = &timeouts;

        let readiness = conn
            .execute("wait for start", policy, cancel, |c| async move {
                wait_for_start(c.as_ref(), name, until, timeouts, cancel).await
            })
            .await?;
        match readiness {
            Readiness::Ready(app) => {
                conn.with_module(&self.module_id, |m| {
                    m.bind_snapshot(app.clone());
                    m.status = ModuleStatus::Started;
                    m.last_error = None;
                });
                conn.listener().application_started(&self.module_id);
                info!(app = name, "application started");
                self.app = Some(app);
                Ok(Stage::Started)
            }
            Readiness::TimedOut => Err(DeployError::Timeout {
                name: self.name.clone(),
                timeout: timeouts.deployment,
            }),
            Readiness::Canceled => Err(DeployError::Canceled),
        }
    }

    fn module(&self) -> Result<ApplicationModule, DeployError> {
        self.conn
            .modules()
            .get(&self.module_id)
            .cloned()
            .ok_or_else(|| DeployError::NotFound(self.module_id.clone()))
    }
}

/// Record the outcome of a failed or canceled flow on the module.
fn mark_aborted<F: ClientFactory>(conn: &ServerConnection<F>, module_id: &str, err: &DeployError) {
    conn.with_module(module_id, |m| {
        if err.is_canceled() {
            m.status = ModuleStatus::Unknown;
            m.publish = PublishState::Unknown;
        } else {
            m.fail(err.to_string());
        }
    });
}

async fn drive<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
    flow: Flow,
    module_ids: &[String],
    mode: Option<LaunchMode>,
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    let module_id = single_module(module_ids)?;
    let mut deployment =
        match Deployment::prepare(conn, archives, cancel, flow, module_id, mode) {
            Ok(d) => d,
            Err(e) => {
                mark_aborted(conn, module_id, &e);
                return Err(e);
            }
        };

    let pause = conn.refresh().pause();
    conn.with_module(module_id, |m| m.status = ModuleStatus::Starting);
    let result = deployment.run().await;
    if let Err(e) = &result {
        mark_aborted(conn, module_id, e);
    }
    drop(pause);
    conn.refresh().restore_default();
    let stage = result?;

    if stage == Stage::Started && deployment.mode == Some(LaunchMode::Debug) {
        if let Some(app) = &deployment.app {
            conn.hooks().attach_debugger(module_id, app);
        }
    }
    if conn.is_tunnel_app(&deployment.name) {
        conn.hooks().close_all_tunnels();
    }
    Ok(DeployOutcome {
        module_id: module_id.to_string(),
        stage,
        app: deployment.app,
    })
}

/// Archive provider for flows that never push content.
struct RestartOnly;

impl ArchiveProvider for RestartOnly {
    async fn delegate_archive(
        &self,
        _module: &ApplicationModule,
    ) -> Result<Option<ApplicationArchive>> {
        Ok(None)
    }

    async fn changed_files(&self, _module: &ApplicationModule) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    async fn incremental_archive(
        &self,
        _module: &ApplicationModule,
        _changed: &[String],
    ) -> Result<Option<CachingArchive>> {
        Ok(None)
    }

    async fn full_archive(&self, module: &ApplicationModule) -> Result<ApplicationArchive> {
        anyhow::bail!("restart of '{}' does not push content", module.module_id())
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Push the module's content (unless it is externally managed) and launch
/// it in the mode stored in its deployment info.
///
/// # Errors
///
/// See [`DeployError`]. The module is marked `Failed` on any error except
/// cancellation, which leaves it `Unknown`.
pub async fn deploy_or_start<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
    module_ids: &[String],
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    drive(conn, archives, Flow::DeployOrStart, module_ids, None, cancel).await
}

/// As [`deploy_or_start`], but uploads the full archive even when the
/// module is set up for incremental pushes.
///
/// # Errors
///
/// As for [`deploy_or_start`].
pub async fn redeploy_full<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
    module_ids: &[String],
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    drive(conn, archives, Flow::FullPush, module_ids, None, cancel).await
}

/// Restart without pushing, in the mode the application currently runs in.
///
/// # Errors
///
/// `Validation` without a deployment name, before any remote call.
pub async fn restart<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_ids: &[String],
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    let module_id = single_module(module_ids)?;
    let mode = conn
        .modules()
        .get(module_id)
        .and_then(ApplicationModule::snapshot)
        .map_or(LaunchMode::Run, |s| launch_mode_for(s.app.debug));
    drive(conn, &RestartOnly, Flow::Restart, module_ids, Some(mode), cancel).await
}

/// Restart without pushing, always in debug mode.
///
/// # Errors
///
/// As for [`restart`].
pub async fn restart_debug<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_ids: &[String],
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    drive(
        conn,
        &RestartOnly,
        Flow::Restart,
        module_ids,
        Some(LaunchMode::Debug),
        cancel,
    )
    .await
}

/// Push changed content incrementally and restart. In debug mode a running
/// application is stopped before the push.
///
/// # Errors
///
/// As for [`deploy_or_start`].
pub async fn update_restart<F: ClientFactory, A: ArchiveProvider>(
    conn: &ServerConnection<F>,
    archives: &A,
    module_ids: &[String],
    debug: bool,
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    let module_id = single_module(module_ids)?;
    let mode = if debug { LaunchMode::Debug } else { LaunchMode::Run };
    let running = conn
        .with_module(module_id, |m| {
            let mut copy = m.working_copy();
            copy.set_incremental(true).set_mode(Some(mode));
            m.commit(copy);
            m.snapshot().is_some_and(|s| s.app.state == AppState::Running)
        })
        .ok_or_else(|| DeployError::NotFound(module_id.to_string()))?;
    if debug && running {
        stop_module(conn, module_id, cancel).await?;
    }
    drive(conn, archives, Flow::DeployOrStart, module_ids, None, cancel).await
}

/// Stop the module's application.
///
/// # Errors
///
/// `Validation` without a deployment name; otherwise the executor's error,
/// after which the module status is `Unknown`.
pub async fn stop_module<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    let name = deployed_name(conn, module_id)?;
    let _pause = conn.refresh().pause();
    conn.with_module(module_id, |m| m.status = ModuleStatus::Stopping);

    let result = conn
        .execute("stop application", RetryPolicy::AuthRetry, cancel, |c| {
            let name = name.as_str();
            async move { c.stop_application(name).await }
        })
        .await;
    match &result {
        Ok(()) => {
            conn.with_module(module_id, |m| m.status = ModuleStatus::Stopped);
            conn.listener().application_stopped(module_id);
            if conn.is_tunnel_app(&name) {
                conn.hooks().close_all_tunnels();
            }
            info!(app = %name, "application stopped");
        }
        Err(e) => {
            warn!(app = %name, error = %e, "stop failed");
            conn.with_module(module_id, |m| m.status = ModuleStatus::Unknown);
        }
    }
    result
}
