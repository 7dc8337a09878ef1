//! Per-server connection context.
//!
//! `ServerConnection` owns everything scoped to one control-plane connection:
//! the authenticated client, the URL lookup and debug-support caches, the
//! visible server status, the tracked modules and the refresh schedule.
//! Nothing here is global; a connection is created on connect and dropped on
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use stratus_common::{CloudApplication, StartingInfo};
use tokio::sync::watch;

use crate::application::ports::{
    ClientFactory, CredentialPrompt, DeploymentListener, LifecycleHooks,
};
use crate::domain::config::TimeoutConfig;
use crate::domain::{
    ApplicationModule, ApplicationUrlLookup, Credentials, DebugSupport, DeploymentInfo,
    ModuleRecord, PublishState, ServerState, ServerStatus, StratusConfig, TrackedModuleSet,
};

// ── Timeouts ──────────────────────────────────────────────────────────────────

/// Delay before the first readiness check and between post-create polls.
pub const SHORT_INTERVAL: Duration = Duration::from_secs(5);
/// Readiness poll resolution.
pub const ONE_SECOND: Duration = Duration::from_secs(1);

/// Independent timeouts per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Staging-aware and stopped-state-aware retry deadline.
    pub request: Duration,
    /// Readiness wait after a start.
    pub deployment: Duration,
    /// Post-create existence confirmation.
    pub upload: Duration,
    pub poll_interval: Duration,
    pub login_interval: Duration,
    pub login_attempts: u32,
    pub short_interval: Duration,
    pub readiness_interval: Duration,
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(cfg: &TimeoutConfig) -> Self {
        Self {
            request: Duration::from_secs(cfg.request_secs),
            deployment: Duration::from_secs(cfg.deployment_secs),
            upload: Duration::from_secs(cfg.upload_secs),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            login_interval: Duration::from_millis(cfg.login_interval_ms),
            login_attempts: cfg.login_attempts.max(1),
            short_interval: SHORT_INTERVAL,
            readiness_interval: ONE_SECOND,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

// ── Refresh schedule ──────────────────────────────────────────────────────────

/// Current setting of the periodic module refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSetting {
    /// `None` disables periodic refresh.
    pub interval: Option<Duration>,
    /// Number of outstanding pauses.
    pub paused: u32,
}

impl RefreshSetting {
    #[must_use]
    pub fn active_interval(&self) -> Option<Duration> {
        if self.paused == 0 { self.interval } else { None }
    }
}

/// Shared schedule observed by the periodic refresh task.
#[derive(Debug)]
pub struct RefreshSchedule {
    tx: watch::Sender<RefreshSetting>,
    default_interval: Option<Duration>,
}

impl RefreshSchedule {
    #[must_use]
    pub fn new(interval: Option<Duration>) -> Self {
        let (tx, _rx) = watch::channel(RefreshSetting {
            interval,
            paused: 0,
        });
        Self {
            tx,
            default_interval: interval,
        }
    }

    #[must_use]
    pub fn current(&self) -> RefreshSetting {
        *self.tx.borrow()
    }

    /// Periodic refresh is configured and not paused.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current().active_interval().is_some()
    }

    /// Change the interval; `None` disables periodic refresh.
    pub fn set_interval(&self, interval: Option<Duration>) {
        self.tx.send_modify(|s| s.interval = interval);
    }

    /// Go back to the configured interval.
    pub fn restore_default(&self) {
        self.set_interval(self.default_interval);
    }

    /// Suspend periodic refresh until the returned guard is dropped.
    #[must_use = "refresh resumes as soon as the guard is dropped"]
    pub fn pause(&self) -> RefreshPause<'_> {
        self.tx.send_modify(|s| s.paused += 1);
        RefreshPause { schedule: self }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RefreshSetting> {
        self.tx.subscribe()
    }
}

/// Keeps periodic refresh paused while alive.
#[derive(Debug)]
pub struct RefreshPause<'a> {
    schedule: &'a RefreshSchedule,
}

impl Drop for RefreshPause<'_> {
    fn drop(&mut self) {
        self.schedule
            .tx
            .send_modify(|s| s.paused = s.paused.saturating_sub(1));
    }
}

// ── Default collaborators ─────────────────────────────────────────────────────

/// Prompt used when nobody can answer: no credentials, drafts unchanged.
pub struct NonInteractivePrompt;

impl CredentialPrompt for NonInteractivePrompt {
    fn credentials(&self, _server_url: &str) -> Option<Credentials> {
        None
    }

    fn complete_deployment(
        &self,
        _module_id: &str,
        draft: &DeploymentInfo,
    ) -> Option<DeploymentInfo> {
        Some(draft.clone())
    }
}

/// Listener and hooks that ignore every notification.
pub struct Silent;

impl DeploymentListener for Silent {}
impl LifecycleHooks for Silent {}

// ── Connection ────────────────────────────────────────────────────────────────

/// Mutable session state guarded by one async mutex; only the executor and
/// the session reset paths touch it.
pub(super) struct SessionState<C> {
    pub(super) client: Option<Arc<C>>,
    pub(super) url_lookup: Option<ApplicationUrlLookup>,
    pub(super) debug_support: DebugSupport,
}

impl<C> Default for SessionState<C> {
    fn default() -> Self {
        Self {
            client: None,
            url_lookup: None,
            debug_support: DebugSupport::Unchecked,
        }
    }
}

/// Settings for a new connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub timeouts: Timeouts,
    pub refresh_interval: Option<Duration>,
    pub proxy: Option<String>,
    pub tunnel_app: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_config(&StratusConfig::default())
    }
}

impl ConnectionOptions {
    #[must_use]
    pub fn from_config(config: &StratusConfig) -> Self {
        Self {
            timeouts: Timeouts::from(&config.timeouts),
            refresh_interval: config.refresh.interval(),
            proxy: config.proxy.url.clone(),
            tunnel_app: config.tunnel_app.clone(),
        }
    }
}

/// Context for one server connection.
pub struct ServerConnection<F: ClientFactory> {
    pub(super) url: String,
    pub(super) factory: F,
    pub(super) credentials: Mutex<Option<Credentials>>,
    pub(super) session: tokio::sync::Mutex<SessionState<F::Client>>,
    pub(super) proxy: Mutex<Option<String>>,
    status: Mutex<ServerStatus>,
    modules: Mutex<TrackedModuleSet>,
    prompt: Arc<dyn CredentialPrompt>,
    listener: Arc<dyn DeploymentListener>,
    hooks: Arc<dyn LifecycleHooks>,
    timeouts: Timeouts,
    tunnel_app: String,
    refresh: RefreshSchedule,
}

impl<F: ClientFactory> ServerConnection<F> {
    #[must_use]
    pub fn new(url: impl Into<String>, factory: F, options: ConnectionOptions) -> Self {
        Self {
            url: url.into(),
            factory,
            credentials: Mutex::new(None),
            session: tokio::sync::Mutex::new(SessionState::default()),
            proxy: Mutex::new(options.proxy),
            status: Mutex::new(ServerStatus::default()),
            modules: Mutex::new(TrackedModuleSet::new()),
            prompt: Arc::new(NonInteractivePrompt),
            listener: Arc::new(Silent),
            hooks: Arc::new(Silent),
            timeouts: options.timeouts,
            tunnel_app: options.tunnel_app,
            refresh: RefreshSchedule::new(options.refresh_interval),
        }
    }

    #[must_use]
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        *self.credentials.lock() = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn DeploymentListener>) -> Self {
        self.listener = listener;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    #[must_use]
    pub fn refresh(&self) -> &RefreshSchedule {
        &self.refresh
    }

    #[must_use]
    pub fn listener(&self) -> &dyn DeploymentListener {
        self.listener.as_ref()
    }

    #[must_use]
    pub fn hooks(&self) -> &dyn LifecycleHooks {
        self.hooks.as_ref()
    }

    #[must_use]
    pub fn prompt(&self) -> &dyn CredentialPrompt {
        self.prompt.as_ref()
    }

    /// Whether `app_name` is the application that proxies tunnels.
    #[must_use]
    pub fn is_tunnel_app(&self, app_name: &str) -> bool {
        app_name == self.tunnel_app
    }

    // ── Status ──

    #[must_use]
    pub fn status(&self) -> ServerStatus {
        *self.status.lock()
    }

    pub fn set_server_state(&self, state: ServerState) {
        self.status.lock().state = state;
    }

    pub fn set_publish_state(&self, publish: PublishState) {
        self.status.lock().publish = publish;
    }

    /// Move a stopped server to `Starting`. Returns whether it moved.
    pub(super) fn begin_starting(&self) -> bool {
        let mut status = self.status.lock();
        if status.state.is_down() {
            status.state = ServerState::Starting;
            true
        } else {
            false
        }
    }

    // ── Credentials and session ──

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.lock().is_some()
    }

    /// Replace credentials; the session and its caches are dropped.
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock() = Some(credentials);
        self.reset_session().await;
    }

    /// Drop the client and every per-session cache.
    pub async fn reset_session(&self) {
        *self.session.lock().await = SessionState::default();
    }

    /// Change the outbound proxy; applied before the next remote call.
    pub fn set_proxy(&self, proxy: Option<String>) {
        *self.proxy.lock() = proxy;
    }

    /// The URL lookup populated by the first successful call of this session.
    pub async fn cached_url_lookup(&self) -> Option<ApplicationUrlLookup> {
        self.session.lock().await.url_lookup.clone()
    }

    // ── Modules ──

    /// Lock the tracked module set. Never hold the guard across an await.
    pub fn modules(&self) -> MutexGuard<'_, TrackedModuleSet> {
        self.modules.lock()
    }

    /// Run `f` against one tracked module.
    pub fn with_module<R>(
        &self,
        module_id: &str,
        f: impl FnOnce(&mut ApplicationModule) -> R,
    ) -> Option<R> {
        self.modules.lock().get_mut(module_id).map(f)
    }

    /// Bind a remote view to a module, if still tracked.
    pub fn bind_snapshot(&self, module_id: &str, app: CloudApplication) {
        self.with_module(module_id, |m| m.bind_snapshot(app));
    }

    pub(super) fn record_starting(&self, module_id: &str, info: &StartingInfo) {
        self.with_module(module_id, |m| m.starting_info = Some(info.clone()));
    }

    /// Track modules loaded from the module store. Records that collide
    /// with an already tracked module are skipped.
    pub fn load_records(&self, records: Vec<ModuleRecord>) {
        let mut modules = self.modules.lock();
        for record in records {
            let id = record.module_id.clone();
            if let Err(e) = modules.insert(ApplicationModule::from_record(record)) {
                tracing::warn!(module = %id, error = %e, "skipping stored module");
            }
        }
    }

    /// Persistable records for every tracked module.
    #[must_use]
    pub fn records(&self) -> Vec<ModuleRecord> {
        self.modules
            .lock()
            .modules()
            .map(ApplicationModule::to_record)
            .collect()
    }
}
