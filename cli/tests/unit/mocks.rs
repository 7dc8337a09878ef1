//! Shared mock infrastructure for unit tests.
//!
//! `MockServer` is an in-memory control plane. Every client the factory
//! hands out shares it, records each call by operation name and can be
//! scripted to fail the next N calls of an operation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use stratus_cli::application::ports::{
    ArchiveProvider, ClientFactory, CloudClient, CredentialPrompt, DeploymentListener,
    LifecycleHooks,
};
use stratus_cli::application::services::session::{ConnectionOptions, ServerConnection};
use stratus_cli::domain::error::CODE_STAGING_NOT_FINISHED;
use stratus_cli::domain::{
    ApplicationArchive, ApplicationModule, ArchiveEntry, CachingArchive, CloudError, Credentials,
    DeploymentInfo, Upload,
};
use stratus_common::{
    AppState, ApplicationStats, CloudApplication, CloudDomain, CloudInfo, CloudService, DebugMode,
    InstancesInfo, ResourceFingerprint, ServiceOffering, Staging, StartingInfo,
};

pub const SERVER_URL: &str = "https://api.example.com";
pub const STAGING_FILE: &str = "logs/staging.log";

// ── Errors ────────────────────────────────────────────────────────────────────

pub fn forbidden() -> CloudError {
    CloudError::http(403, "token expired")
}

pub fn not_found() -> CloudError {
    CloudError::http(404, "not found")
}

pub fn staging_not_finished() -> CloudError {
    CloudError::Http {
        status: 400,
        code: Some(CODE_STAGING_NOT_FINISHED),
        description: "staging not finished".to_string(),
    }
}

// ── Mock control plane ────────────────────────────────────────────────────────

/// What a start request does to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehaviour {
    /// The application is running by the next read.
    Runs,
    /// The application stays stopped forever.
    NeverRuns,
    /// Every read fails with "staging not finished".
    NeverStages,
}

pub struct MockServer {
    apps: Mutex<BTreeMap<String, CloudApplication>>,
    services: Mutex<Vec<CloudService>>,
    domains: Mutex<Vec<CloudDomain>>,
    info: Mutex<CloudInfo>,
    cached: Mutex<HashSet<String>>,
    staging: Mutex<HashSet<String>>,
    start: Mutex<StartBehaviour>,
    failures: Mutex<HashMap<&'static str, VecDeque<CloudError>>>,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Upload>>,
    proxies: Mutex<Vec<Option<String>>>,
    pub clients_created: AtomicUsize,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            apps: Mutex::new(BTreeMap::new()),
            services: Mutex::new(Vec::new()),
            domains: Mutex::new(vec![CloudDomain {
                name: "apps.example.com".to_string(),
            }]),
            info: Mutex::new(CloudInfo {
                allow_debug: true,
                ..CloudInfo::default()
            }),
            cached: Mutex::new(HashSet::new()),
            staging: Mutex::new(HashSet::new()),
            start: Mutex::new(StartBehaviour::Runs),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            proxies: Mutex::new(Vec::new()),
            clients_created: AtomicUsize::new(0),
        })
    }

    pub fn with_app(self: &Arc<Self>, app: CloudApplication) -> Arc<Self> {
        self.apps.lock().insert(app.name.clone(), app);
        Arc::clone(self)
    }

    pub fn set_start(&self, behaviour: StartBehaviour) {
        *self.start.lock() = behaviour;
    }

    pub fn set_allow_debug(&self, allow: bool) {
        self.info.lock().allow_debug = allow;
    }

    /// Pretend the server already caches the file at `path`.
    pub fn cache(&self, path: &str) {
        self.cached.lock().insert(path.to_string());
    }

    pub fn add_service(&self, name: &str) {
        self.services.lock().push(CloudService {
            name: name.to_string(),
            label: Some("postgresql".to_string()),
            plan: None,
            version: None,
        });
    }

    /// Fail the next call of `op` with `err`. Repeatable.
    pub fn fail_next(&self, op: &'static str, err: CloudError) {
        self.failures.lock().entry(op).or_default().push_back(err);
    }

    pub fn app(&self, name: &str) -> Option<CloudApplication> {
        self.apps.lock().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == op).count()
    }

    /// Calls other than the domain lookup the executor issues on its own.
    pub fn requests(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "get_domains")
            .collect()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().clone()
    }

    pub fn proxies(&self) -> Vec<Option<String>> {
        self.proxies.lock().clone()
    }

    fn record(&self, op: &'static str) -> Result<(), CloudError> {
        self.calls.lock().push(op.to_string());
        match self.failures.lock().get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn launch(&self, name: &str, debug: Option<DebugMode>) -> Result<StartingInfo, CloudError> {
        let mut apps = self.apps.lock();
        let app = apps.get_mut(name).ok_or_else(not_found)?;
        match *self.start.lock() {
            StartBehaviour::Runs => {
                app.state = AppState::Running;
                app.running_instances = app.instances;
            }
            StartBehaviour::NeverRuns => app.state = AppState::Stopped,
            StartBehaviour::NeverStages => {
                app.state = AppState::Updating;
                self.staging.lock().insert(name.to_string());
            }
        }
        app.debug = debug;
        Ok(StartingInfo {
            staging_file: Some(STAGING_FILE.to_string()),
        })
    }

    fn modify(
        &self,
        name: &str,
        f: impl FnOnce(&mut CloudApplication),
    ) -> Result<(), CloudError> {
        let mut apps = self.apps.lock();
        let app = apps.get_mut(name).ok_or_else(not_found)?;
        f(app);
        Ok(())
    }
}

pub struct MockClient {
    server: Arc<MockServer>,
}

impl CloudClient for MockClient {
    async fn login(&self) -> Result<(), CloudError> {
        self.server.record("login")
    }

    async fn info(&self) -> Result<CloudInfo, CloudError> {
        self.server.record("info")?;
        Ok(self.server.info.lock().clone())
    }

    async fn get_application(&self, name: &str) -> Result<CloudApplication, CloudError> {
        self.server.record("get_application")?;
        if self.server.staging.lock().contains(name) {
            return Err(staging_not_finished());
        }
        self.server.app(name).ok_or_else(not_found)
    }

    async fn get_applications(&self) -> Result<Vec<CloudApplication>, CloudError> {
        self.server.record("get_applications")?;
        Ok(self.server.apps.lock().values().cloned().collect())
    }

    async fn create_application(
        &self,
        name: &str,
        staging: &Staging,
        memory: u32,
        uris: &[String],
        services: &[String],
    ) -> Result<(), CloudError> {
        self.server.record("create_application")?;
        let mut app = CloudApplication::new(name, AppState::Stopped);
        app.memory = memory;
        app.uris = uris.to_vec();
        app.services = services.to_vec();
        app.staging = staging.clone();
        self.server.apps.lock().insert(name.to_string(), app);
        Ok(())
    }

    async fn match_resources(
        &self,
        resources: &[ResourceFingerprint],
    ) -> Result<Vec<ResourceFingerprint>, CloudError> {
        self.server.record("match_resources")?;
        let cached = self.server.cached.lock();
        Ok(resources
            .iter()
            .filter(|r| cached.contains(&r.path))
            .cloned()
            .collect())
    }

    async fn upload_application(&self, _name: &str, upload: &Upload) -> Result<(), CloudError> {
        self.server.record("upload_application")?;
        self.server.uploads.lock().push(upload.clone());
        Ok(())
    }

    async fn start_application(&self, name: &str) -> Result<StartingInfo, CloudError> {
        self.server.record("start_application")?;
        self.server.launch(name, None)
    }

    async fn stop_application(&self, name: &str) -> Result<(), CloudError> {
        self.server.record("stop_application")?;
        self.server.modify(name, |app| {
            app.state = AppState::Stopped;
            app.running_instances = 0;
        })
    }

    async fn debug_application(
        &self,
        name: &str,
        mode: DebugMode,
    ) -> Result<StartingInfo, CloudError> {
        self.server.record("debug_application")?;
        self.server.launch(name, Some(mode))
    }

    async fn update_application_instances(
        &self,
        name: &str,
        instances: u32,
    ) -> Result<(), CloudError> {
        self.server.record("update_instances")?;
        self.server.modify(name, |app| app.instances = instances)
    }

    async fn update_application_memory(&self, name: &str, memory: u32) -> Result<(), CloudError> {
        self.server.record("update_memory")?;
        self.server.modify(name, |app| app.memory = memory)
    }

    async fn update_application_uris(&self, name: &str, uris: &[String]) -> Result<(), CloudError> {
        self.server.record("update_uris")?;
        self.server.modify(name, |app| app.uris = uris.to_vec())
    }

    async fn update_application_services(
        &self,
        name: &str,
        services: &[String],
    ) -> Result<(), CloudError> {
        self.server.record("update_services")?;
        self.server.modify(name, |app| app.services = services.to_vec())
    }

    async fn get_application_stats(&self, _name: &str) -> Result<ApplicationStats, CloudError> {
        self.server.record("get_application_stats")?;
        Ok(ApplicationStats::default())
    }

    async fn get_application_instances(&self, _name: &str) -> Result<InstancesInfo, CloudError> {
        self.server.record("get_application_instances")?;
        Ok(InstancesInfo::default())
    }

    async fn get_staging_logs(
        &self,
        staging_file: &str,
        offset: u64,
    ) -> Result<Option<String>, CloudError> {
        self.server.record("get_staging_logs")?;
        let log = format!("-----> staged {staging_file}\n");
        Ok(usize::try_from(offset)
            .ok()
            .and_then(|o| log.get(o..))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string))
    }

    async fn delete_application(&self, name: &str) -> Result<(), CloudError> {
        self.server.record("delete_application")?;
        self.server
            .apps
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(not_found)
    }

    async fn get_services(&self) -> Result<Vec<CloudService>, CloudError> {
        self.server.record("get_services")?;
        Ok(self.server.services.lock().clone())
    }

    async fn create_service(&self, service: &CloudService) -> Result<(), CloudError> {
        self.server.record("create_service")?;
        self.server.services.lock().push(service.clone());
        Ok(())
    }

    async fn delete_service(&self, name: &str) -> Result<(), CloudError> {
        self.server.record("delete_service")?;
        self.server.services.lock().retain(|s| s.name != name);
        Ok(())
    }

    async fn get_service_offerings(&self) -> Result<Vec<ServiceOffering>, CloudError> {
        self.server.record("get_service_offerings")?;
        Ok(vec![ServiceOffering {
            label: "postgresql".to_string(),
            provider: None,
            version: Some("16".to_string()),
            description: None,
        }])
    }

    async fn get_domains_for_org(&self) -> Result<Vec<CloudDomain>, CloudError> {
        self.server.record("get_domains_for_org")?;
        Ok(self.server.domains.lock().clone())
    }

    async fn get_domains(&self) -> Result<Vec<CloudDomain>, CloudError> {
        self.server.record("get_domains")?;
        Ok(self.server.domains.lock().clone())
    }

    async fn register(&self, _email: &str, _password: &str) -> Result<(), CloudError> {
        self.server.record("register")
    }

    async fn update_password(&self, _new_password: &str) -> Result<(), CloudError> {
        self.server.record("update_password")
    }

    fn set_proxy(&self, proxy: Option<&str>) {
        self.server.proxies.lock().push(proxy.map(str::to_string));
    }
}

pub struct MockFactory {
    pub server: Arc<MockServer>,
}

impl ClientFactory for MockFactory {
    type Client = MockClient;

    fn create(&self, _url: &str, _credentials: &Credentials) -> Result<MockClient, CloudError> {
        self.server.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockClient {
            server: Arc::clone(&self.server),
        })
    }
}

// ── Listener and hooks ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn has(&self, event: &str) -> bool {
        self.events.lock().iter().any(|e| e == event)
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl DeploymentListener for RecordingEvents {
    fn application_about_to_start(&self, module_id: &str) {
        self.push(format!("about_to_start:{module_id}"));
    }
    fn application_starting(&self, module_id: &str, _info: &StartingInfo) {
        self.push(format!("starting:{module_id}"));
    }
    fn application_started(&self, module_id: &str) {
        self.push(format!("started:{module_id}"));
    }
    fn application_stopped(&self, module_id: &str) {
        self.push(format!("stopped:{module_id}"));
    }
    fn services_updated(&self) {
        self.push("services_updated".to_string());
    }
    fn server_refreshed(&self) {
        self.push("server_refreshed".to_string());
    }
}

impl LifecycleHooks for RecordingEvents {
    fn attach_debugger(&self, module_id: &str, _app: &CloudApplication) {
        self.push(format!("attach:{module_id}"));
    }
    fn close_all_tunnels(&self) {
        self.push("close_all_tunnels".to_string());
    }
    fn close_tunnel(&self, service: &str) {
        self.push(format!("close_tunnel:{service}"));
    }
}

/// Prompt that declines everything, like a user pressing Escape.
pub struct DecliningPrompt;

impl CredentialPrompt for DecliningPrompt {
    fn credentials(&self, _server_url: &str) -> Option<Credentials> {
        None
    }
    fn complete_deployment(&self, _module_id: &str, _draft: &DeploymentInfo) -> Option<DeploymentInfo> {
        None
    }
}

// ── Archives ──────────────────────────────────────────────────────────────────

/// Archive provider serving fixed content.
pub struct MockArchives {
    /// Files reported as changed; `None` when the change set is unknown.
    pub changed: Option<Vec<String>>,
    pub entries: Vec<ArchiveEntry>,
    pub fail_full: bool,
    pub full_builds: AtomicUsize,
}

impl Default for MockArchives {
    fn default() -> Self {
        Self {
            changed: None,
            entries: vec![entry("index.html", "<h1>demo</h1>"), entry("app.js", "run()")],
            fail_full: false,
            full_builds: AtomicUsize::new(0),
        }
    }
}

pub fn entry(path: &str, contents: &str) -> ArchiveEntry {
    ArchiveEntry {
        path: path.to_string(),
        sha256: format!("{:064x}", contents.len()),
        contents: contents.as_bytes().to_vec(),
    }
}

impl ArchiveProvider for MockArchives {
    async fn delegate_archive(
        &self,
        _module: &ApplicationModule,
    ) -> Result<Option<ApplicationArchive>> {
        Ok(None)
    }

    async fn changed_files(&self, _module: &ApplicationModule) -> Result<Option<Vec<String>>> {
        Ok(self.changed.clone())
    }

    async fn incremental_archive(
        &self,
        _module: &ApplicationModule,
        _changed: &[String],
    ) -> Result<Option<CachingArchive>> {
        Ok(Some(CachingArchive::new(self.entries.clone())))
    }

    async fn full_archive(&self, _module: &ApplicationModule) -> Result<ApplicationArchive> {
        self.full_builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_full {
            anyhow::bail!("disk full");
        }
        Ok(ApplicationArchive::Bytes(b"tar.gz bytes".to_vec()))
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub type TestConnection = ServerConnection<MockFactory>;

/// Connection with credentials, recording listener and hooks.
pub fn connection(server: &Arc<MockServer>) -> (TestConnection, Arc<RecordingEvents>) {
    let events = Arc::new(RecordingEvents::default());
    let conn = ServerConnection::new(
        SERVER_URL,
        MockFactory {
            server: Arc::clone(server),
        },
        ConnectionOptions::default(),
    )
    .with_credentials(Credentials::new("dev@example.com", "secret"))
    .with_listener(events.clone())
    .with_hooks(events.clone());
    (conn, events)
}

/// The `demo` deployment: 512 MB, one URL, run mode.
pub fn demo_deployment() -> DeploymentInfo {
    DeploymentInfo {
        deployment_name: Some("demo".to_string()),
        memory: 512,
        uris: vec!["demo.apps.example.com".to_string()],
        mode: Some(stratus_cli::domain::LaunchMode::Run),
        ..DeploymentInfo::default()
    }
}

pub fn track(conn: &TestConnection, module_id: &str, deployment: DeploymentInfo) {
    conn.modules()
        .insert(ApplicationModule::new(module_id, deployment))
        .expect("track module");
}
