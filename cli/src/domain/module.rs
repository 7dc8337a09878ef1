//! Locally tracked application modules and their reconciliation against the
//! server's application list.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_common::{AppState, ApplicationStats, CloudApplication, InstancesInfo, StartingInfo};

use crate::domain::deployment::{DeploymentInfo, DeploymentWorkingCopy};
use crate::domain::error::ModuleError;

/// Run status of a module as shown to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    #[default]
    Unknown,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Whether local content still needs publishing.
///
/// `Unknown` is set after an aborted deploy so a later publish is never
/// skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishState {
    /// Up to date.
    None,
    Incremental,
    #[default]
    Full,
    Unknown,
}

/// Point-in-time copy of the remote application.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RemoteSnapshot {
    pub app: CloudApplication,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ApplicationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<InstancesInfo>,
}

impl From<CloudApplication> for RemoteSnapshot {
    fn from(app: CloudApplication) -> Self {
        Self {
            app,
            stats: None,
            instances: None,
        }
    }
}

/// A local module and what is known about its remote counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationModule {
    module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_path: Option<PathBuf>,
    deployment: DeploymentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<RemoteSnapshot>,
    /// Deployed and managed outside this client: never rebuilt or uploaded.
    pub external: bool,
    pub status: ModuleStatus,
    pub publish: PublishState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_info: Option<StartingInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl ApplicationModule {
    #[must_use]
    pub fn new(module_id: impl Into<String>, deployment: DeploymentInfo) -> Self {
        Self {
            module_id: module_id.into(),
            project_path: None,
            deployment,
            snapshot: None,
            external: false,
            status: ModuleStatus::Unknown,
            publish: PublishState::Full,
            last_error: None,
            starting_info: None,
            last_deployed_at: None,
        }
    }

    /// Rebuild a module from its persisted record.
    #[must_use]
    pub fn from_record(record: ModuleRecord) -> Self {
        let mut module = Self::new(record.module_id, record.deployment);
        module.project_path = record.project_path;
        module.external = record.external;
        module.last_deployed_at = record.last_deployed_at;
        module.publish = record.publish;
        module.starting_info = record.staging_file.map(|f| StartingInfo {
            staging_file: Some(f),
        });
        module
    }

    /// Persistable view of this module.
    #[must_use]
    pub fn to_record(&self) -> ModuleRecord {
        ModuleRecord {
            module_id: self.module_id.clone(),
            project_path: self.project_path.clone(),
            deployment: self.deployment.clone(),
            external: self.external,
            last_deployed_at: self.last_deployed_at,
            publish: self.publish,
            staging_file: self
                .starting_info
                .as_ref()
                .and_then(|s| s.staging_file.clone()),
        }
    }

    #[must_use]
    pub fn with_project_path(mut self, path: PathBuf) -> Self {
        self.project_path = Some(path);
        self
    }

    #[must_use]
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    #[must_use]
    pub fn project_path(&self) -> Option<&std::path::Path> {
        self.project_path.as_deref()
    }

    #[must_use]
    pub fn deployment(&self) -> &DeploymentInfo {
        &self.deployment
    }

    /// Name of the remote application this module maps to.
    #[must_use]
    pub fn deployed_name(&self) -> Option<&str> {
        self.deployment.name()
    }

    #[must_use]
    pub fn working_copy(&self) -> DeploymentWorkingCopy {
        self.deployment.working_copy()
    }

    /// Replace the deployment info with an edited copy.
    pub fn commit(&mut self, copy: DeploymentWorkingCopy) {
        self.deployment = copy.into_info();
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&RemoteSnapshot> {
        self.snapshot.as_ref()
    }

    /// Bind a fresh remote view, keeping previously fetched stats only when
    /// the application is the same.
    pub fn bind_snapshot(&mut self, app: CloudApplication) {
        match &mut self.snapshot {
            Some(snap) if snap.app.name == app.name => snap.app = app,
            _ => self.snapshot = Some(RemoteSnapshot::from(app)),
        }
    }

    pub fn clear_snapshot(&mut self) {
        self.snapshot = None;
    }

    pub fn set_stats(&mut self, stats: ApplicationStats, instances: InstancesInfo) {
        if let Some(snap) = &mut self.snapshot {
            snap.stats = Some(stats);
            snap.instances = Some(instances);
        }
    }

    /// Record a failed operation.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ModuleStatus::Failed;
        self.publish = PublishState::Unknown;
        self.last_error = Some(message.into());
    }
}

/// Module state persisted to `~/.stratus/modules.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleRecord {
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,
    /// Last applied deployment info.
    pub deployment: DeploymentInfo,
    #[serde(default)]
    pub external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deployed_at: Option<DateTime<Utc>>,
    /// Records written before this field existed load as `Full`.
    #[serde(default)]
    pub publish: PublishState,
    /// Staging log handle of the most recent start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_file: Option<String>,
}

/// Module status implied by a remote lifecycle state.
#[must_use]
pub fn status_for(state: AppState) -> ModuleStatus {
    match state {
        AppState::Running => ModuleStatus::Started,
        AppState::Stopped => ModuleStatus::Stopped,
        AppState::Updating => ModuleStatus::Starting,
        AppState::Unknown => ModuleStatus::Unknown,
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Remote applications with no local module.
    pub external: Vec<String>,
    /// Modules whose snapshot was replaced.
    pub updated: Vec<String>,
    /// Modules whose application no longer exists remotely.
    pub cleared: Vec<String>,
}

/// All modules tracked for one server, keyed by module id, plus the remote
/// applications no module claims.
#[derive(Debug, Default)]
pub struct TrackedModuleSet {
    modules: BTreeMap<String, ApplicationModule>,
    external: BTreeMap<String, CloudApplication>,
}

impl TrackedModuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a module.
    ///
    /// # Errors
    ///
    /// Fails when the id is already tracked or another module already maps to
    /// the same application name.
    pub fn insert(&mut self, module: ApplicationModule) -> Result<(), ModuleError> {
        if self.modules.contains_key(module.module_id()) {
            return Err(ModuleError::AlreadyTracked(module.module_id().to_string()));
        }
        if let Some(name) = module.deployed_name() {
            if let Some(existing) = self.by_app_name(name) {
                return Err(ModuleError::NameInUse {
                    name: name.to_string(),
                    existing: existing.module_id().to_string(),
                });
            }
            self.external.remove(name);
        }
        self.modules.insert(module.module_id().to_string(), module);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, module_id: &str) -> Option<&ApplicationModule> {
        self.modules.get(module_id)
    }

    pub fn get_mut(&mut self, module_id: &str) -> Option<&mut ApplicationModule> {
        self.modules.get_mut(module_id)
    }

    pub fn remove(&mut self, module_id: &str) -> Option<ApplicationModule> {
        self.modules.remove(module_id)
    }

    #[must_use]
    pub fn by_app_name(&self, name: &str) -> Option<&ApplicationModule> {
        self.modules
            .values()
            .find(|m| m.deployed_name() == Some(name))
    }

    pub fn modules(&self) -> impl Iterator<Item = &ApplicationModule> {
        self.modules.values()
    }

    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn external(&self) -> impl Iterator<Item = &CloudApplication> {
        self.external.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Forget the remote view entirely: every module loses its snapshot and
    /// goes `Unknown`, and the external list is emptied.
    pub fn reset_remote_state(&mut self) {
        for module in self.modules.values_mut() {
            module.clear_snapshot();
            module.status = ModuleStatus::Unknown;
        }
        self.external.clear();
    }

    /// Rebuild the remote association from a full application list.
    ///
    /// Deployment info is never touched. A module that previously failed
    /// keeps its `Failed` status until its application is seen running.
    pub fn reconcile(&mut self, apps: Vec<CloudApplication>) -> ReconcileReport {
        let mut by_name: HashMap<String, CloudApplication> =
            apps.into_iter().map(|a| (a.name.clone(), a)).collect();
        let mut report = ReconcileReport::default();

        for module in self.modules.values_mut() {
            let remote = module
                .deployed_name()
                .and_then(|name| by_name.remove(name));
            match remote {
                Some(app) => {
                    let status = status_for(app.state);
                    if module.status != ModuleStatus::Failed || status == ModuleStatus::Started {
                        module.status = status;
                    }
                    module.bind_snapshot(app);
                    report.updated.push(module.module_id().to_string());
                }
                None => {
                    module.clear_snapshot();
                    module.status = ModuleStatus::Unknown;
                    report.cleared.push(module.module_id().to_string());
                }
            }
        }

        self.external = by_name.into_iter().collect();
        report.external = self.external.keys().cloned().collect();
        report
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
