//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared wire types —
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::future::Future;
use std::path::PathBuf;

use anyhow::Result;
use stratus_common::{
    ApplicationStats, CloudApplication, CloudDomain, CloudInfo, CloudService, DebugMode,
    InstancesInfo, ResourceFingerprint, ServiceOffering, Staging, StartingInfo,
};

use crate::domain::{
    ApplicationArchive, ApplicationModule, CachingArchive, CloudError, Credentials,
    DeploymentInfo, ModuleRecord, StratusConfig, Upload,
};

// ── Control-plane client ──────────────────────────────────────────────────────

/// One authenticated connection to the control plane.
///
/// Futures are `Send` so operations can run on spawned tasks.
pub trait CloudClient: Send + Sync + 'static {
    /// Obtain (or renew) an access token with the client's credentials.
    fn login(&self) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn info(&self) -> impl Future<Output = Result<CloudInfo, CloudError>> + Send;

    fn get_application(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CloudApplication, CloudError>> + Send;
    fn get_applications(
        &self,
    ) -> impl Future<Output = Result<Vec<CloudApplication>, CloudError>> + Send;
    fn create_application(
        &self,
        name: &str,
        staging: &Staging,
        memory: u32,
        uris: &[String],
        services: &[String],
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    /// Ask which of `resources` the server already caches.
    fn match_resources(
        &self,
        resources: &[ResourceFingerprint],
    ) -> impl Future<Output = Result<Vec<ResourceFingerprint>, CloudError>> + Send;
    fn upload_application(
        &self,
        name: &str,
        upload: &Upload,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn start_application(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<StartingInfo, CloudError>> + Send;
    fn stop_application(&self, name: &str) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn debug_application(
        &self,
        name: &str,
        mode: DebugMode,
    ) -> impl Future<Output = Result<StartingInfo, CloudError>> + Send;

    fn update_application_instances(
        &self,
        name: &str,
        instances: u32,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn update_application_memory(
        &self,
        name: &str,
        memory: u32,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn update_application_uris(
        &self,
        name: &str,
        uris: &[String],
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn update_application_services(
        &self,
        name: &str,
        services: &[String],
    ) -> impl Future<Output = Result<(), CloudError>> + Send;

    fn get_application_stats(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ApplicationStats, CloudError>> + Send;
    fn get_application_instances(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<InstancesInfo, CloudError>> + Send;
    /// Read the staging log from `offset`. `None` once the log is complete.
    fn get_staging_logs(
        &self,
        staging_file: &str,
        offset: u64,
    ) -> impl Future<Output = Result<Option<String>, CloudError>> + Send;

    fn delete_application(&self, name: &str)
    -> impl Future<Output = Result<(), CloudError>> + Send;

    fn get_services(&self) -> impl Future<Output = Result<Vec<CloudService>, CloudError>> + Send;
    fn create_service(
        &self,
        service: &CloudService,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn delete_service(&self, name: &str) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn get_service_offerings(
        &self,
    ) -> impl Future<Output = Result<Vec<ServiceOffering>, CloudError>> + Send;

    /// Domains owned by the organization.
    fn get_domains_for_org(
        &self,
    ) -> impl Future<Output = Result<Vec<CloudDomain>, CloudError>> + Send;
    /// Domains mapped into the current space.
    fn get_domains(&self) -> impl Future<Output = Result<Vec<CloudDomain>, CloudError>> + Send;

    fn register(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
    fn update_password(
        &self,
        new_password: &str,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;

    /// Route subsequent calls through `proxy` (or directly when `None`).
    fn set_proxy(&self, proxy: Option<&str>);
}

/// Creates control-plane clients. Creation does not touch the network; the
/// client logs in on demand.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: CloudClient;

    /// # Errors
    ///
    /// Returns an error if the URL or credentials cannot form a client.
    fn create(&self, url: &str, credentials: &Credentials) -> Result<Self::Client, CloudError>;
}

// ── Prompting and notification ports ──────────────────────────────────────────

/// Synchronous prompt for values the user did not supply.
pub trait CredentialPrompt: Send + Sync {
    /// Ask for credentials. `None` means the user declined.
    fn credentials(&self, server_url: &str) -> Option<Credentials>;

    /// Complete missing deployment settings. `None` means the user canceled.
    fn complete_deployment(&self, module_id: &str, draft: &DeploymentInfo)
    -> Option<DeploymentInfo>;
}

/// Fire-and-forget deployment notifications.
pub trait DeploymentListener: Send + Sync {
    fn application_about_to_start(&self, _module_id: &str) {}
    fn application_starting(&self, _module_id: &str, _info: &StartingInfo) {}
    fn application_started(&self, _module_id: &str) {}
    fn application_stopped(&self, _module_id: &str) {}
    fn services_updated(&self) {}
    fn instances_updated(&self, _module_id: &str) {}
    fn server_refreshed(&self) {}
}

/// Hooks into debugger and tunnel features that live outside this crate.
pub trait LifecycleHooks: Send + Sync {
    /// Attach a debugger to an application started in debug mode.
    fn attach_debugger(&self, _module_id: &str, _app: &CloudApplication) {}
    /// Close every open tunnel.
    fn close_all_tunnels(&self) {}
    /// Close the tunnel bound to `service`, if any.
    fn close_tunnel(&self, _service: &str) {}
}

// ── Packaging port ────────────────────────────────────────────────────────────

/// Produces deployable content for a module.
#[allow(async_fn_in_trait)]
pub trait ArchiveProvider {
    /// A prepackaged archive supplied by the module itself, if any.
    async fn delegate_archive(&self, module: &ApplicationModule)
    -> Result<Option<ApplicationArchive>>;
    /// Files changed since the last publish; `None` when unknown.
    async fn changed_files(&self, module: &ApplicationModule) -> Result<Option<Vec<String>>>;
    /// Archive whose payload is produced after the server reports which
    /// files it already caches. `None` when an incremental archive cannot be
    /// built.
    async fn incremental_archive(
        &self,
        module: &ApplicationModule,
        changed: &[String],
    ) -> Result<Option<CachingArchive>>;
    /// Rebuild the full archive.
    async fn full_archive(&self, module: &ApplicationModule) -> Result<ApplicationArchive>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── State and config ports ────────────────────────────────────────────────────

/// Persists tracked modules per server URL.
#[allow(async_fn_in_trait)]
pub trait ModuleStore {
    /// Load the modules tracked for `server_url`; empty when none exist.
    async fn load_modules(&self, server_url: &str) -> Result<Vec<ModuleRecord>>;
    /// Replace the modules tracked for `server_url`.
    async fn save_modules(&self, server_url: &str, records: &[ModuleRecord]) -> Result<()>;
}

/// Loads and saves the user configuration.
pub trait ConfigStore {
    /// Load config, falling back to defaults when the file does not exist.
    fn load(&self) -> Result<StratusConfig>;
    /// Write config with owner-only permissions.
    fn save(&self, config: &StratusConfig) -> Result<()>;
    /// Location of the config file.
    fn path(&self) -> Result<PathBuf>;
}
