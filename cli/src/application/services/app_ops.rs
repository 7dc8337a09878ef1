//! Application service — connection, configuration and housekeeping
//! operations on deployed applications.
//!
//! Imports only from `crate::domain` and `crate::application`. All remote
//! work goes through the connection's executor.

use std::collections::BTreeSet;

use stratus_common::{
    CloudApplication, CloudDomain, CloudInfo, CloudService, ServiceOffering,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::ports::{ClientFactory, CloudClient};
use crate::application::services::reconcile::refresh_modules;
use crate::application::services::retry::RetryPolicy;
use crate::application::services::session::{SHORT_INTERVAL, ServerConnection};
use crate::domain::module::status_for;
use crate::domain::{
    ApplicationModule, ApplicationUrlLookup, CloudError, Credentials, DebugSupport, DeployError,
    DeploymentInfo, ModuleError, PublishState, RemoteSnapshot, ServerState,
};

// ── Connection lifecycle ──────────────────────────────────────────────────────

/// Log in, refresh modules and mark the server started.
///
/// # Errors
///
/// Returns the executor's error when login or the first refresh fails.
pub async fn connect<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    conn.execute("login", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.login().await
    })
    .await?;
    refresh_modules(conn, cancel).await?;
    conn.set_server_state(ServerState::Started);
    conn.set_publish_state(PublishState::None);
    info!(url = %conn.url(), "connected");
    Ok(())
}

/// Tear down the connection: stop refreshing, forget remote state, close
/// tunnels and drop the session.
pub async fn disconnect<F: ClientFactory>(conn: &ServerConnection<F>) {
    conn.set_server_state(ServerState::Stopping);
    conn.refresh().set_interval(None);
    conn.modules().reset_remote_state();
    conn.set_server_state(ServerState::Stopped);
    conn.hooks().close_all_tunnels();
    conn.reset_session().await;
    info!(url = %conn.url(), "disconnected");
}

/// Change the password of the logged in user and continue with the new one.
///
/// # Errors
///
/// Returns the executor's error when the control plane rejects the change.
pub async fn update_password<F: ClientFactory>(
    conn: &ServerConnection<F>,
    new_password: &str,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    conn.execute("update password", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.update_password(new_password).await
    })
    .await?;
    let username = conn
        .credentials
        .lock()
        .as_ref()
        .map(|c| c.username.clone())
        .unwrap_or_default();
    conn.set_credentials(Credentials::new(username, new_password))
        .await;
    Ok(())
}

/// Register a new account. Runs outside any session.
///
/// # Errors
///
/// Returns `Remote` when the client cannot be built or registration fails.
pub async fn register_account<F: ClientFactory>(
    factory: &F,
    url: &str,
    email: &str,
    password: &str,
) -> Result<(), DeployError> {
    let remote = |source| DeployError::Remote {
        label: "register".to_string(),
        source,
    };
    let client = factory
        .create(url, &Credentials::new(email, password))
        .map_err(remote)?;
    client.register(email, password).await.map_err(remote)
}

/// Whether the server allows debug launches. Cached per session.
///
/// # Errors
///
/// Returns the executor's error when the server info cannot be read.
pub async fn debug_support<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<DebugSupport, DeployError> {
    let cached = conn.session.lock().await.debug_support;
    if cached != DebugSupport::Unchecked {
        return Ok(cached);
    }
    let info: CloudInfo = conn
        .execute("server info", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.info().await
        })
        .await?;
    let support = if info.allow_debug {
        DebugSupport::Supported
    } else {
        DebugSupport::Unsupported
    };
    conn.session.lock().await.debug_support = support;
    Ok(support)
}

// ── Module tracking ───────────────────────────────────────────────────────────

/// Track a local project directory as a module.
///
/// # Errors
///
/// Returns `Validation` when the id or application name is already taken.
pub fn track_module<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module: ApplicationModule,
) -> Result<(), DeployError> {
    conn.modules()
        .insert(module)
        .map_err(|e: ModuleError| DeployError::Validation(e.to_string()))
}

/// Start tracking an application that was deployed by someone else. The
/// module reuses the application name as its id.
///
/// # Errors
///
/// Returns `NotFound` when `app_name` is not among the external
/// applications of the last refresh.
pub fn track_external<F: ClientFactory>(
    conn: &ServerConnection<F>,
    app_name: &str,
) -> Result<String, DeployError> {
    let mut modules = conn.modules();
    let app = modules
        .external()
        .find(|a| a.name == app_name)
        .cloned()
        .ok_or_else(|| DeployError::NotFound(app_name.to_string()))?;
    let mut module = ApplicationModule::new(app_name, deployment_from_app(&app));
    module.external = true;
    module.publish = PublishState::None;
    module.status = status_for(app.state);
    module.bind_snapshot(app);
    modules
        .insert(module)
        .map_err(|e| DeployError::Validation(e.to_string()))?;
    Ok(app_name.to_string())
}

fn deployment_from_app(app: &CloudApplication) -> DeploymentInfo {
    DeploymentInfo {
        deployment_name: Some(app.name.clone()),
        memory: app.memory,
        uris: app.uris.clone(),
        services: app.services.clone(),
        staging: app.staging.clone(),
        mode: None,
        incremental: false,
    }
}

/// Resolve a tracked module's remote application name.
///
/// # Errors
///
/// `NotFound` for untracked modules, `Validation` when no name is set.
pub fn deployed_name<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
) -> Result<String, DeployError> {
    let modules = conn.modules();
    let module = modules
        .get(module_id)
        .ok_or_else(|| DeployError::NotFound(module_id.to_string()))?;
    module
        .deployed_name()
        .map(str::to_string)
        .ok_or_else(|| DeployError::Validation("no deployment name set".to_string()))
}

/// Re-read one application and bind it to its module.
async fn rebind<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<CloudApplication, DeployError> {
    let app = conn
        .execute("get application", RetryPolicy::AuthRetry, cancel, |c| async move {
            c.get_application(name).await
        })
        .await?;
    conn.bind_snapshot(module_id, app.clone());
    Ok(app)
}

// ── Scale and reconfigure ─────────────────────────────────────────────────────

/// Change the instance count.
///
/// # Errors
///
/// Returns the executor's error once the stopped-state policy gives up.
pub async fn update_instances<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    instances: u32,
    cancel: &CancellationToken,
) -> Result<CloudApplication, DeployError> {
    let name = deployed_name(conn, module_id)?;
    let policy = RetryPolicy::stopped_state(conn.timeouts());
    conn.execute("update instances", policy, cancel, |c| {
        let name = name.as_str();
        async move { c.update_application_instances(name, instances).await }
    })
    .await?;
    let app = rebind(conn, module_id, &name, cancel).await?;
    conn.listener().instances_updated(module_id);
    Ok(app)
}

/// Change memory per instance and record it in the deployment info.
///
/// # Errors
///
/// `Validation` for zero memory, otherwise the executor's error.
pub async fn update_memory<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    memory: u32,
    cancel: &CancellationToken,
) -> Result<CloudApplication, DeployError> {
    if memory == 0 {
        return Err(DeployError::Validation(
            "memory must be greater than 0 MB".to_string(),
        ));
    }
    let name = deployed_name(conn, module_id)?;
    let policy = RetryPolicy::stopped_state(conn.timeouts());
    conn.execute("update memory", policy, cancel, |c| {
        let name = name.as_str();
        async move { c.update_application_memory(name, memory).await }
    })
    .await?;
    conn.with_module(module_id, |m| {
        let mut copy = m.working_copy();
        copy.set_memory(memory);
        m.commit(copy);
    });
    rebind(conn, module_id, &name, cancel).await
}

/// Replace the mapped URLs.
///
/// # Errors
///
/// Returns the executor's error once the stopped-state policy gives up.
pub async fn update_uris<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    uris: Vec<String>,
    cancel: &CancellationToken,
) -> Result<CloudApplication, DeployError> {
    let name = deployed_name(conn, module_id)?;
    let policy = RetryPolicy::stopped_state(conn.timeouts());
    conn.execute("update urls", policy, cancel, |c| {
        let (name, uris) = (name.as_str(), uris.as_slice());
        async move { c.update_application_uris(name, uris).await }
    })
    .await?;
    conn.with_module(module_id, |m| {
        let mut copy = m.working_copy();
        copy.set_uris(uris.clone());
        m.commit(copy);
    });
    rebind(conn, module_id, &name, cancel).await
}

/// Replace the bound services. When the module is the tunnel application,
/// tunnels of services it no longer binds are closed.
///
/// # Errors
///
/// `Validation` for blank service names, otherwise the executor's error.
pub async fn update_services<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    services: Vec<String>,
    cancel: &CancellationToken,
) -> Result<CloudApplication, DeployError> {
    if services.iter().any(|s| s.trim().is_empty()) {
        return Err(DeployError::Validation(
            "bound service names must not be blank".to_string(),
        ));
    }
    let name = deployed_name(conn, module_id)?;
    let previous: BTreeSet<String> = conn
        .modules()
        .get(module_id)
        .and_then(ApplicationModule::snapshot)
        .map(|s| s.app.services.iter().cloned().collect())
        .unwrap_or_default();

    let policy = RetryPolicy::staging(conn.timeouts());
    conn.execute("update services", policy, cancel, |c| {
        let (name, services) = (name.as_str(), services.as_slice());
        async move { c.update_application_services(name, services).await }
    })
    .await?;

    if conn.is_tunnel_app(&name) {
        for unbound in previous.iter().filter(|s| !services.contains(s)) {
            conn.hooks().close_tunnel(unbound);
        }
    }
    conn.with_module(module_id, |m| {
        let mut copy = m.working_copy();
        copy.set_services(services.clone());
        m.commit(copy);
    });
    let app = rebind(conn, module_id, &name, cancel).await?;
    conn.listener().services_updated();
    Ok(app)
}

// ── Delete ────────────────────────────────────────────────────────────────────

/// Delete the applications of `module_ids` and stop tracking them, then
/// refresh. Bound services are deleted too when `delete_services` is set.
///
/// # Errors
///
/// Stops at the first module that fails; modules deleted before it stay
/// deleted.
pub async fn delete_modules<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_ids: &[String],
    delete_services: bool,
    cancel: &CancellationToken,
) -> Result<Vec<String>, DeployError> {
    let pause = conn.refresh().pause();
    let mut deleted_services = Vec::new();

    for module_id in module_ids {
        let name = deployed_name(conn, module_id)?;

        let current = conn
            .execute("get application", RetryPolicy::AuthRetry, cancel, |c| {
                let name = name.as_str();
                async move {
                    match c.get_application(name).await {
                        Ok(app) => Ok(Some(app)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            })
            .await?;

        if conn.is_tunnel_app(&name) {
            conn.hooks().close_all_tunnels();
        }

        if let Some(app) = &current {
            conn.execute("delete application", RetryPolicy::AuthRetry, cancel, |c| {
                let name = name.as_str();
                async move { c.delete_application(name).await }
            })
            .await?;
            for service in &app.services {
                if service.trim().is_empty() {
                    warn!(app = %name, "ignoring blank service name reported by the server");
                    continue;
                }
                deleted_services.push(service.clone());
            }
        }
        conn.modules().remove(module_id);
        info!(module = %module_id, app = %name, "application deleted");
    }

    if delete_services && !deleted_services.is_empty() {
        delete_services_by_name(conn, &deleted_services, cancel).await?;
    }

    drop(pause);
    if let Err(e) = refresh_modules(conn, cancel).await {
        warn!(error = %e, "refresh after delete failed");
    }
    Ok(deleted_services)
}

// ── Services ──────────────────────────────────────────────────────────────────

/// # Errors
///
/// Returns the executor's error.
pub async fn list_services<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<Vec<CloudService>, DeployError> {
    conn.execute("list services", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.get_services().await
    })
    .await
}

/// # Errors
///
/// Returns the executor's error.
pub async fn service_offerings<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<Vec<ServiceOffering>, DeployError> {
    conn.execute("list service offerings", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.get_service_offerings().await
    })
    .await
}

/// # Errors
///
/// `Validation` for a blank name, otherwise the executor's error.
pub async fn create_service<F: ClientFactory>(
    conn: &ServerConnection<F>,
    service: &CloudService,
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    if service.name.trim().is_empty() {
        return Err(DeployError::Validation(
            "service name must not be blank".to_string(),
        ));
    }
    conn.execute("create service", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.create_service(service).await
    })
    .await?;
    conn.listener().services_updated();
    Ok(())
}

/// Delete services by name, closing any tunnel bound to them first.
///
/// # Errors
///
/// Returns the executor's error for the first service that fails.
pub async fn delete_services_by_name<F: ClientFactory>(
    conn: &ServerConnection<F>,
    names: &[String],
    cancel: &CancellationToken,
) -> Result<(), DeployError> {
    for name in names {
        conn.hooks().close_tunnel(name);
        conn.execute("delete service", RetryPolicy::AuthRetry, cancel, |c| {
            let name = name.as_str();
            async move { c.delete_service(name).await }
        })
        .await?;
    }
    conn.listener().services_updated();
    Ok(())
}

// ── Domains ───────────────────────────────────────────────────────────────────

/// # Errors
///
/// Returns the executor's error.
pub async fn org_domains<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<Vec<CloudDomain>, DeployError> {
    conn.execute("list org domains", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.get_domains_for_org().await
    })
    .await
}

/// # Errors
///
/// Returns the executor's error.
pub async fn space_domains<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<Vec<CloudDomain>, DeployError> {
    conn.execute("list domains", RetryPolicy::AuthRetry, cancel, |c| async move {
        c.get_domains().await
    })
    .await
}

/// The session's URL lookup, loading it when no call has populated it yet.
///
/// # Errors
///
/// Returns the executor's error when the domains cannot be read.
pub async fn url_lookup<F: ClientFactory>(
    conn: &ServerConnection<F>,
    cancel: &CancellationToken,
) -> Result<ApplicationUrlLookup, DeployError> {
    if let Some(lookup) = conn.cached_url_lookup().await {
        return Ok(lookup);
    }
    let domains = space_domains(conn, cancel).await?;
    Ok(conn
        .cached_url_lookup()
        .await
        .unwrap_or_else(|| ApplicationUrlLookup::new(domains.into_iter().map(|d| d.name))))
}

// ── Stats and logs ────────────────────────────────────────────────────────────

/// Refresh one module's snapshot together with stats and instances.
///
/// # Errors
///
/// Returns the executor's error once the staging policy gives up.
pub async fn refresh_module_stats<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    cancel: &CancellationToken,
) -> Result<RemoteSnapshot, DeployError> {
    let name = deployed_name(conn, module_id)?;
    let policy = RetryPolicy::staging(conn.timeouts());
    let (app, stats, instances) = conn
        .execute("application stats", policy, cancel, |c| {
            let name = name.as_str();
            async move {
                let app = c.get_application(name).await?;
                let stats = c.get_application_stats(name).await?;
                let instances = c.get_application_instances(name).await?;
                Ok::<_, CloudError>((app, stats, instances))
            }
        })
        .await?;
    conn.with_module(module_id, |m| {
        m.bind_snapshot(app.clone());
        m.set_stats(stats.clone(), instances.clone());
    })
    .ok_or_else(|| DeployError::NotFound(module_id.to_string()))?;
    Ok(RemoteSnapshot {
        app,
        stats: Some(stats),
        instances: Some(instances),
    })
}

/// Read the staging log of the module's most recent start from `offset`.
/// `Ok(None)` when the module has no staging log or the log is complete.
///
/// # Errors
///
/// `NotFound` for untracked modules, otherwise the executor's error.
pub async fn staging_log<F: ClientFactory>(
    conn: &ServerConnection<F>,
    module_id: &str,
    offset: u64,
    cancel: &CancellationToken,
) -> Result<Option<String>, DeployError> {
    let staging_file = conn
        .modules()
        .get(module_id)
        .ok_or_else(|| DeployError::NotFound(module_id.to_string()))?
        .starting_info
        .as_ref()
        .and_then(|s| s.staging_file.clone());
    let Some(staging_file) = staging_file else {
        return Ok(None);
    };
    let policy = RetryPolicy::staging_within(conn.timeouts(), SHORT_INTERVAL);
    conn.execute("staging logs", policy, cancel, |c| {
        let file = staging_file.as_str();
        async move { c.get_staging_logs(file, offset).await }
    })
    .await
}
