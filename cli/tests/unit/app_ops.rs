//! Unit tests for connection, reconfiguration, delete and service
//! operations on deployed applications.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::Ordering;

use stratus_cli::application::services::app_ops;
use stratus_cli::application::services::reconcile::refresh_modules;
use stratus_cli::domain::{
    DebugSupport, DeployError, DeploymentInfo, ModuleStatus, PublishState, ServerState,
};
use stratus_common::{AppState, CloudApplication, CloudService, StartingInfo};
use tokio_util::sync::CancellationToken;

use crate::mocks::{
    MockFactory, MockServer, SERVER_URL, STAGING_FILE, TestConnection, connection,
    demo_deployment, track,
};

fn running(name: &str, services: &[&str]) -> CloudApplication {
    let mut app = CloudApplication::new(name, AppState::Running);
    app.memory = 512;
    app.services = services.iter().map(ToString::to_string).collect();
    app
}

fn deployed(conn: &TestConnection, module_id: &str, app: CloudApplication) {
    track(
        conn,
        module_id,
        DeploymentInfo {
            deployment_name: Some(app.name.clone()),
            services: app.services.clone(),
            ..demo_deployment()
        },
    );
    conn.bind_snapshot(module_id, app);
}

// ── Connection lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn connect_logs_in_refreshes_and_starts_server() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, events) = connection(&server);
    track(&conn, "demo", demo_deployment());

    app_ops::connect(&conn, &CancellationToken::new())
        .await
        .expect("connect");

    assert_eq!(server.requests(), ["login", "get_applications"]);
    assert_eq!(events.events(), ["server_refreshed"]);
    let status = conn.status();
    assert_eq!(status.state, ServerState::Started);
    assert_eq!(status.publish, PublishState::None);
    assert_eq!(
        conn.modules().get("demo").unwrap().status,
        ModuleStatus::Started
    );
}

#[tokio::test]
async fn disconnect_forgets_remote_state_and_session() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, events) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let cancel = CancellationToken::new();
    app_ops::connect(&conn, &cancel).await.expect("connect");

    app_ops::disconnect(&conn).await;

    assert_eq!(conn.status().state, ServerState::Stopped);
    assert!(!conn.refresh().is_active());
    let modules = conn.modules();
    let module = modules.get("demo").unwrap();
    assert!(module.snapshot().is_none());
    assert_eq!(module.status, ModuleStatus::Unknown);
    drop(modules);
    assert!(events.has("close_all_tunnels"));

    refresh_modules(&conn, &cancel).await.expect("refresh");
    assert_eq!(server.clients_created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn update_password_continues_with_new_credentials() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    let cancel = CancellationToken::new();

    app_ops::update_password(&conn, "n3w-secret", &cancel)
        .await
        .expect("password changed");
    refresh_modules(&conn, &cancel).await.expect("refresh");

    assert_eq!(server.count("update_password"), 1);
    assert_eq!(server.clients_created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn register_account_runs_outside_any_session() {
    let server = MockServer::new();
    let factory = MockFactory {
        server: Arc::clone(&server),
    };

    app_ops::register_account(&factory, SERVER_URL, "new@example.com", "pw")
        .await
        .expect("registered");

    assert_eq!(server.calls(), ["register"]);
}

#[tokio::test]
async fn debug_support_is_checked_once_per_session() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    let cancel = CancellationToken::new();

    let first = app_ops::debug_support(&conn, &cancel).await.expect("info");
    let second = app_ops::debug_support(&conn, &cancel).await.expect("cached");

    assert_eq!(first, DebugSupport::Supported);
    assert_eq!(second, DebugSupport::Supported);
    assert_eq!(server.count("info"), 1);
}

// ── Tracking ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn external_app_can_be_adopted_after_refresh() {
    let server = MockServer::new().with_app(running("legacy", &["db"]));
    let (conn, _) = connection(&server);
    refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");

    let id = app_ops::track_external(&conn, "legacy").expect("adopted");

    let modules = conn.modules();
    let module = modules.get(&id).unwrap();
    assert!(module.external);
    assert_eq!(module.publish, PublishState::None);
    assert_eq!(module.status, ModuleStatus::Started);
    assert_eq!(module.deployment().memory, 512);
    assert_eq!(module.deployment().services, ["db".to_string()]);
    assert_eq!(modules.external().count(), 0);
}

#[tokio::test]
async fn unknown_external_app_is_not_found() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);

    let err = app_ops::track_external(&conn, "nope").expect_err("unknown");

    assert!(matches!(err, DeployError::NotFound(name) if name == "nope"));
}

#[tokio::test]
async fn second_module_for_same_app_is_rejected() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = app_ops::track_module(
        &conn,
        stratus_cli::domain::ApplicationModule::new("demo-copy", demo_deployment()),
    )
    .expect_err("name in use");

    assert!(matches!(err, DeployError::Validation(_)));
}

// ── Scale and reconfigure ─────────────────────────────────────────────────────

#[tokio::test]
async fn zero_memory_is_rejected_without_remote_calls() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = app_ops::update_memory(&conn, "demo", 0, &CancellationToken::new())
        .await
        .expect_err("zero memory");

    assert!(matches!(err, DeployError::Validation(_)));
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn memory_change_is_applied_and_recorded() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let app = app_ops::update_memory(&conn, "demo", 1024, &CancellationToken::new())
        .await
        .expect("memory");

    assert_eq!(app.memory, 1024);
    let modules = conn.modules();
    let module = modules.get("demo").unwrap();
    assert_eq!(module.deployment().memory, 1024);
    assert_eq!(module.snapshot().unwrap().app.memory, 1024);
}

#[tokio::test]
async fn instances_change_rebinds_snapshot() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let app = app_ops::update_instances(&conn, "demo", 3, &CancellationToken::new())
        .await
        .expect("instances");

    assert_eq!(app.instances, 3);
    assert_eq!(
        conn.modules().get("demo").unwrap().snapshot().unwrap().app.instances,
        3
    );
}

#[tokio::test]
async fn url_change_is_applied_and_recorded() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let uris = vec!["shop.apps.example.com".to_string()];

    app_ops::update_uris(&conn, "demo", uris.clone(), &CancellationToken::new())
        .await
        .expect("uris");

    assert_eq!(server.app("demo").unwrap().uris, uris);
    assert_eq!(conn.modules().get("demo").unwrap().deployment().uris, uris);
}

#[tokio::test]
async fn unbinding_from_tunnel_app_closes_that_tunnel() {
    let server = MockServer::new().with_app(running("caldecott", &["db", "cache"]));
    let (conn, events) = connection(&server);
    deployed(&conn, "tunnel", running("caldecott", &["db", "cache"]));

    app_ops::update_services(&conn, "tunnel", vec!["db".to_string()], &CancellationToken::new())
        .await
        .expect("services");

    assert!(events.has("close_tunnel:cache"));
    assert!(!events.has("close_tunnel:db"));
    assert!(events.has("services_updated"));
    assert_eq!(
        conn.modules().get("tunnel").unwrap().deployment().services,
        ["db".to_string()]
    );
}

#[tokio::test]
async fn blank_service_binding_is_rejected() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = app_ops::update_services(
        &conn,
        "demo",
        vec!["db".to_string(), "  ".to_string()],
        &CancellationToken::new(),
    )
    .await
    .expect_err("blank");

    assert!(matches!(err, DeployError::Validation(_)));
    assert!(server.calls().is_empty());
}

// ── Delete ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_apps_services_and_modules() {
    let server = MockServer::new().with_app(running("demo", &["db", " "]));
    server.add_service("db");
    let (conn, _) = connection(&server);
    deployed(&conn, "demo", running("demo", &["db"]));
    track(
        &conn,
        "ghost",
        DeploymentInfo {
            deployment_name: Some("ghost".to_string()),
            ..demo_deployment()
        },
    );

    let deleted = app_ops::delete_modules(
        &conn,
        &["demo".to_string(), "ghost".to_string()],
        true,
        &CancellationToken::new(),
    )
    .await
    .expect("delete");

    assert_eq!(deleted, ["db".to_string()]);
    assert!(server.app("demo").is_none());
    assert_eq!(server.count("delete_application"), 1);
    assert_eq!(server.count("delete_service"), 1);
    assert!(conn.modules().is_empty());
    assert!(conn.refresh().is_active());
}

#[tokio::test]
async fn delete_keeps_services_unless_asked() {
    let server = MockServer::new().with_app(running("demo", &["db"]));
    let (conn, _) = connection(&server);
    deployed(&conn, "demo", running("demo", &["db"]));

    app_ops::delete_modules(&conn, &["demo".to_string()], false, &CancellationToken::new())
        .await
        .expect("delete");

    assert_eq!(server.count("delete_service"), 0);
}

// ── Services and domains ──────────────────────────────────────────────────────

#[tokio::test]
async fn service_lifecycle_notifies_listener() {
    let server = MockServer::new();
    let (conn, events) = connection(&server);
    let cancel = CancellationToken::new();
    let service = CloudService {
        name: "orders-db".to_string(),
        label: Some("postgresql".to_string()),
        plan: Some("free".to_string()),
        version: None,
    };

    app_ops::create_service(&conn, &service, &cancel)
        .await
        .expect("create");
    let listed = app_ops::list_services(&conn, &cancel).await.expect("list");
    assert_eq!(listed, [service]);

    app_ops::delete_services_by_name(&conn, &["orders-db".to_string()], &cancel)
        .await
        .expect("delete");
    assert!(app_ops::list_services(&conn, &cancel).await.expect("list").is_empty());
    assert!(events.has("services_updated"));
    assert!(events.has("close_tunnel:orders-db"));
}

#[tokio::test]
async fn blank_service_name_is_not_created() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    let service = CloudService {
        name: " ".to_string(),
        label: None,
        plan: None,
        version: None,
    };

    let err = app_ops::create_service(&conn, &service, &CancellationToken::new())
        .await
        .expect_err("blank");

    assert!(matches!(err, DeployError::Validation(_)));
}

#[tokio::test]
async fn url_lookup_validates_against_space_domains() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);

    let lookup = app_ops::url_lookup(&conn, &CancellationToken::new())
        .await
        .expect("lookup");

    let url = lookup.validate("https://Shop.apps.example.com").expect("valid");
    assert_eq!(url.host, "shop");
    assert_eq!(url.domain, "apps.example.com");
    assert!(lookup.validate("shop.elsewhere.org").is_err());
    assert_eq!(
        lookup.suggest("My_App").map(|u| u.to_string()).as_deref(),
        Some("my-app.apps.example.com")
    );
}

// ── Stats and logs ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stats_are_bound_to_the_snapshot() {
    let server = MockServer::new().with_app(running("demo", &[]));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let snapshot = app_ops::refresh_module_stats(&conn, "demo", &CancellationToken::new())
        .await
        .expect("stats");

    assert!(snapshot.stats.is_some());
    let modules = conn.modules();
    let bound = modules.get("demo").unwrap().snapshot().unwrap();
    assert!(bound.stats.is_some());
    assert!(bound.instances.is_some());
}

#[tokio::test]
async fn staging_log_is_none_without_a_start() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let log = app_ops::staging_log(&conn, "demo", 0, &CancellationToken::new())
        .await
        .expect("log");

    assert!(log.is_none());
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn staging_log_reads_from_offset() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    conn.with_module("demo", |m| {
        m.starting_info = Some(StartingInfo {
            staging_file: Some(STAGING_FILE.to_string()),
        });
    });
    let cancel = CancellationToken::new();

    let log = app_ops::staging_log(&conn, "demo", 0, &cancel)
        .await
        .expect("log")
        .expect("content");
    assert!(log.contains("staged"));

    let offset = u64::try_from(log.len()).unwrap();
    let rest = app_ops::staging_log(&conn, "demo", offset, &cancel)
        .await
        .expect("log");
    assert!(rest.is_none());
}
