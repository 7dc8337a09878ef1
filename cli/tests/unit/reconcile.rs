//! Unit tests for module reconciliation and the periodic refresh task.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use stratus_cli::application::services::reconcile::{refresh_modules, spawn_periodic_refresh};
use stratus_cli::domain::{DeploymentInfo, ModuleStatus};
use stratus_common::{AppState, CloudApplication};
use tokio_util::sync::CancellationToken;

use crate::mocks::{MockServer, connection, track};

fn named(app: &str) -> DeploymentInfo {
    DeploymentInfo {
        deployment_name: Some(app.to_string()),
        memory: 256,
        ..DeploymentInfo::default()
    }
}

#[tokio::test]
async fn refresh_partitions_apps_into_bound_external_and_cleared() {
    let server = MockServer::new()
        .with_app(CloudApplication::new("A", AppState::Running))
        .with_app(CloudApplication::new("B", AppState::Stopped));
    let (conn, _) = connection(&server);
    track(&conn, "mod-b", named("B"));
    track(&conn, "mod-c", named("C"));
    conn.bind_snapshot("mod-c", CloudApplication::new("C", AppState::Running));

    let report = refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");

    assert_eq!(report.external, ["A".to_string()]);
    assert_eq!(report.updated, ["mod-b".to_string()]);
    assert_eq!(report.cleared, ["mod-c".to_string()]);

    let modules = conn.modules();
    assert_eq!(modules.get("mod-b").unwrap().status, ModuleStatus::Stopped);
    assert!(modules.get("mod-c").unwrap().snapshot().is_none());
    assert_eq!(modules.get("mod-c").unwrap().status, ModuleStatus::Unknown);
    let external: Vec<_> = modules.external().map(|a| a.name.clone()).collect();
    assert_eq!(external, ["A".to_string()]);
}

#[tokio::test]
async fn failed_module_stays_failed_until_app_runs() {
    let server = MockServer::new().with_app(CloudApplication::new("B", AppState::Stopped));
    let (conn, _) = connection(&server);
    track(&conn, "mod-b", named("B"));
    conn.with_module("mod-b", |m| m.fail("start timed out"));
    let cancel = CancellationToken::new();

    refresh_modules(&conn, &cancel).await.expect("refresh");
    assert_eq!(
        conn.modules().get("mod-b").unwrap().status,
        ModuleStatus::Failed
    );

    server.with_app(CloudApplication::new("B", AppState::Running));
    refresh_modules(&conn, &cancel).await.expect("refresh");
    assert_eq!(
        conn.modules().get("mod-b").unwrap().status,
        ModuleStatus::Started
    );
}

#[tokio::test]
async fn refresh_leaves_deployment_info_alone() {
    let mut remote = CloudApplication::new("B", AppState::Running);
    remote.memory = 2048;
    let server = MockServer::new().with_app(remote);
    let (conn, _) = connection(&server);
    track(&conn, "mod-b", named("B"));

    refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");

    let modules = conn.modules();
    let module = modules.get("mod-b").unwrap();
    assert_eq!(module.deployment().memory, 256);
    assert_eq!(module.snapshot().unwrap().app.memory, 2048);
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_follows_schedule_pause_and_cancel() {
    let server = MockServer::new().with_app(CloudApplication::new("A", AppState::Running));
    let (conn, _) = connection(&server);
    let conn = Arc::new(conn);
    let cancel = CancellationToken::new();
    let interval = conn.refresh().current().interval.expect("enabled by default");

    let task = spawn_periodic_refresh(Arc::clone(&conn), cancel.clone());

    tokio::time::sleep(interval + Duration::from_secs(1)).await;
    assert_eq!(server.count("get_applications"), 1);

    let pause = conn.refresh().pause();
    tokio::time::sleep(interval * 3).await;
    assert_eq!(server.count("get_applications"), 1, "no refresh while paused");

    drop(pause);
    tokio::time::sleep(interval + Duration::from_secs(1)).await;
    assert_eq!(server.count("get_applications"), 2);

    conn.refresh().set_interval(None);
    tokio::time::sleep(interval * 3).await;
    assert_eq!(server.count("get_applications"), 2, "no refresh when disabled");

    cancel.cancel();
    task.await.expect("refresh task exits cleanly");
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_survives_failed_rounds() {
    let server = MockServer::new();
    server.fail_next(
        "get_applications",
        stratus_cli::domain::CloudError::http(500, "boom"),
    );
    let (conn, _) = connection(&server);
    let conn = Arc::new(conn);
    let cancel = CancellationToken::new();
    let interval = conn.refresh().current().interval.expect("enabled by default");

    let task = spawn_periodic_refresh(Arc::clone(&conn), cancel.clone());
    tokio::time::sleep(interval * 2 + Duration::from_secs(1)).await;

    assert_eq!(server.count("get_applications"), 2);
    cancel.cancel();
    task.await.expect("refresh task exits cleanly");
}
