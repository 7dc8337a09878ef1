//! Unit tests for server-wide publish.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::Ordering;

use stratus_cli::application::services::deploy::deploy_or_start;
use stratus_cli::application::services::publish::{
    PublishKind, mark_changed, publish, publish_candidates,
};
use stratus_cli::application::services::reconcile::refresh_modules;
use stratus_cli::domain::{DeployError, DeploymentInfo, PublishState, UploadPayload};
use stratus_common::{AppState, CloudApplication};
use tokio_util::sync::CancellationToken;

use crate::mocks::{MockArchives, MockServer, connection, demo_deployment, track};

fn app_named(name: &str) -> DeploymentInfo {
    DeploymentInfo {
        deployment_name: Some(name.to_string()),
        uris: Vec::new(),
        ..demo_deployment()
    }
}

#[tokio::test]
async fn incremental_publish_only_covers_stale_deployed_modules() {
    let server = MockServer::new()
        .with_app(CloudApplication::new("fresh", AppState::Running))
        .with_app(CloudApplication::new("stale", AppState::Running));
    let (conn, _) = connection(&server);
    track(&conn, "fresh", app_named("fresh"));
    track(&conn, "stale", app_named("stale"));
    track(&conn, "new", app_named("new"));
    refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");
    conn.with_module("fresh", |m| m.publish = PublishState::None);

    assert_eq!(
        publish_candidates(&conn, PublishKind::Incremental),
        ["stale".to_string()]
    );
    assert_eq!(publish_candidates(&conn, PublishKind::Clean).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_module_does_not_stop_the_others() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "a-bad", DeploymentInfo { memory: 0, ..app_named("bad") });
    track(&conn, "b-good", app_named("good"));
    conn.set_publish_state(PublishState::Incremental);

    let report = publish(
        &conn,
        &MockArchives::default(),
        PublishKind::Clean,
        &CancellationToken::new(),
    )
    .await
    .expect("publish runs");

    assert!(!report.is_success());
    assert_eq!(report.published, ["b-good".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "a-bad");
    assert!(matches!(report.failed[0].1, DeployError::Validation(_)));
    assert_eq!(conn.status().publish, PublishState::Incremental);
}

#[tokio::test(start_paused = true)]
async fn successful_publish_clears_server_publish_state() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    conn.set_publish_state(PublishState::Incremental);

    let report = publish(
        &conn,
        &MockArchives::default(),
        PublishKind::Clean,
        &CancellationToken::new(),
    )
    .await
    .expect("publish");

    assert!(report.is_success());
    assert_eq!(conn.status().publish, PublishState::None);
    assert_eq!(
        conn.modules().get("demo").unwrap().publish,
        PublishState::None
    );
}

#[tokio::test]
async fn cancellation_aborts_the_whole_publish() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = publish(&conn, &MockArchives::default(), PublishKind::Clean, &cancel)
        .await
        .expect_err("canceled");

    assert!(err.is_canceled());
}

#[tokio::test(start_paused = true)]
async fn clean_publish_uploads_full_archive_for_incremental_module() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(
        &conn,
        "demo",
        DeploymentInfo {
            incremental: true,
            ..demo_deployment()
        },
    );
    let archives = MockArchives {
        changed: Some(vec!["app.js".to_string()]),
        ..MockArchives::default()
    };

    let report = publish(&conn, &archives, PublishKind::Clean, &CancellationToken::new())
        .await
        .expect("publish");

    assert!(report.is_success());
    assert_eq!(archives.full_builds.load(Ordering::SeqCst), 1);
    assert_eq!(server.count("match_resources"), 0);
    assert!(matches!(server.uploads()[0].payload, UploadPayload::Bytes(_)));
    assert!(conn.modules().get("demo").unwrap().deployment().incremental);
}

#[tokio::test(start_paused = true)]
async fn pushed_module_stays_up_to_date_after_reload() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let cancel = CancellationToken::new();
    deploy_or_start(&conn, &MockArchives::default(), &["demo".to_string()], &cancel)
        .await
        .expect("deploy");
    let records = conn.records();

    let (reloaded, _) = connection(&server);
    reloaded.load_records(records);
    refresh_modules(&reloaded, &cancel).await.expect("refresh");

    assert!(publish_candidates(&reloaded, PublishKind::Incremental).is_empty());
}

#[tokio::test]
async fn changed_files_make_up_to_date_module_a_candidate() {
    let server = MockServer::new().with_app(CloudApplication::new("demo", AppState::Running));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");
    conn.with_module("demo", |m| m.publish = PublishState::None);

    let unchanged = MockArchives {
        changed: Some(Vec::new()),
        ..MockArchives::default()
    };
    mark_changed(&conn, &unchanged).await;
    assert!(publish_candidates(&conn, PublishKind::Incremental).is_empty());

    let edited = MockArchives {
        changed: Some(vec!["app.js".to_string()]),
        ..MockArchives::default()
    };
    mark_changed(&conn, &edited).await;
    assert_eq!(
        conn.modules().get("demo").unwrap().publish,
        PublishState::Incremental
    );
    assert_eq!(
        publish_candidates(&conn, PublishKind::Incremental),
        ["demo".to_string()]
    );
}
