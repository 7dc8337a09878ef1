//! Unit tests for the deployment state machine: push, start, restart and
//! stop against the in-memory control plane.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use stratus_cli::application::services::deploy::{self, Stage};
use stratus_cli::application::services::{app_ops, reconcile};
use stratus_cli::domain::{
    DeployError, DeploymentInfo, LaunchMode, ModuleStatus, PublishState, UploadPayload,
};
use stratus_common::{AppState, CloudApplication, DebugMode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::mocks::{
    DecliningPrompt, MockArchives, MockServer, StartBehaviour, TestConnection, connection,
    demo_deployment, track,
};

fn ids(id: &str) -> Vec<String> {
    vec![id.to_string()]
}

fn status(conn: &TestConnection, id: &str) -> ModuleStatus {
    conn.modules().get(id).expect("tracked").status
}

fn publish(conn: &TestConnection, id: &str) -> PublishState {
    conn.modules().get(id).expect("tracked").publish
}

// ── Push and start ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_push_creates_uploads_and_starts_demo() {
    let server = MockServer::new();
    let (conn, events) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let outcome = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect("deploy");

    assert_eq!(outcome.stage, Stage::Started);
    assert_eq!(outcome.app.as_ref().map(|a| a.state), Some(AppState::Running));
    assert_eq!(
        server.requests(),
        [
            "get_applications",
            "create_application",
            "upload_application",
            "get_application",
            "stop_application",
            "start_application",
            "get_application",
        ]
    );

    let created = server.app("demo").expect("created");
    assert_eq!(created.memory, 512);
    assert_eq!(created.uris, ["demo.apps.example.com".to_string()]);

    let modules = conn.modules();
    let module = modules.get("demo").expect("tracked");
    assert_eq!(module.status, ModuleStatus::Started);
    assert_eq!(module.publish, PublishState::None);
    assert!(module.last_deployed_at.is_some());
    assert!(module.last_error.is_none());
    assert_eq!(
        module.starting_info.as_ref().and_then(|s| s.staging_file.as_deref()),
        Some(crate::mocks::STAGING_FILE)
    );
    drop(modules);

    assert_eq!(
        events.events(),
        ["about_to_start:demo", "starting:demo", "started:demo"]
    );
    assert!(conn.refresh().is_active(), "refresh resumes after the flow");
}

#[tokio::test(start_paused = true)]
async fn existing_app_is_not_created_again() {
    let server = MockServer::new().with_app(CloudApplication::new("demo", AppState::Stopped));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let outcome = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect("deploy");

    assert_eq!(outcome.stage, Stage::Started);
    assert_eq!(server.count("create_application"), 0);
    assert_eq!(server.count("upload_application"), 1);
}

#[tokio::test(start_paused = true)]
async fn push_without_launch_mode_stops_after_upload() {
    let server = MockServer::new();
    let (conn, events) = connection(&server);
    track(
        &conn,
        "demo",
        DeploymentInfo {
            mode: None,
            ..demo_deployment()
        },
    );

    let outcome = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect("deploy");

    assert_eq!(outcome.stage, Stage::Stopped);
    assert_eq!(server.count("start_application"), 0);
    assert_eq!(server.count("stop_application"), 0);
    assert_eq!(status(&conn, "demo"), ModuleStatus::Stopped);
    assert!(events.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn incremental_push_uploads_only_uncached_files() {
    let server = MockServer::new();
    server.cache("index.html");
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

    deploy::deploy_or_start(&conn, &archives, &ids("demo"), &CancellationToken::new())
        .await
        .expect("deploy");

    let uploads = server.uploads();
    assert_eq!(uploads.len(), 1);
    let UploadPayload::Entries(sent) = &uploads[0].payload else {
        panic!("expected an entry upload, got {:?}", uploads[0].payload);
    };
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].path, "app.js");
    assert_eq!(uploads[0].resources.len(), 1);
    assert_eq!(uploads[0].resources[0].path, "index.html");
    assert_eq!(archives.full_builds.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_change_set_falls_back_to_full_archive() {
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
    let archives = MockArchives::default();

    deploy::deploy_or_start(&conn, &archives, &ids("demo"), &CancellationToken::new())
        .await
        .expect("deploy");

    assert_eq!(archives.full_builds.load(Ordering::SeqCst), 1);
    assert_eq!(server.count("match_resources"), 0);
    assert!(matches!(server.uploads()[0].payload, UploadPayload::Bytes(_)));
}

#[tokio::test(start_paused = true)]
async fn archive_failure_fails_module_before_any_create() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let archives = MockArchives {
        fail_full: true,
        ..MockArchives::default()
    };

    let err = deploy::deploy_or_start(&conn, &archives, &ids("demo"), &CancellationToken::new())
        .await
        .expect_err("no archive");

    assert!(matches!(err, DeployError::Archive(_)), "unexpected error: {err:?}");
    assert!(server.requests().is_empty());
    assert_eq!(status(&conn, "demo"), ModuleStatus::Failed);
    assert_eq!(publish(&conn, "demo"), PublishState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn external_module_is_launched_without_push() {
    let mut legacy = CloudApplication::new("legacy", AppState::Stopped);
    legacy.memory = 256;
    let server = MockServer::new().with_app(legacy);
    let (conn, _) = connection(&server);
    reconcile::refresh_modules(&conn, &CancellationToken::new())
        .await
        .expect("refresh");
    app_ops::track_external(&conn, "legacy").expect("adopt");
    conn.with_module("legacy", |m| {
        let mut copy = m.working_copy();
        copy.set_mode(Some(LaunchMode::Run));
        m.commit(copy);
    });

    let outcome = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("legacy"),
        &CancellationToken::new(),
    )
    .await
    .expect("start");

    assert_eq!(outcome.stage, Stage::Started);
    assert_eq!(server.count("upload_application"), 0);
    assert_eq!(server.count("create_application"), 0);
}

#[tokio::test(start_paused = true)]
async fn declined_completion_prompt_cancels_without_remote_calls() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    let conn = conn.with_prompt(Arc::new(DecliningPrompt));
    track(&conn, "demo", demo_deployment());

    let err = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect_err("declined");

    assert!(err.is_canceled());
    assert!(server.calls().is_empty());
    assert_eq!(status(&conn, "demo"), ModuleStatus::Unknown);
}

#[tokio::test]
async fn untracked_module_is_not_found() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);

    let err = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("ghost"),
        &CancellationToken::new(),
    )
    .await
    .expect_err("untracked");

    assert!(matches!(err, DeployError::NotFound(id) if id == "ghost"));
}

// ── Readiness failures ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn staging_that_never_finishes_fails_only_after_deployment_timeout() {
    let server = MockServer::new();
    server.set_start(StartBehaviour::NeverStages);
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let deployment_timeout = conn.timeouts().deployment;
    let started = Instant::now();

    let err = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect_err("never stages");

    assert!(
        started.elapsed() >= deployment_timeout,
        "failed after {:?}",
        started.elapsed()
    );
    assert!(
        matches!(&err, DeployError::Remote { label, .. } if label == "wait for start"),
        "unexpected error: {err:?}"
    );
    let modules = conn.modules();
    let module = modules.get("demo").expect("tracked");
    assert_eq!(module.status, ModuleStatus::Failed);
    assert!(module.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn app_that_never_runs_times_out() {
    let server = MockServer::new();
    server.set_start(StartBehaviour::NeverRuns);
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        &CancellationToken::new(),
    )
    .await
    .expect_err("never runs");

    assert!(
        matches!(&err, DeployError::Timeout { name, timeout } if name == "demo" && *timeout == Duration::from_secs(600)),
        "unexpected error: {err:?}"
    );
    assert_eq!(status(&conn, "demo"), ModuleStatus::Failed);
    assert!(conn.refresh().is_active());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_readiness_wait_leaves_module_unknown() {
    let server = MockServer::new();
    server.set_start(StartBehaviour::NeverRuns);
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    let cancel = CancellationToken::new();
    let archives = MockArchives::default();
    let demo = ids("demo");

    let (result, ()) = tokio::join!(
        deploy::deploy_or_start(&conn, &archives, &demo, &cancel),
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert!(!conn.refresh().is_active(), "refresh is paused mid-flow");
            cancel.cancel();
        }
    );

    assert!(matches!(result, Err(DeployError::Canceled)));
    assert_eq!(status(&conn, "demo"), ModuleStatus::Unknown);
    assert_eq!(publish(&conn, "demo"), PublishState::Unknown);
    assert!(conn.refresh().is_active(), "refresh resumes after cancel");
}

// ── Restart and debug ─────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_without_deployment_name_fails_validation_with_no_calls() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(
        &conn,
        "demo",
        DeploymentInfo {
            deployment_name: None,
            ..demo_deployment()
        },
    );

    let err = deploy::restart(&conn, &ids("demo"), &CancellationToken::new())
        .await
        .expect_err("no name");

    assert!(matches!(err, DeployError::Validation(_)), "unexpected error: {err:?}");
    assert!(server.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_stops_then_starts_without_upload() {
    let server = MockServer::new().with_app(CloudApplication::new("demo", AppState::Running));
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let outcome = deploy::restart(&conn, &ids("demo"), &CancellationToken::new())
        .await
        .expect("restart");

    assert_eq!(outcome.stage, Stage::Started);
    assert_eq!(
        server.requests(),
        ["stop_application", "start_application", "get_application"]
    );
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_debug_mode_of_running_app() {
    let mut running = CloudApplication::new("demo", AppState::Running);
    running.debug = Some(DebugMode::Run);
    let server = MockServer::new().with_app(running.clone());
    let (conn, events) = connection(&server);
    track(&conn, "demo", demo_deployment());
    conn.bind_snapshot("demo", running);

    deploy::restart(&conn, &ids("demo"), &CancellationToken::new())
        .await
        .expect("restart");

    assert_eq!(server.count("debug_application"), 1);
    assert_eq!(server.count("start_application"), 0);
    assert!(events.has("attach:demo"));
}

#[tokio::test(start_paused = true)]
async fn debug_launch_requires_server_support() {
    let server = MockServer::new().with_app(CloudApplication::new("demo", AppState::Stopped));
    server.set_allow_debug(false);
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = deploy::restart_debug(&conn, &ids("demo"), &CancellationToken::new())
        .await
        .expect_err("unsupported");

    assert!(matches!(err, DeployError::Validation(_)), "unexpected error: {err:?}");
    assert_eq!(server.count("debug_application"), 0);
    assert_eq!(status(&conn, "demo"), ModuleStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn update_restart_in_debug_stops_running_app_first() {
    let running = CloudApplication::new("demo", AppState::Running);
    let server = MockServer::new().with_app(running.clone());
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());
    conn.bind_snapshot("demo", running);

    let outcome = deploy::update_restart(
        &conn,
        &MockArchives::default(),
        &ids("demo"),
        true,
        &CancellationToken::new(),
    )
    .await
    .expect("update restart");

    assert_eq!(outcome.stage, Stage::Started);
    assert_eq!(server.requests()[0], "stop_application");
    assert_eq!(server.count("stop_application"), 2);
    assert_eq!(server.count("debug_application"), 1);
    let modules = conn.modules();
    let info = modules.get("demo").expect("tracked").deployment();
    assert!(info.incremental);
    assert_eq!(info.mode, Some(LaunchMode::Debug));
}

#[tokio::test(start_paused = true)]
async fn deploying_tunnel_app_closes_tunnels() {
    let server = MockServer::new();
    let (conn, events) = connection(&server);
    track(
        &conn,
        "tunnel",
        DeploymentInfo {
            deployment_name: Some("caldecott".to_string()),
            ..demo_deployment()
        },
    );

    deploy::deploy_or_start(
        &conn,
        &MockArchives::default(),
        &ids("tunnel"),
        &CancellationToken::new(),
    )
    .await
    .expect("deploy");

    assert!(events.has("close_all_tunnels"));
}

// ── Stop ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_marks_module_stopped_and_notifies() {
    let server = MockServer::new().with_app(CloudApplication::new("demo", AppState::Running));
    let (conn, events) = connection(&server);
    track(&conn, "demo", demo_deployment());

    deploy::stop_module(&conn, "demo", &CancellationToken::new())
        .await
        .expect("stop");

    assert_eq!(status(&conn, "demo"), ModuleStatus::Stopped);
    assert_eq!(server.app("demo").expect("app").state, AppState::Stopped);
    assert!(events.has("stopped:demo"));
    assert!(conn.refresh().is_active());
}

#[tokio::test]
async fn failed_stop_leaves_status_unknown() {
    let server = MockServer::new();
    let (conn, _) = connection(&server);
    track(&conn, "demo", demo_deployment());

    let err = deploy::stop_module(&conn, "demo", &CancellationToken::new())
        .await
        .expect_err("no such app");

    assert!(matches!(err, DeployError::Remote { .. }));
    assert_eq!(status(&conn, "demo"), ModuleStatus::Unknown);
}
