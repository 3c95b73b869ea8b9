//! End-to-end runs against a mock job service
//!
//! These tests drive the public API only: a [`JobRunner`](report_dl::JobRunner)
//! built from config, talking HTTP to a wiremock server and saving into a
//! temp directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{create_http_runner, create_http_runner_with, form, wait_for_terminal};
use report_dl::error::CONNECTIVITY_MESSAGE;
use report_dl::{ErrorCategory, JobHandle, Phase};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn status(state: &str, progress: f64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": state,
        "progress": progress,
        "message": message,
    }))
}

async fn mount_submit(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": job_id })))
        .mount(server)
        .await;
}

/// Mount status replies in order; the last one repeats
async fn mount_statuses(server: &MockServer, job_id: &str, replies: Vec<ResponseTemplate>) {
    let count = replies.len();
    for (i, reply) in replies.into_iter().enumerate() {
        let mock = Mock::given(method("GET"))
            .and(path(format!("/jobs/{}/status", job_id)))
            .respond_with(reply);
        let mock = if i + 1 < count {
            mock.up_to_n_times(1)
        } else {
            mock
        };
        mock.mount(server).await;
    }
}

#[tokio::test]
async fn test_full_run_saves_report() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "username": "ana",
            "password": "secret",
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "output_type": "processed",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "abc-123" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_statuses(
        &server,
        "abc-123",
        vec![
            status("running", 10.0, "Logging in"),
            status("running", 55.0, "Downloading reports"),
            status("completed", 100.0, "Done"),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/jobs/abc-123/result"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "content-type",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                )
                .insert_header(
                    "content-disposition",
                    "attachment; filename=\"ventas_enero.xlsx\"",
                )
                .set_body_bytes(b"xlsx-bytes".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (runner, temp_dir) = create_http_runner(&server);
    let mut states = runner.subscribe();

    let handle = runner.start(form("processed")).await.unwrap();
    assert_eq!(handle, JobHandle::new("abc-123"));

    let state = wait_for_terminal(&runner).await;
    assert_eq!(state.phase, Phase::Succeeded);
    assert_eq!(state.progress, 100);
    assert_eq!(state.artifact.as_deref(), Some("ventas_enero.xlsx"));

    let saved = temp_dir.path().join("ventas_enero.xlsx");
    assert_eq!(std::fs::read(&saved).unwrap(), b"xlsx-bytes");

    let mut progress = Vec::new();
    while let Ok(s) = states.try_recv() {
        progress.push(s.progress);
    }
    assert!(progress.contains(&10));
    assert!(progress.contains(&55));
}

#[tokio::test]
async fn test_default_name_and_collision_rename() {
    let server = MockServer::start().await;
    mount_submit(&server, "raw-1").await;
    mount_statuses(&server, "raw-1", vec![status("completed", 100.0, "")]).await;
    Mock::given(method("GET"))
        .and(path("/jobs/raw-1/result"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
        .mount(&server)
        .await;

    let (runner, temp_dir) = create_http_runner(&server);
    std::fs::write(temp_dir.path().join("wansoft_result.zip"), b"older").unwrap();

    runner.start(form("raw")).await.unwrap();
    let state = wait_for_terminal(&runner).await;

    assert_eq!(state.phase, Phase::Succeeded);
    assert_eq!(state.artifact.as_deref(), Some("wansoft_result (1).zip"));
    assert_eq!(
        std::fs::read(temp_dir.path().join("wansoft_result.zip")).unwrap(),
        b"older",
        "existing file is left alone"
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("wansoft_result (1).zip")).unwrap(),
        b"PK\x03\x04"
    );
}

#[tokio::test]
async fn test_server_reported_failure_is_shown_verbatim() {
    let server = MockServer::start().await;
    mount_submit(&server, "bad-1").await;
    mount_statuses(
        &server,
        "bad-1",
        vec![status("failed", 0.0, "invalid credentials")],
    )
    .await;

    let (runner, temp_dir) = create_http_runner(&server);
    runner.start(form("processed")).await.unwrap();
    let state = wait_for_terminal(&runner).await;

    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.error.as_deref(), Some("invalid credentials"));
    assert_eq!(state.failure, Some(ErrorCategory::Remote));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_launch_rejection_detail_reaches_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "Wansoft login failed" })),
        )
        .mount(&server)
        .await;

    let (runner, _temp_dir) = create_http_runner(&server);
    assert!(runner.start(form("processed")).await.is_err());

    let state = runner.state().await;
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.error.as_deref(), Some("Wansoft login failed"));
}

#[tokio::test]
async fn test_unreachable_service() {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = MockServer::start().await;
    let (runner, _temp_dir) = create_http_runner_with(&server, |config| {
        config.service.base_url = format!("http://{}", addr);
    });

    assert!(runner.start(form("processed")).await.is_err());
    let state = runner.state().await;
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.error.as_deref(), Some(CONNECTIVITY_MESSAGE));
    assert_eq!(state.failure, Some(ErrorCategory::Connectivity));
}

#[tokio::test]
async fn test_cancel_stops_polling_and_notifies_server_when_enabled() {
    let server = MockServer::start().await;
    mount_submit(&server, "long-1").await;
    mount_statuses(&server, "long-1", vec![status("running", 30.0, "Working")]).await;
    Mock::given(method("DELETE"))
        .and(path("/jobs/long-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (runner, _temp_dir) = create_http_runner_with(&server, |config| {
        config.polling.interval = Duration::from_secs(30);
        config.polling.notify_server_on_cancel = true;
    });

    runner.start(form("processed")).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while runner.state().await.progress != 30 {
        assert!(tokio::time::Instant::now() < deadline, "first poll never landed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(runner.cancel().await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = runner.state().await;
    assert_eq!(state.phase, Phase::Cancelled);
    assert!(state.error.is_none());

    let requests = server.received_requests().await.unwrap();
    let polls = requests
        .iter()
        .filter(|r| r.url.path() == "/jobs/long-1/status")
        .count();
    assert_eq!(polls, 1, "no status request after cancel");
    // DELETE expectation is verified when the server drops
}
