//! Common test utilities for report-dl integration tests

#![allow(dead_code)]

use report_dl::{Config, JobRequest, JobRunner, RunState};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Poll interval used against the mock server
pub const FAST_POLL: Duration = Duration::from_millis(20);

/// Create a runner talking to `server` and saving into a fresh temp directory
///
/// The TempDir must be kept alive for as long as the runner writes to it.
pub fn create_http_runner(server: &MockServer) -> (JobRunner, TempDir) {
    create_http_runner_with(server, |_| {})
}

/// Same as [`create_http_runner`] with a hook to adjust the config
pub fn create_http_runner_with(
    server: &MockServer,
    adjust: impl FnOnce(&mut Config),
) -> (JobRunner, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.service.base_url = server.uri();
    config.service.auth_token = Some("test-token".to_string());
    config.service.request_timeout = Duration::from_secs(5);
    config.polling.interval = FAST_POLL;
    config.output.download_dir = temp_dir.path().to_path_buf();
    adjust(&mut config);

    let runner = JobRunner::from_config(config).unwrap();
    (runner, temp_dir)
}

/// The form a user would fill in
pub fn form(output: &str) -> JobRequest {
    JobRequest::from_form("ana", "secret", "2024-01-01", "2024-01-31", output).unwrap()
}

/// Wait (bounded) for the run to reach a terminal phase
pub async fn wait_for_terminal(runner: &JobRunner) -> RunState {
    tokio::time::timeout(Duration::from_secs(10), runner.wait_until_terminal())
        .await
        .expect("run did not finish in time")
}
