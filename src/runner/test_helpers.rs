//! Shared test helpers: a scripted job service and in-memory sinks.

use crate::config::Config;
use crate::error::{Error, Result, ServiceError};
use crate::runner::JobRunner;
use crate::service::{JobService, ResultPayload};
use crate::sink::ArtifactSink;
use crate::types::{Artifact, JobHandle, JobRequest, JobState, JobStatus, RunState};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Poll interval used by most runner tests
pub(crate) const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) fn running(progress: f64, message: &str) -> JobStatus {
    JobStatus {
        state: JobState::Running,
        progress,
        message: message.to_string(),
    }
}

pub(crate) fn completed() -> JobStatus {
    JobStatus {
        state: JobState::Completed,
        progress: 100.0,
        message: "done".to_string(),
    }
}

pub(crate) fn failed(message: &str) -> JobStatus {
    JobStatus {
        state: JobState::Failed,
        progress: 0.0,
        message: message.to_string(),
    }
}

pub(crate) fn payload(bytes: &[u8], filename: Option<&str>) -> ResultPayload {
    ResultPayload {
        bytes: bytes.to_vec(),
        suggested_filename: filename.map(str::to_string),
        content_type: None,
    }
}

pub(crate) fn valid_request() -> JobRequest {
    JobRequest::from_form("ana", "secret", "2024-01-01", "2024-01-31", "processed").unwrap()
}

/// Pops scripted replies in order and repeats the last one once the script
/// runs out
struct Script<T: Clone> {
    replies: Mutex<VecDeque<T>>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    fn set(&self, replies: Vec<T>) {
        *self.replies.lock().unwrap() = replies.into();
    }

    fn next(&self) -> T {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or_else(|| self.fallback.clone())
        }
    }
}

/// In-memory [`JobService`] that replays a script and records every call
pub(crate) struct ScriptedService {
    submits: Script<std::result::Result<JobHandle, ServiceError>>,
    statuses: Script<std::result::Result<JobStatus, ServiceError>>,
    results: Script<std::result::Result<ResultPayload, ServiceError>>,
    status_delay: Mutex<Duration>,
    pub(crate) submit_gate: Option<Arc<Semaphore>>,
    pub(crate) fetch_gate: Option<Arc<Semaphore>>,
    pub(crate) submit_calls: AtomicUsize,
    pub(crate) status_calls: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
    pub(crate) cancel_calls: AtomicUsize,
    status_calls_by_job: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self {
            submits: Script::new(Ok(JobHandle::new("job-1"))),
            statuses: Script::new(Ok(running(0.0, ""))),
            results: Script::new(Ok(payload(b"report-bytes", None))),
            status_delay: Mutex::new(Duration::ZERO),
            submit_gate: None,
            fetch_gate: None,
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            status_calls_by_job: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_submits(
        self,
        replies: Vec<std::result::Result<JobHandle, ServiceError>>,
    ) -> Self {
        self.submits.set(replies);
        self
    }

    pub(crate) fn with_statuses(
        self,
        replies: Vec<std::result::Result<JobStatus, ServiceError>>,
    ) -> Self {
        self.statuses.set(replies);
        self
    }

    pub(crate) fn with_result(self, reply: std::result::Result<ResultPayload, ServiceError>) -> Self {
        self.results.set(vec![reply]);
        self
    }

    pub(crate) fn with_status_delay(self, delay: Duration) -> Self {
        *self.status_delay.lock().unwrap() = delay;
        self
    }

    /// Block `submit` until the returned semaphore gets a permit
    pub(crate) fn with_submit_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    /// Block `fetch_result` until the returned semaphore gets a permit
    pub(crate) fn with_fetch_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.fetch_gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls_for(&self, job_id: &str) -> usize {
        self.status_calls_by_job
            .lock()
            .unwrap()
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }
}

async fn pass(gate: &Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        gate.acquire().await.unwrap().forget();
    }
}

#[async_trait]
impl JobService for ScriptedService {
    async fn submit(&self, _request: &JobRequest) -> std::result::Result<JobHandle, ServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.submit_gate).await;
        self.submits.next()
    }

    async fn status(&self, handle: &JobHandle) -> std::result::Result<JobStatus, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .status_calls_by_job
            .lock()
            .unwrap()
            .entry(handle.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.statuses.next()
    }

    async fn fetch_result(
        &self,
        _handle: &JobHandle,
    ) -> std::result::Result<ResultPayload, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.fetch_gate).await;
        self.results.next()
    }

    async fn cancel(&self, _handle: &JobHandle) -> std::result::Result<(), ServiceError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that keeps delivered artifacts in memory
#[derive(Default)]
pub(crate) struct MemorySink {
    pub(crate) delivered: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    pub(crate) fn artifacts(&self) -> Vec<Artifact> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        self.delivered.lock().unwrap().push(artifact.clone());
        Ok(PathBuf::from(&artifact.filename))
    }
}

/// Sink that always fails
pub(crate) struct FailingSink;

#[async_trait]
impl ArtifactSink for FailingSink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        Err(Error::Delivery {
            path: PathBuf::from(&artifact.filename),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.polling.interval = TEST_POLL_INTERVAL;
    config
}

/// Runner over a scripted service and an in-memory sink
pub(crate) fn create_test_runner(
    service: ScriptedService,
) -> (JobRunner, Arc<ScriptedService>, Arc<MemorySink>) {
    create_test_runner_with_config(service, test_config())
}

pub(crate) fn create_test_runner_with_config(
    service: ScriptedService,
    config: Config,
) -> (JobRunner, Arc<ScriptedService>, Arc<MemorySink>) {
    let service = Arc::new(service);
    let sink = Arc::new(MemorySink::default());
    let runner = JobRunner::new(config, service.clone(), sink.clone()).unwrap();
    (runner, service, sink)
}

/// Wait (bounded) until the runner's state satisfies `predicate`
pub(crate) async fn wait_for_state(
    runner: &JobRunner,
    predicate: impl Fn(&RunState) -> bool,
) -> RunState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = runner.state().await;
        if predicate(&state) {
            return state;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for state, last: {:?}",
            state
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Wait (bounded) for the run to reach a terminal phase
pub(crate) async fn wait_terminal(runner: &JobRunner) -> RunState {
    tokio::time::timeout(Duration::from_secs(5), runner.wait_until_terminal())
        .await
        .expect("run did not reach a terminal phase in time")
}

/// Collect every broadcast snapshot up to and including the first terminal one
pub(crate) async fn collect_until_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<RunState>,
) -> Vec<RunState> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            let state = rx.recv().await.unwrap();
            let done = state.phase.is_terminal();
            seen.push(state);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("run did not reach a terminal phase in time");
    seen
}
