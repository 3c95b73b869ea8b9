//! Job runner: launch, poll, cancel, retrieve.
//!
//! The `JobRunner` struct and its methods are organized by step:
//! - [`launch`] - Request validation and job submission
//! - [`poll`] - Status polling until the job reaches a terminal state
//! - [`retrieve`] - Artifact fetch and delivery
//! - [`lifecycle`] - Shutdown
//!
//! One runner drives at most one run at a time. All run state sits behind a
//! single mutex together with a generation counter and the run's
//! cancellation token; every mutation made on behalf of a run first checks
//! that the run is still current and not cancelled, under that same lock.
//!
//! Every run's token is a child of the runner's root token. Consumer handles
//! share a drop guard on the root; the background task holds a handle without
//! it, so dropping the last consumer handle stops the task.

mod launch;
mod lifecycle;
mod poll;
mod retrieve;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::service::{HttpJobService, JobService};
use crate::sink::{ArtifactSink, DirectorySink};
use crate::types::{JobHandle, OutputVariant, Phase, RunState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Mutable state shared between the consumer and the run's task
#[derive(Debug, Default)]
pub(crate) struct RunSlot {
    /// What the consumer observes
    pub(crate) state: RunState,
    /// Incremented on every new run or reset
    pub(crate) generation: u64,
    /// Token of the current run, retired when the next run starts
    pub(crate) token: Option<CancellationToken>,
    /// Server handle of the current run, dropped on terminal state
    pub(crate) handle: Option<JobHandle>,
}

/// Everything one run's steps need to know about the run
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
    pub(crate) handle: JobHandle,
    pub(crate) output: OutputVariant,
}

/// Drives report jobs on a remote job service (cloneable - all fields are Arc-wrapped)
///
/// # Examples
///
/// ```no_run
/// use report_dl::{Config, JobRequest, JobRunner};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let runner = JobRunner::from_config(Config::from_env())?;
///
///     let mut states = runner.subscribe();
///     tokio::spawn(async move {
///         while let Ok(state) = states.recv().await {
///             println!("{} {}% {}", state.phase, state.progress, state.message);
///         }
///     });
///
///     let request =
///         JobRequest::from_form("user", "pass", "2024-01-01", "2024-01-31", "processed")?;
///     runner.start(request).await?;
///
///     let finished = runner.wait_until_terminal().await;
///     println!("finished: {:?}", finished);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct JobRunner {
    /// Job service the run talks to
    pub(crate) service: Arc<dyn JobService>,
    /// Receiver of finished artifacts
    pub(crate) sink: Arc<dyn ArtifactSink>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Current run state, generation and token
    pub(crate) slot: Arc<tokio::sync::Mutex<RunSlot>>,
    /// State broadcast channel sender (multiple subscribers supported)
    pub(crate) state_tx: broadcast::Sender<RunState>,
    /// Parent of every run's token, cancelled on shutdown
    pub(crate) root: CancellationToken,
    /// Held by consumer handles only; `None` in the background task's handle
    shutdown_guard: Option<Arc<DropGuard>>,
}

impl JobRunner {
    /// Create a runner over an arbitrary service and sink
    pub fn new(
        config: Config,
        service: Arc<dyn JobService>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _rx) = broadcast::channel(config.event_capacity);
        let root = CancellationToken::new();

        tracing::debug!(service = service.name(), "job runner created");

        Ok(Self {
            service,
            sink,
            config: Arc::new(config),
            slot: Arc::new(tokio::sync::Mutex::new(RunSlot::default())),
            state_tx,
            shutdown_guard: Some(Arc::new(root.clone().drop_guard())),
            root,
        })
    }

    /// Create a runner talking HTTP to the configured service and saving into
    /// the configured download directory
    pub fn from_config(config: Config) -> Result<Self> {
        let service = Arc::new(HttpJobService::new(&config.service)?);
        let sink = Arc::new(DirectorySink::from_config(&config.output));
        Self::new(config, service, sink)
    }

    /// Runner configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to state changes
    ///
    /// Every change to the run state is broadcast as a full snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// State changes as a [`Stream`]
    ///
    /// Snapshots missed by a lagging consumer are skipped.
    pub fn state_stream(&self) -> impl Stream<Item = RunState> + Send + 'static {
        BroadcastStream::new(self.state_tx.subscribe()).filter_map(|item| item.ok())
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> RunState {
        self.slot.lock().await.state.clone()
    }

    /// Handle of the job currently being observed, if any
    pub async fn current_handle(&self) -> Option<JobHandle> {
        self.slot.lock().await.handle.clone()
    }

    /// Cancel the current run
    ///
    /// Only a run that is `starting` or `polling` can be cancelled; the call is
    /// a no-op in any other phase, including while the finished artifact is
    /// being downloaded. Returns whether the run was cancelled by this call.
    ///
    /// Cancelling detaches the client. The job keeps running on the server
    /// unless `notify_server_on_cancel` is enabled.
    pub async fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let phase = slot.state.phase;
        if !phase.is_cancellable() {
            tracing::debug!(%phase, "cancel ignored");
            return false;
        }

        if let Some(token) = &slot.token {
            token.cancel();
        }
        slot.state.phase = Phase::Cancelled;
        slot.state.message = "Cancelled".to_string();
        let handle = slot.handle.take();
        self.emit(&slot.state);
        let generation = slot.generation;
        drop(slot);

        tracing::info!(
            generation,
            job_id = handle.as_ref().map(|h| h.as_str()),
            from = %phase,
            "run cancelled"
        );

        if let Some(handle) = handle {
            self.notify_server_cancel(handle);
        }
        true
    }

    /// Forget the current run and return to `idle`
    ///
    /// An active run is detached the same way a new `start` would detach it.
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        Self::retire(&mut slot);
        slot.state = RunState::default();
        self.emit(&slot.state);
    }

    /// Wait until the current run reaches a terminal phase
    ///
    /// Returns immediately if it already has. Waits indefinitely while the
    /// runner is idle.
    pub async fn wait_until_terminal(&self) -> RunState {
        let mut rx = self.state_tx.subscribe();
        let current = self.state().await;
        if current.phase.is_terminal() {
            return current;
        }

        loop {
            match rx.recv().await {
                Ok(state) if state.phase.is_terminal() => return state,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "state subscriber lagged");
                    let current = self.state().await;
                    if current.phase.is_terminal() {
                        return current;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.state().await,
            }
        }
    }

    /// Start a new generation: retire the previous run and reset to `idle`
    pub(crate) async fn begin_run(&self) -> (u64, CancellationToken) {
        let mut slot = self.slot.lock().await;
        Self::retire(&mut slot);

        let token = self.root.child_token();
        slot.token = Some(token.clone());
        slot.state = RunState::default();
        self.emit(&slot.state);
        (slot.generation, token)
    }

    /// Handle for background tasks; it does not keep the runner alive
    pub(crate) fn worker(&self) -> Self {
        Self {
            shutdown_guard: None,
            ..self.clone()
        }
    }

    fn retire(slot: &mut RunSlot) {
        if let Some(old) = slot.token.take() {
            if !slot.state.phase.is_terminal() && slot.state.phase != Phase::Idle {
                tracing::info!(
                    generation = slot.generation,
                    phase = %slot.state.phase,
                    job_id = slot.handle.as_ref().map(|h| h.as_str()),
                    "detaching from previous run"
                );
            }
            old.cancel();
        }
        slot.generation += 1;
        slot.handle = None;
    }

    /// Apply a state change on behalf of a run
    ///
    /// Returns false, without touching anything, if the run has been
    /// cancelled or superseded.
    pub(crate) async fn apply(
        &self,
        generation: u64,
        token: &CancellationToken,
        update: impl FnOnce(&mut RunState),
    ) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation || token.is_cancelled() {
            return false;
        }
        update(&mut slot.state);
        if slot.state.phase.is_terminal() {
            slot.handle = None;
        }
        self.emit(&slot.state);
        true
    }

    /// Record a failure as the run's terminal state
    pub(crate) async fn fail(
        &self,
        generation: u64,
        token: &CancellationToken,
        error: &Error,
    ) -> bool {
        let message = error.user_message();
        let category = error.category();
        self.apply(generation, token, |state| {
            state.phase = Phase::Failed;
            state.error = Some(message);
            state.failure = Some(category);
        })
        .await
    }

    pub(crate) async fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().await.generation == generation
    }

    /// Best-effort server-side abort, only when configured
    pub(crate) fn notify_server_cancel(&self, handle: JobHandle) {
        if !self.config.polling.notify_server_on_cancel {
            return;
        }
        let service = self.service.clone();
        tokio::spawn(async move {
            match service.cancel(&handle).await {
                Ok(()) => tracing::info!(job_id = %handle, "server acknowledged cancellation"),
                Err(e) => {
                    tracing::warn!(job_id = %handle, error = %e, "server-side cancellation failed")
                }
            }
        });
    }

    fn emit(&self, state: &RunState) {
        // No subscribers is fine
        self.state_tx.send(state.clone()).ok();
    }
}
