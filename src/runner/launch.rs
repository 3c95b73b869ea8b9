//! Job launch: validation, submission, hand-off to the poll loop.

use crate::error::{Error, Result};
use crate::types::{JobHandle, JobRequest, Phase};
use tokio_util::sync::CancellationToken;

use super::{JobRunner, RunContext};

impl JobRunner {
    /// Start a new run
    ///
    /// Any run already in progress is detached first (its job is not
    /// cancelled on the server). The request is validated locally; a
    /// validation failure ends the new run as `failed` without any network
    /// call. Otherwise the phase moves to `starting`, the job is submitted,
    /// and once the server returns a handle the phase moves to `polling` and
    /// the poll loop is spawned in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the request is incomplete or inconsistent
    /// - [`Error::Launch`] if the job service refused or could not be reached
    /// - [`Error::Cancelled`] if the run was cancelled or superseded before
    ///   the server answered, or the runner has been shut down
    pub async fn start(&self, request: JobRequest) -> Result<JobHandle> {
        if self.root.is_cancelled() {
            tracing::warn!("runner is shut down, not starting");
            return Err(Error::Cancelled);
        }
        let (generation, token) = self.begin_run().await;
        self.launch(generation, token, request).await
    }

    /// Validate, submit and hand off to the poll loop on behalf of one run
    ///
    /// Nothing is sent once the run has been detached.
    pub(crate) async fn launch(
        &self,
        generation: u64,
        token: CancellationToken,
        request: JobRequest,
    ) -> Result<JobHandle> {
        if let Err(e) = request.validate() {
            let err = Error::Validation(e);
            tracing::warn!(generation, error = %err, "job request rejected before submission");
            self.fail(generation, &token, &err).await;
            return Err(err);
        }

        let entered = self
            .apply(generation, &token, |state| {
                state.phase = Phase::Starting;
                state.message = "Starting report job".to_string();
            })
            .await;
        if !entered {
            tracing::debug!(generation, "run detached before submission, nothing sent");
            return Err(Error::Cancelled);
        }

        tracing::info!(
            generation,
            username = %request.credentials.username,
            start_date = %request.start_date,
            end_date = %request.end_date,
            output = ?request.output,
            "submitting job"
        );

        let handle = match self.service.submit(&request).await {
            Ok(handle) => handle,
            Err(source) => {
                let err = Error::Launch(source);
                if !self.fail(generation, &token, &err).await {
                    tracing::debug!(generation, error = %err, "launch failed after run was detached");
                    return Err(Error::Cancelled);
                }
                tracing::warn!(generation, error = %err, "job launch failed");
                return Err(err);
            }
        };

        // Accept the handle only if this run is still the one being observed
        let (accepted, explicitly_cancelled) = {
            let mut slot = self.slot.lock().await;
            let current = slot.generation == generation;
            if current && !token.is_cancelled() {
                slot.handle = Some(handle.clone());
                slot.state.phase = Phase::Polling;
                slot.state.message = "Job accepted, waiting for progress".to_string();
                self.emit(&slot.state);
                (true, false)
            } else {
                (false, current)
            }
        };

        if !accepted {
            tracing::info!(
                generation,
                job_id = %handle,
                "run detached before the job was accepted"
            );
            if explicitly_cancelled {
                self.notify_server_cancel(handle);
            }
            return Err(Error::Cancelled);
        }

        tracing::info!(generation, job_id = %handle, "job started");

        let ctx = RunContext {
            generation,
            token,
            handle: handle.clone(),
            output: request.output,
        };
        let runner = self.worker();
        tokio::spawn(async move {
            runner.poll_until_done(ctx).await;
        });

        Ok(handle)
    }
}
