//! Status polling.

use crate::error::Error;
use crate::types::{JobState, Phase};

use super::{JobRunner, RunContext};

impl JobRunner {
    /// Poll the job until it completes, fails, or the run is detached
    ///
    /// Exactly one status request is outstanding at a time: the next one is
    /// scheduled only after the previous one resolved. The first failed
    /// status request ends the run.
    pub(crate) async fn poll_until_done(self, ctx: RunContext) {
        let interval = self.config.polling.interval;
        let mut polls: u64 = 0;

        loop {
            if ctx.token.is_cancelled() {
                tracing::debug!(job_id = %ctx.handle, polls, "run cancelled, poll loop stopping");
                return;
            }

            polls += 1;
            let status = match self.service.status(&ctx.handle).await {
                Ok(status) => status,
                Err(source) => {
                    let err = Error::Poll {
                        job_id: ctx.handle.to_string(),
                        source,
                    };
                    if self.fail(ctx.generation, &ctx.token, &err).await {
                        tracing::warn!(job_id = %ctx.handle, polls, error = %err, "status check failed");
                    }
                    return;
                }
            };

            tracing::debug!(
                job_id = %ctx.handle,
                poll = polls,
                state = ?status.state,
                progress = status.percent(),
                message = %status.message,
                "status received"
            );

            match status.state {
                JobState::Running => {
                    let percent = status.percent();
                    let message = status.message;
                    let applied = self
                        .apply(ctx.generation, &ctx.token, |state| {
                            state.progress = percent;
                            if !message.is_empty() {
                                state.message = message;
                            }
                        })
                        .await;
                    if !applied {
                        tracing::debug!(job_id = %ctx.handle, "status discarded, run detached");
                        return;
                    }
                }
                JobState::Completed => {
                    let applied = self
                        .apply(ctx.generation, &ctx.token, |state| {
                            state.progress = 100;
                            state.phase = Phase::Downloading;
                            state.message = "Downloading result".to_string();
                        })
                        .await;
                    if !applied {
                        tracing::debug!(job_id = %ctx.handle, "completion discarded, run detached");
                        return;
                    }
                    tracing::info!(job_id = %ctx.handle, polls, "job completed");
                    self.retrieve_and_deliver(ctx).await;
                    return;
                }
                JobState::Failed => {
                    let message = Some(status.message).filter(|m| !m.trim().is_empty());
                    let err = Error::JobFailed {
                        job_id: ctx.handle.to_string(),
                        message,
                    };
                    if self.fail(ctx.generation, &ctx.token, &err).await {
                        tracing::warn!(job_id = %ctx.handle, polls, error = %err, "job failed");
                    }
                    return;
                }
            }

            tokio::select! {
                _ = ctx.token.cancelled() => {
                    tracing::debug!(job_id = %ctx.handle, polls, "run cancelled while waiting for next poll");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
