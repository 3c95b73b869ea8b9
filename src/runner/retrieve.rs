//! Result retrieval and delivery.

use crate::error::{Error, Result, ServiceError};
use crate::types::{Artifact, JobHandle, OutputVariant, Phase};

use super::{JobRunner, RunContext};

impl JobRunner {
    /// Fetch the artifact of a completed job
    ///
    /// The filename comes from the server's `Content-Disposition` header when
    /// present, otherwise `<tool>_result.<ext>` with the extension of the
    /// requested output variant.
    ///
    /// Does not touch the run state.
    ///
    /// # Errors
    ///
    /// [`Error::Retrieve`] if the fetch fails or the body is empty.
    pub async fn fetch_artifact(
        &self,
        handle: &JobHandle,
        output: OutputVariant,
    ) -> Result<Artifact> {
        let payload = self
            .service
            .fetch_result(handle)
            .await
            .map_err(|source| Error::Retrieve {
                job_id: handle.to_string(),
                source,
            })?;

        if payload.bytes.is_empty() {
            return Err(Error::Retrieve {
                job_id: handle.to_string(),
                source: ServiceError::InvalidResponse("result body is empty".to_string()),
            });
        }

        let filename = payload
            .suggested_filename
            .unwrap_or_else(|| output.default_filename(&self.config.output.tool_name));

        tracing::debug!(
            job_id = %handle,
            filename = %filename,
            bytes = payload.bytes.len(),
            "artifact fetched"
        );

        Ok(Artifact {
            filename,
            content_type: payload.content_type,
            bytes: payload.bytes,
        })
    }

    /// Final step of a run: fetch, deliver, mark succeeded
    ///
    /// Runs to completion even if the consumer calls `cancel` meanwhile; only
    /// a newer run discards the result.
    pub(crate) async fn retrieve_and_deliver(&self, ctx: RunContext) {
        let artifact = match self.fetch_artifact(&ctx.handle, ctx.output).await {
            Ok(artifact) => artifact,
            Err(err) => {
                if self.fail(ctx.generation, &ctx.token, &err).await {
                    tracing::warn!(job_id = %ctx.handle, error = %err, "result retrieval failed");
                }
                return;
            }
        };

        if !self.is_current(ctx.generation).await {
            tracing::debug!(job_id = %ctx.handle, "run superseded, artifact discarded");
            return;
        }

        let path = match self.sink.deliver(&artifact).await {
            Ok(path) => path,
            Err(err) => {
                if self.fail(ctx.generation, &ctx.token, &err).await {
                    tracing::warn!(job_id = %ctx.handle, error = %err, "artifact delivery failed");
                }
                return;
            }
        };

        let saved_as = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| artifact.filename.clone());

        let applied = self
            .apply(ctx.generation, &ctx.token, |state| {
                state.phase = Phase::Succeeded;
                state.progress = 100;
                state.message = format!("Report saved as {}", saved_as);
                state.artifact = Some(saved_as.clone());
            })
            .await;

        if applied {
            tracing::info!(
                job_id = %ctx.handle,
                path = %path.display(),
                "run succeeded"
            );
        }
    }
}
