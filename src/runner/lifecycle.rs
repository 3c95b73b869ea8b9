//! Shutdown coordination.

use crate::types::{Phase, RunState};
use std::time::Duration;

use super::JobRunner;

/// How long shutdown waits for a download already in progress
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl JobRunner {
    /// Shut the runner down
    ///
    /// This method performs the shutdown sequence:
    /// 1. Cancels the current run if it is still `starting` or `polling`
    /// 2. Lets a result download already in progress finish (30 second timeout)
    /// 3. Stops every background task and refuses new runs
    ///
    /// Dropping the last handle to the runner performs step 3 only.
    /// Returns the state the runner was left in.
    pub async fn shutdown(&self) -> RunState {
        tracing::info!("Initiating runner shutdown");

        self.cancel().await;

        if self.state().await.phase == Phase::Downloading {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_until_terminal()).await {
                Ok(state) => {
                    tracing::info!(phase = %state.phase, "download finished before shutdown");
                }
                Err(_) => {
                    tracing::warn!("Timeout waiting for download to finish, proceeding with shutdown");
                }
            }
        }

        self.root.cancel();
        tracing::info!("Runner shut down");
        self.state().await
    }

    /// Whether [`shutdown`](Self::shutdown) has run or every consumer handle is gone
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
