//! # report-dl
//!
//! Client library for long-running report jobs on a remote job service.
//!
//! ## Design Philosophy
//!
//! report-dl is designed to be:
//! - **Non-blocking** - A job is launched, observed and retrieved without ever holding up the caller
//! - **Cancellable** - A run can be abandoned at any point before its result is being downloaded
//! - **Library-first** - No UI, consumers render the published run state however they like
//! - **Event-driven** - Consumers subscribe to state snapshots, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use report_dl::{Config, JobRequest, JobRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = JobRunner::from_config(Config::from_env())?;
//!
//!     // Subscribe to state changes
//!     let mut states = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(state) = states.recv().await {
//!             println!("{}: {}% {}", state.phase, state.progress, state.message);
//!         }
//!     });
//!
//!     let request =
//!         JobRequest::from_form("user", "secret", "2024-01-01", "2024-01-31", "processed")?;
//!     runner.start(request).await?;
//!
//!     let finished = runner.wait_until_terminal().await;
//!     println!("{:?}", finished.artifact);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Job runner (decomposed into launch, poll and retrieve steps)
pub mod runner;
/// Job service contract and its HTTP implementation
pub mod service;
/// Artifact delivery
pub mod sink;
/// Core types and run state
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction, OutputConfig, PollingConfig, ServiceConfig};
pub use error::{Error, ErrorCategory, Result, ServiceError, ValidationError};
pub use runner::JobRunner;
pub use service::{HttpJobService, JobService, ResultPayload};
pub use sink::{ArtifactSink, DirectorySink};
pub use types::{
    Artifact, Credentials, JobHandle, JobRequest, JobState, JobStatus, OutputVariant, Phase,
    RunState,
};

/// Wait for the current run to finish, cancelling it on a termination signal
///
/// Returns the terminal state. If the signal arrives while the result is
/// already being downloaded, the cancel is ignored and the run is allowed to
/// finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use report_dl::{Config, JobRequest, JobRunner, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let runner = JobRunner::from_config(Config::from_env())?;
///     let request =
///         JobRequest::from_form("user", "secret", "2024-01-01", "2024-01-31", "raw")?;
///     runner.start(request).await?;
///
///     let finished = run_until_signal(&runner).await;
///     println!("{}", finished.phase);
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(runner: &JobRunner) -> RunState {
    tokio::select! {
        state = runner.wait_until_terminal() => return state,
        _ = wait_for_signal() => {}
    }

    if !runner.cancel().await {
        tracing::info!("run is finishing, waiting for it instead of cancelling");
    }
    runner.wait_until_terminal().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_err() {
                // Without any signal source the run is simply awaited
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
