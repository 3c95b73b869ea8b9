//! Error types for report-dl
//!
//! Errors are split along the run's step boundaries so the consumer can tell
//! apart:
//! - a problem with the request itself (fix the input, nothing was sent)
//! - a failure reported by the job service (server-provided detail)
//! - a connectivity failure (fixed fallback message)
//!
//! Every error that ends a run is rendered into [`RunState`](crate::RunState)
//! through [`Error::user_message`] and [`Error::category`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for report-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the job service could not be reached at all
pub const CONNECTIVITY_MESSAGE: &str =
    "Could not reach the report service. Check your connection or credentials and try again.";

/// Message shown when the server reports a failed job without saying why
pub const JOB_FAILED_MESSAGE: &str = "The report job failed on the server";

/// Prefix that marks a failed artifact fetch after the job itself succeeded
pub const RETRIEVE_FAILED_PREFIX: &str = "The report was generated but could not be downloaded";

/// Main error type for report-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The job request failed local validation; no network call was made
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The job could not be created
    #[error("failed to start job: {0}")]
    Launch(#[source] ServiceError),

    /// Status fetch failed mid-run (terminal, never retried)
    #[error("status check for job {job_id} failed: {source}")]
    Poll {
        /// Job whose status could not be fetched
        job_id: String,
        /// Underlying service failure
        #[source]
        source: ServiceError,
    },

    /// The server reported the job as failed
    #[error("job {job_id} failed: {}", .message.as_deref().unwrap_or(JOB_FAILED_MESSAGE))]
    JobFailed {
        /// Job that failed
        job_id: String,
        /// Server-supplied reason, if any
        message: Option<String>,
    },

    /// The artifact could not be fetched even though the job completed
    #[error("result fetch for job {job_id} failed: {source}")]
    Retrieve {
        /// Job whose result could not be fetched
        job_id: String,
        /// Underlying service failure
        #[source]
        source: ServiceError,
    },

    /// The run was cancelled by the consumer
    #[error("cancelled by user")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// The artifact was fetched but could not be handed to the consumer
    #[error("failed to save {path}: {source}")]
    Delivery {
        /// Destination the artifact was being written to
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with a job request detected before anything is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is empty
    #[error("{field} is required")]
    MissingField {
        /// Name of the empty field
        field: &'static str,
    },

    /// A date could not be parsed
    #[error("{field} is not a valid date (expected YYYY-MM-DD): {value}")]
    InvalidDate {
        /// Name of the date field
        field: &'static str,
        /// The rejected input
        value: String,
    },

    /// The date range is inverted
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange {
        /// Requested start date
        start: chrono::NaiveDate,
        /// Requested end date
        end: chrono::NaiveDate,
    },

    /// The output variant is not one the service produces
    #[error("unknown output type '{0}' (expected 'processed' or 'raw')")]
    UnknownOutput(String),
}

/// Failures talking to the job service
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The server answered with an error status
    #[error("server returned HTTP {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Remote {
        /// HTTP status code
        status: u16,
        /// `detail` field from the error body, if present
        detail: Option<String>,
    },

    /// The server rejected the bearer token
    #[error("not authorized{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Unauthorized {
        /// `detail` field from the error body, if present
        detail: Option<String>,
    },

    /// The request exceeded the client-side timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server could not be reached
    #[error("connection failed: {0}")]
    Connectivity(String),

    /// The server answered with something that does not match the contract
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The operation is not offered by this service implementation
    #[error("not supported: {0}")]
    NotSupported(String),
}

/// How an error should be presented to a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; nothing was sent, the user should fix the form
    Validation,
    /// The service reported a failure with its own message
    Remote,
    /// The service could not be reached or did not answer in time
    Connectivity,
    /// The user cancelled the run
    Cancelled,
    /// The client failed locally (configuration, saving the file)
    Local,
}

impl ServiceError {
    /// Category of this failure
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Remote { .. }
            | ServiceError::Unauthorized { .. }
            | ServiceError::InvalidResponse(_)
            | ServiceError::NotSupported(_) => ErrorCategory::Remote,
            ServiceError::Timeout(_) | ServiceError::Connectivity(_) => {
                ErrorCategory::Connectivity
            }
        }
    }

    /// Text suitable for end users
    ///
    /// Server detail is passed through verbatim; transport failures collapse to
    /// [`CONNECTIVITY_MESSAGE`] so that raw socket errors never reach the UI.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Remote {
                detail: Some(detail),
                ..
            }
            | ServiceError::Unauthorized {
                detail: Some(detail),
            } => detail.clone(),
            ServiceError::Remote {
                status,
                detail: None,
            } => format!("The report service rejected the request (HTTP {status})"),
            ServiceError::Unauthorized { detail: None } => {
                "Your session is not authorized. Sign in again.".to_string()
            }
            ServiceError::Timeout(_) | ServiceError::Connectivity(_) => {
                CONNECTIVITY_MESSAGE.to_string()
            }
            ServiceError::InvalidResponse(_) => {
                "The report service sent an unexpected response".to_string()
            }
            ServiceError::NotSupported(what) => format!("Not supported by the service: {what}"),
        }
    }
}

impl Error {
    /// Category used by consumers to pick a rendering
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Launch(e) | Error::Poll { source: e, .. } | Error::Retrieve { source: e, .. } => {
                e.category()
            }
            Error::JobFailed { .. } => ErrorCategory::Remote,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Config { .. } | Error::Delivery { .. } | Error::Io(_) => ErrorCategory::Local,
        }
    }

    /// Text suitable for end users, stored in `RunState::error`
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(e) => e.to_string(),
            Error::Launch(e) | Error::Poll { source: e, .. } => e.user_message(),
            Error::JobFailed { message, .. } => message
                .clone()
                .unwrap_or_else(|| JOB_FAILED_MESSAGE.to_string()),
            Error::Retrieve { source, .. } => {
                format!("{RETRIEVE_FAILED_PREFIX}: {}", source.user_message())
            }
            Error::Cancelled => "Cancelled".to_string(),
            Error::Config { message, .. } => format!("Configuration error: {message}"),
            Error::Delivery { path, source } => {
                format!("Could not save {}: {source}", path.display())
            }
            Error::Io(e) => format!("Local I/O error: {e}"),
        }
    }
}
