//! Job service abstraction
//!
//! The runner only talks to the server through [`JobService`]. The default
//! implementation is [`HttpJobService`]; tests plug in scripted fakes.

mod http;


pub use http::HttpJobService;

use crate::error::ServiceError;
use crate::types::{JobHandle, JobRequest, JobStatus};
use async_trait::async_trait;

/// Raw result payload as returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    /// Response body
    pub bytes: Vec<u8>,
    /// Filename suggested by the server, already sanitized
    pub suggested_filename: Option<String>,
    /// MIME type, when the server sent one
    pub content_type: Option<String>,
}

/// Server side of the job protocol
///
/// Every method is a single request; none of them retry. Implementations are
/// expected to enforce a per-request timeout and report it as
/// [`ServiceError::Timeout`].
#[async_trait]
pub trait JobService: Send + Sync {
    /// Create a job (`POST /jobs`)
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ServiceError>;

    /// Fetch the current status (`GET /jobs/{id}/status`)
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError>;

    /// Fetch the finished artifact (`GET /jobs/{id}/result`)
    async fn fetch_result(&self, handle: &JobHandle) -> Result<ResultPayload, ServiceError>;

    /// Ask the server to abort a job
    ///
    /// The observed service exposes no such endpoint, so the default is to
    /// report it as unsupported. Only called when
    /// [`PollingConfig::notify_server_on_cancel`](crate::config::PollingConfig::notify_server_on_cancel)
    /// is enabled.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), ServiceError> {
        Err(ServiceError::NotSupported(format!(
            "cancelling job {} on the server",
            handle
        )))
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
