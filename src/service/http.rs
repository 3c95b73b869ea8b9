//! reqwest-backed [`JobService`] speaking the job service's JSON contract.

use super::{JobService, ResultPayload};
use crate::config::ServiceConfig;
use crate::error::{self, Error, ServiceError};
use crate::types::{JobHandle, JobRequest, JobStatus};
use crate::utils::filename_from_content_disposition;
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Body of a successful `POST /jobs`
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

/// Error body, `{"detail": ...}`
///
/// `detail` is usually a string but validation errors send a list, so it is
/// kept as raw JSON and flattened to text.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// HTTP implementation of [`JobService`]
#[derive(Clone)]
pub struct HttpJobService {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpJobService {
    /// Build a client for the configured service
    ///
    /// The per-request timeout is installed on the client so it covers
    /// connecting, sending and reading the body.
    pub fn new(config: &ServiceConfig) -> error::Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", config.base_url, e),
            key: Some("base_url".to_string()),
        })?;
        // Url::join drops the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: None,
            })?;

        Ok(Self {
            client,
            base_url,
            auth_token: config.auth_token.clone(),
            timeout: config.request_timeout,
        })
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn job_url(&self, handle: Option<&JobHandle>, tail: Option<&str>) -> Result<Url, ServiceError> {
        let mut relative = String::from("jobs");
        if let Some(handle) = handle {
            relative.push('/');
            relative.push_str(&urlencoding::encode(handle.as_str()));
        }
        if let Some(tail) = tail {
            relative.push('/');
            relative.push_str(tail);
        }
        self.base_url
            .join(&relative)
            .map_err(|e| ServiceError::InvalidResponse(format!("cannot build job URL: {}", e)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ServiceError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Connectivity(e.to_string())
        }
    }
}

/// Turn a non-success response into a [`ServiceError`]
async fn error_from_response(response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let detail = match response.bytes().await {
        Ok(body) => detail_from_body(&body),
        Err(e) => {
            tracing::debug!(error = %e, "could not read error body");
            None
        }
    };

    tracing::warn!(status = status.as_u16(), detail = ?detail, "job service returned error");

    if status == reqwest::StatusCode::UNAUTHORIZED {
        ServiceError::Unauthorized { detail }
    } else {
        ServiceError::Remote {
            status: status.as_u16(),
            detail,
        }
    }
}

fn detail_from_body(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::String(_) | serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, ServiceError> {
        let url = self.job_url(None, None)?;
        tracing::debug!(url = %url, output = ?request.output, "submitting job");

        let response = self
            .send(self.request(reqwest::Method::POST, url).json(request))
            .await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        if body.job_id.trim().is_empty() {
            return Err(ServiceError::InvalidResponse(
                "server returned an empty job_id".to_string(),
            ));
        }
        Ok(JobHandle::new(body.job_id))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, ServiceError> {
        let url = self.job_url(Some(handle), Some("status"))?;
        let response = self
            .send(self.request(reqwest::Method::GET, url))
            .await?;
        response.json().await.map_err(|e| self.transport_error(e))
    }

    async fn fetch_result(&self, handle: &JobHandle) -> Result<ResultPayload, ServiceError> {
        let url = self.job_url(Some(handle), Some("result"))?;
        let response = self
            .send(self.request(reqwest::Method::GET, url))
            .await?;

        let suggested_filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_content_disposition);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        Ok(ResultPayload {
            bytes: bytes.to_vec(),
            suggested_filename,
            content_type,
        })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), ServiceError> {
        let url = self.job_url(Some(handle), None)?;
        self.send(self.request(reqwest::Method::DELETE, url))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
