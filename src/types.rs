//! Core types for report-dl

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ValidationError};

/// Server-issued identifier for a job
///
/// Opaque to the client: it is only ever echoed back in status and result
/// requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap a server-issued id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which artifact the server should produce
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputVariant {
    /// A single cleaned and consolidated spreadsheet
    #[default]
    Processed,
    /// The original report files, zipped
    Raw,
}

impl OutputVariant {
    /// File extension of the artifact this variant produces
    pub fn extension(&self) -> &'static str {
        match self {
            OutputVariant::Processed => "xlsx",
            OutputVariant::Raw => "zip",
        }
    }

    /// Default artifact name when the server suggests none
    pub fn default_filename(&self, tool: &str) -> String {
        format!("{}_result.{}", tool, self.extension())
    }
}

impl std::str::FromStr for OutputVariant {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(OutputVariant::Processed),
            "raw" => Ok(OutputVariant::Raw),
            _ => Err(ValidationError::UnknownOutput(s.to_string())),
        }
    }
}

/// Portal credentials forwarded to the job service for a single run
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Portal user name
    pub username: String,
    /// Portal password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Never print the password, not even at trace level
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parameters needed to start a report job
///
/// Serializes to the body of `POST /jobs`:
/// `{"username", "password", "start_date", "end_date", "output_type"}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRequest {
    /// Portal credentials
    #[serde(flatten)]
    pub credentials: Credentials,
    /// First day of the report range (inclusive)
    pub start_date: NaiveDate,
    /// Last day of the report range (inclusive)
    pub end_date: NaiveDate,
    /// Requested artifact
    #[serde(rename = "output_type")]
    pub output: OutputVariant,
}

impl JobRequest {
    /// Create a request from already-typed fields
    pub fn new(
        credentials: Credentials,
        start_date: NaiveDate,
        end_date: NaiveDate,
        output: OutputVariant,
    ) -> Self {
        Self {
            credentials,
            start_date,
            end_date,
            output,
        }
    }

    /// Build a request from raw form input
    ///
    /// Dates must be `YYYY-MM-DD`; the output type must be `processed` or `raw`.
    /// The result is validated before it is returned.
    pub fn from_form(
        username: &str,
        password: &str,
        start_date: &str,
        end_date: &str,
        output: &str,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            credentials: Credentials::new(username, password),
            start_date: parse_date("start_date", start_date)?,
            end_date: parse_date("end_date", end_date)?,
            output: output.parse()?,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the request before it is sent
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.credentials.username.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "username" });
        }
        if self.credentials.password.is_empty() {
            return Err(ValidationError::MissingField { field: "password" });
        }
        if self.start_date > self.end_date {
            return Err(ValidationError::InvertedDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Server-side job state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Still working
    Running,
    /// Artifact is ready
    Completed,
    /// Job gave up
    Failed,
}

/// Snapshot returned by `GET /jobs/{id}/status`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Current job state
    #[serde(rename = "status")]
    pub state: JobState,
    /// Percentage complete as reported by the server
    #[serde(default)]
    pub progress: f64,
    /// Human-readable status text
    #[serde(default)]
    pub message: String,
}

impl JobStatus {
    /// Progress clamped to 0..=100
    pub fn percent(&self) -> u8 {
        if self.progress.is_nan() {
            return 0;
        }
        self.progress.round().clamp(0.0, 100.0) as u8
    }
}

/// Produced file, fetched once after the job completes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Filename from `Content-Disposition`, or the default name
    pub filename: String,
    /// MIME type, when the server sent one
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Lifecycle phase of a run as seen by the consumer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No run started, or reset
    #[default]
    Idle,
    /// Submitting the job
    Starting,
    /// Waiting for the server to finish
    Polling,
    /// Fetching the artifact
    Downloading,
    /// Artifact delivered
    Succeeded,
    /// Run ended with an error
    Failed,
    /// Run detached by the consumer
    Cancelled,
}

impl Phase {
    /// Whether the run can no longer change except by starting a new one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }

    /// Whether a cancel request applies in this phase
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Phase::Starting | Phase::Polling)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Polling => "polling",
            Phase::Downloading => "downloading",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Observable state of the current run
///
/// A fresh snapshot is broadcast on every change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Current phase
    pub phase: Phase,
    /// Progress percentage (0 to 100)
    pub progress: u8,
    /// Latest status text
    pub message: String,
    /// User-facing error, set when the run failed or was cancelled
    pub error: Option<String>,
    /// How `error` should be rendered
    pub failure: Option<ErrorCategory>,
    /// Name of the delivered artifact once the run succeeded
    pub artifact: Option<String>,
}
