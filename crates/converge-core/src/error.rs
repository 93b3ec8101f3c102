//! Error types for convergence operations.
//!
//! Two layers live here. [`ApiError`] classifies failures reported by the remote
//! control plane (usually derived from an HTTP status), and [`Error`] is what the
//! engine returns to the resource operation that called it.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a remote call made inside a probe, initiator, job fetch
/// or tag operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The addressed object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials were rejected (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not perform the operation right now (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The object is locked or mid-operation (HTTP 409/423)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request was malformed (HTTP 400/422)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The service is overloaded or down (HTTP 429/5xx, connect failures)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The request timed out at the transport layer
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Any other HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body could not be decoded
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Map an unsuccessful HTTP status and its body text onto an error.
    #[must_use]
    pub fn from_status(status: StatusCode, text: impl Into<String>) -> Self {
        let text = text.into();
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(text),
            StatusCode::UNAUTHORIZED => Self::Unauthorized(text),
            StatusCode::FORBIDDEN => Self::Forbidden(text),
            StatusCode::CONFLICT | StatusCode::LOCKED => Self::Conflict(text),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::BadRequest(text),
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                Self::ServiceUnavailable(format!("temporarily unavailable: {text}"))
            }
            status if status.is_server_error() => {
                Self::ServiceUnavailable(format!("server error {status}: {text}"))
            }
            _ => Self::Http(format!("error {status}: {text}")),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Timeout(_) => "REQUEST_TIMEOUT",
            Self::Http(_) => "HTTP_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
        }
    }

    /// True for the 404-equivalent that proves an object is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the remote rejected a mutation because a parent object holds a
    /// coarse-grained lock. Control planes report this as 403, 409 or 423 rather
    /// than queuing the request.
    #[must_use]
    pub const fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Forbidden(_) | Self::Conflict(_))
    }

    /// True for failures that may succeed if the same call is repeated later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Error returned by the convergence engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The remote read itself failed
    #[error("Probe failed: {0}")]
    Probe(#[source] ApiError),

    /// The deadline passed while the object reported a status that is neither
    /// pending nor target
    #[error("Unexpected status `{status}` when the wait timed out")]
    UnexpectedStatus {
        /// Last status observed
        status: String,
        /// Debug rendering of the last object observed
        last_object: Option<String>,
    },

    /// The deadline passed while the object was still in a pending status
    #[error("Timeout after {timeout:?} waiting for convergence (last status: {})", .last_status.as_deref().unwrap_or("none"))]
    Timeout {
        /// Last status observed, if any probe completed
        last_status: Option<String>,
        /// Debug rendering of the last object observed
        last_object: Option<String>,
        /// The configured timeout
        timeout: Duration,
    },

    /// The object reached a status the caller declared as failed
    #[error("Resource entered failed status `{status}`")]
    FailedStatus {
        /// The failed status
        status: String,
        /// Debug rendering of the object in that status
        last_object: Option<String>,
    },

    /// The job tree was walked completely without a matching job
    #[error("No matching job found in the tree rooted at `{job_id}`")]
    JobTreeExhausted {
        /// Root job identifier
        job_id: String,
    },

    /// A matching job carried no resource identifier
    #[error("Job `{job_id}` matched but carries no resource identifier")]
    JobWithoutResource {
        /// Identifier of the matching job
        job_id: String,
    },

    /// The conflict-retry wrapper gave up
    #[error("Gave up after {attempts} attempts waiting on `{precondition_id}`: {last_error}")]
    RetriesExhausted {
        /// Number of times the initiator was called
        attempts: u32,
        /// Resource whose availability was awaited between attempts
        precondition_id: String,
        /// Error returned by the final attempt
        #[source]
        last_error: ApiError,
    },

    /// A mutating or job-tree call failed; the remote error is kept verbatim
    #[error("Remote call failed: {0}")]
    Remote(#[source] ApiError),

    /// The convergence spec breaks one of its invariants
    #[error("Invalid convergence spec: {0}")]
    InvalidSpec(String),

    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The caller cancelled the wait
    #[error("Convergence cancelled")]
    Cancelled,
}

/// Specialized result type for convergence operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Probe(_) => "PROBE_ERROR",
            Self::UnexpectedStatus { .. } => "UNEXPECTED_STATUS",
            Self::Timeout { .. } => "TIMEOUT",
            Self::FailedStatus { .. } => "FAILED_STATUS",
            Self::JobTreeExhausted { .. } => "JOB_TREE_EXHAUSTED",
            Self::JobWithoutResource { .. } => "JOB_WITHOUT_RESOURCE",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::Remote(_) => "REMOTE_ERROR",
            Self::InvalidSpec(_) => "INVALID_SPEC",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The remote error underneath, if this error wraps one.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Probe(err) | Self::Remote(err) => Some(err),
            Self::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }

    /// Returns true for deadline-based failures.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::UnexpectedStatus { .. })
    }

    /// Returns true if the caller misused the engine rather than the remote
    /// misbehaving.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidSpec(_) | Self::ConfigError(_))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
