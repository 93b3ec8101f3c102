//! Status labels and their normalization.
//!
//! Control planes report status strings inconsistently: upper-case, mixed-case,
//! prefixed (`STATUS_ACTIVE`) or hyphenated. Probes convert the raw label into one
//! of the closed enumerations below before the classifier ever sees it, so the
//! controller only compares well-formed values.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Prefixes stripped by [`normalize_label`].
const LABEL_PREFIXES: &[&str] = &["STATUS_", "STATE_"];

/// Anything usable as a status in a [`ConvergenceSpec`](crate::spec::ConvergenceSpec).
///
/// Implemented for every type with the required bounds, including `String` for
/// callers that have not defined a family enumeration.
pub trait Status: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> Status for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Canonicalize a raw status label.
///
/// Trims whitespace, upper-cases, turns `-` and spaces into `_`, and strips a
/// leading `STATUS_` or `STATE_` prefix.
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    let upper: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    LABEL_PREFIXES
        .iter()
        .find_map(|prefix| upper.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .map_or_else(|| upper.clone(), str::to_string)
}

/// Lifecycle status of a provisioned resource (instance, cluster, volume, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceStatus {
    /// Being built from an image
    Build,
    /// Accepted but not started
    Pending,
    /// Creation in progress
    Creating,
    /// Modification in progress
    Updating,
    /// Ready for use
    Active,
    /// Ready for use (storage and network flavour)
    Available,
    /// Running
    Running,
    /// Stopped
    Stopped,
    /// Deletion in progress
    Deleting,
    /// Deleted but still listed
    Deleted,
    /// Broken
    Error,
    /// A label outside this family, kept as normalized text
    Other(String),
}

impl ResourceStatus {
    /// Canonical label for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Build => "BUILD",
            Self::Pending => "PENDING",
            Self::Creating => "CREATING",
            Self::Updating => "UPDATING",
            Self::Active => "ACTIVE",
            Self::Available => "AVAILABLE",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
            Self::Error => "ERROR",
            Self::Other(label) => label,
        }
    }

    /// Returns true if the label was recognized.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for ResourceStatus {
    fn from(raw: &str) -> Self {
        let label = normalize_label(raw);
        match label.as_str() {
            "BUILD" | "BUILDING" => Self::Build,
            "PENDING" | "QUEUED" => Self::Pending,
            "CREATING" | "PROVISIONING" | "INITIALIZING" => Self::Creating,
            "UPDATING" | "MODIFYING" | "RESIZING" => Self::Updating,
            "ACTIVE" | "READY" => Self::Active,
            "AVAILABLE" => Self::Available,
            "RUNNING" => Self::Running,
            "STOPPED" | "SHUTOFF" => Self::Stopped,
            "DELETING" | "DESTROYING" => Self::Deleting,
            "DELETED" | "DESTROYED" => Self::Deleted,
            "ERROR" | "FAILED" => Self::Error,
            _ => Self::Other(label),
        }
    }
}

impl From<String> for ResourceStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<ResourceStatus> for String {
    fn from(status: ResourceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for ResourceStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of an asynchronous job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// Waiting to run
    #[default]
    Queued,
    /// Executing
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Stopped before completion
    Canceled,
    /// A label outside this family, kept as normalized text
    Other(String),
}

impl JobStatus {
    /// Canonical label for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Other(label) => label,
        }
    }

    /// Returns true once the job can no longer change.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl From<&str> for JobStatus {
    fn from(raw: &str) -> Self {
        let label = normalize_label(raw);
        match label.as_str() {
            "QUEUED" | "PENDING" | "WAITING" | "INIT" => Self::Queued,
            "RUNNING" | "PROCESSING" | "IN_PROGRESS" => Self::Running,
            "SUCCEEDED" | "SUCCESS" | "SUCCESSFUL" | "DONE" | "FINISHED" => Self::Succeeded,
            "FAILED" | "FAILURE" | "ERROR" => Self::Failed,
            "CANCELED" | "CANCELLED" | "ABORTED" => Self::Canceled,
            _ => Self::Other(label),
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl FromStr for JobStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
