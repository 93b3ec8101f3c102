//! Mapping a single probe result onto a polling decision.

use crate::error::ApiError;
use crate::spec::ConvergenceSpec;
use crate::status::Status;

/// What the controller should do with one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep polling. `recognized` is false when the status is in no set at all.
    Pending {
        /// Whether the status was listed in the spec's pending set
        recognized: bool,
    },
    /// The resource converged.
    Target,
    /// The resource reached a status listed as failed.
    Failed,
    /// The probe failed; stop without retrying.
    FatalError,
    /// The resource is gone and that counts as success.
    NotFoundTerminal,
}

impl Outcome {
    /// Returns true if polling stops on this outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}

/// Classify one probe result against a spec.
///
/// Unrecognized statuses classify as pending: control planes add intermediate
/// statuses without notice, so a wait only fails on them once the deadline
/// passes.
#[must_use]
pub fn classify<S: Status>(observed: Result<&S, &ApiError>, spec: &ConvergenceSpec<S>) -> Outcome {
    match observed {
        Ok(status) => classify_status(status, spec),
        Err(err) => classify_error(err, spec),
    }
}

/// Classify a probe failure.
#[must_use]
pub fn classify_error<S: Status>(err: &ApiError, spec: &ConvergenceSpec<S>) -> Outcome {
    if err.is_not_found() && spec.allows_not_found() {
        Outcome::NotFoundTerminal
    } else {
        Outcome::FatalError
    }
}

/// Classify a successfully observed status.
#[must_use]
pub fn classify_status<S: Status>(status: &S, spec: &ConvergenceSpec<S>) -> Outcome {
    if spec.target.contains(status) {
        Outcome::Target
    } else if spec.failed.contains(status) {
        Outcome::Failed
    } else {
        Outcome::Pending {
            recognized: spec.pending.contains(status),
        }
    }
}
