//! Per-operation convergence parameters.

use crate::error::{Error, Result};
use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Default wait before the first probe.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);

/// Default interval between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default lower bound on the interval between probes.
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default overall deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Which kind of mutation the wait follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// After a create call
    Create,
    /// After an update call
    Update,
    /// After a delete call; a not-found probe proves completion
    Delete,
}

impl Direction {
    /// Returns the direction name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of what "converged" means for one operation.
///
/// Built once per create/update/delete and handed to
/// [`converge`](crate::controller::converge). Use [`validate`](Self::validate)
/// to check the invariants up front; the controller validates again before
/// polling.
#[derive(Debug, Clone)]
pub struct ConvergenceSpec<S> {
    /// Operation direction
    pub direction: Direction,

    /// Statuses meaning "still working"
    pub pending: HashSet<S>,

    /// Statuses meaning "done"
    pub target: HashSet<S>,

    /// Statuses meaning "will never converge"; empty unless the caller opts in
    pub failed: HashSet<S>,

    /// Wait before the first probe
    pub initial_delay: Duration,

    /// Interval between probes
    pub poll_interval: Duration,

    /// Lower bound on the interval between probes
    pub min_poll_interval: Duration,

    /// Overall deadline, measured from the start of the call
    pub timeout: Duration,

    /// Treat a not-found probe as success even outside a delete
    pub not_found_is_terminal: bool,
}

// Status sets need `S: Eq + Hash` to compare, which a derive cannot express.
impl<S: Status> PartialEq for ConvergenceSpec<S> {
    fn eq(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.pending == other.pending
            && self.target == other.target
            && self.failed == other.failed
            && self.initial_delay == other.initial_delay
            && self.poll_interval == other.poll_interval
            && self.min_poll_interval == other.min_poll_interval
            && self.timeout == other.timeout
            && self.not_found_is_terminal == other.not_found_is_terminal
    }
}

impl<S: Status> Eq for ConvergenceSpec<S> {}

impl<S: Status> ConvergenceSpec<S> {
    /// Create a spec with default timings.
    pub fn new(
        direction: Direction,
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            direction,
            pending: pending.into_iter().collect(),
            target: target.into_iter().collect(),
            failed: HashSet::new(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            not_found_is_terminal: false,
        }
    }

    /// Spec for waiting on a created resource.
    pub fn create(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(Direction::Create, pending, target)
    }

    /// Spec for waiting on an updated resource.
    pub fn update(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(Direction::Update, pending, target)
    }

    /// Spec for waiting on a deletion. `target` may be empty when the resource
    /// simply disappears.
    pub fn delete(
        pending: impl IntoIterator<Item = S>,
        target: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(Direction::Delete, pending, target)
    }

    /// Declare statuses that abort the wait immediately.
    #[must_use]
    pub fn with_failed(mut self, failed: impl IntoIterator<Item = S>) -> Self {
        self.failed = failed.into_iter().collect();
        self
    }

    /// Set the delay before the first probe.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the interval between probes.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the lower bound on the interval between probes.
    #[must_use]
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Set the overall deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept a not-found probe as success regardless of direction.
    #[must_use]
    pub fn with_not_found_terminal(mut self, enabled: bool) -> Self {
        self.not_found_is_terminal = enabled;
        self
    }

    /// The wait applied between two probes: `max(min_poll_interval, poll_interval)`.
    #[must_use]
    pub fn poll_wait(&self) -> Duration {
        self.min_poll_interval.max(self.poll_interval)
    }

    /// Whether a not-found probe means the wait is over.
    #[must_use]
    pub fn allows_not_found(&self) -> bool {
        self.direction == Direction::Delete || self.not_found_is_terminal
    }

    /// Check the spec's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] if the timeout or poll wait is zero, if
    /// `pending` and `target` are both empty, or if any two status sets overlap.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidSpec("timeout must be greater than zero".into()));
        }

        if self.poll_wait().is_zero() {
            return Err(Error::InvalidSpec(
                "poll interval and minimum poll interval are both zero".into(),
            ));
        }

        if self.pending.is_empty() && self.target.is_empty() {
            return Err(Error::InvalidSpec(
                "pending and target statuses are both empty".into(),
            ));
        }

        check_disjoint("pending", &self.pending, "target", &self.target)?;
        check_disjoint("failed", &self.failed, "target", &self.target)?;
        check_disjoint("failed", &self.failed, "pending", &self.pending)?;

        Ok(())
    }
}

fn check_disjoint<S: Status>(
    left_name: &str,
    left: &HashSet<S>,
    right_name: &str,
    right: &HashSet<S>,
) -> Result<()> {
    let mut shared: Vec<String> = left.intersection(right).map(ToString::to_string).collect();
    if shared.is_empty() {
        return Ok(());
    }

    shared.sort();
    Err(Error::InvalidSpec(format!(
        "statuses [{}] appear in both {left_name} and {right_name}",
        shared.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ResourceStatus;

    fn spec() -> ConvergenceSpec<ResourceStatus> {
        ConvergenceSpec::create(
            [ResourceStatus::Build, ResourceStatus::Pending],
            [ResourceStatus::Active],
        )
    }

    #[test]
    fn specs_compare_by_sets_not_order() {
        let reordered = ConvergenceSpec::create(
            [ResourceStatus::Pending, ResourceStatus::Build],
            [ResourceStatus::Active],
        );
        assert_eq!(spec(), reordered);

        assert_ne!(spec(), spec().with_failed([ResourceStatus::Error]));
        assert_ne!(spec(), spec().with_timeout(Duration::from_secs(1)));
        assert_ne!(
            spec(),
            ConvergenceSpec::update(
                [ResourceStatus::Build, ResourceStatus::Pending],
                [ResourceStatus::Active],
            )
        );
    }

    #[test]
    fn defaults_are_applied() {
        let spec = spec();
        assert_eq!(spec.direction, Direction::Create);
        assert_eq!(spec.initial_delay, DEFAULT_INITIAL_DELAY);
        assert_eq!(spec.timeout, DEFAULT_TIMEOUT);
        assert!(spec.failed.is_empty());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn poll_wait_takes_the_larger_interval() {
        let spec = spec()
            .with_poll_interval(Duration::from_secs(2))
            .with_min_poll_interval(Duration::from_secs(5));
        assert_eq!(spec.poll_wait(), Duration::from_secs(5));

        let spec = spec.with_poll_interval(Duration::from_secs(8));
        assert_eq!(spec.poll_wait(), Duration::from_secs(8));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = spec().with_timeout(Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }

    #[test]
    fn zero_poll_wait_is_rejected() {
        let err = spec()
            .with_poll_interval(Duration::ZERO)
            .with_min_poll_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }

    #[test]
    fn empty_status_sets_are_rejected() {
        let empty: ConvergenceSpec<String> = ConvergenceSpec::create([], []);
        assert!(matches!(empty.validate(), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        let labels = ConvergenceSpec::update(
            ["PENDING".to_string(), "ACTIVE".to_string()],
            ["ACTIVE".to_string()],
        );
        let err = labels.validate().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidSpec("statuses [ACTIVE] appear in both pending and target".into())
        );

        let failed = spec().with_failed([ResourceStatus::Build]);
        assert!(matches!(failed.validate(), Err(Error::InvalidSpec(_))));
    }

    #[test]
    fn delete_allows_empty_target_and_not_found() {
        let deletion = ConvergenceSpec::delete([ResourceStatus::Deleting], []);
        assert!(deletion.validate().is_ok());
        assert!(deletion.allows_not_found());

        assert!(!spec().allows_not_found());
        assert!(spec().with_not_found_terminal(true).allows_not_found());
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Delete.to_string(), "delete");
        assert_eq!(serde_json::to_string(&Direction::Update).unwrap(), "\"update\"");
    }
}
