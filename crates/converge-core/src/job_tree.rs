//! Resolving the resource created by an asynchronous job.
//!
//! Some create calls return only a job handle. The object they created is
//! recorded on a sub-job somewhere below that handle, at a depth that varies by
//! API. [`resolve_job_resource`] walks the tree one remote fetch per expanded
//! job until a caller-supplied predicate matches. [`JobWalk`] adds a filter on
//! which branches to expand and a cancellation token.

use crate::controller::{converge_with_cancellation, Observation, Probe, ProbeResult};
use crate::error::{ApiError, Error, Result};
use crate::spec::ConvergenceSpec;
use crate::status::JobStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A job record as returned by the remote API.
///
/// `sub_jobs` holds the immediate children only; they may be summaries whose
/// own children are empty until fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNode {
    /// Job identifier
    pub id: String,

    /// Job type, e.g. `CreateNodeVM`
    #[serde(rename = "type")]
    pub job_type: String,

    /// Execution status
    #[serde(default)]
    pub status: JobStatus,

    /// Identifier of the resource this job created or acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Child jobs
    #[serde(default, alias = "subJobs", skip_serializing_if = "Vec::is_empty")]
    pub sub_jobs: Vec<JobNode>,
}

impl JobNode {
    /// Create a childless job.
    pub fn new(id: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            status: JobStatus::default(),
            resource_id: None,
            sub_jobs: Vec::new(),
        }
    }

    /// Set the execution status.
    #[must_use]
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the resource identifier.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Append a child job.
    #[must_use]
    pub fn with_sub_job(mut self, sub_job: JobNode) -> Self {
        self.sub_jobs.push(sub_job);
        self
    }

    /// Returns true if the job type equals `job_type`, ignoring case.
    #[must_use]
    pub fn is_type(&self, job_type: &str) -> bool {
        self.job_type.eq_ignore_ascii_case(job_type)
    }
}

/// Remote lookup of a single job by identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch one job with its immediate children.
    ///
    /// # Errors
    ///
    /// Returns the remote failure; the resolver does not retry it.
    async fn fetch_job(&self, id: &str) -> std::result::Result<JobNode, ApiError>;
}

/// Walk the job tree rooted at `job_id` and return the resource identifier of
/// the first job for which `is_target` holds.
///
/// Every non-matching child is expanded. Use [`JobWalk`] to restrict which
/// children are fetched or to make the walk cancellable.
///
/// # Errors
///
/// See [`JobWalk::resolve`].
pub async fn resolve_job_resource<J, F>(source: &J, job_id: &str, is_target: F) -> Result<String>
where
    J: JobSource + ?Sized,
    F: Fn(&JobNode) -> bool,
{
    JobWalk::new(is_target).resolve(source, job_id).await
}

fn expand_all(_: &JobNode) -> bool {
    true
}

/// A configured walk over a job tree.
///
/// `is_target` picks the job that carries the resource id. `should_expand`
/// decides which non-matching children are worth fetching; with a filter that
/// only admits the branch leading to the target, the walk makes one fetch per
/// level visited.
pub struct JobWalk<T, E = fn(&JobNode) -> bool> {
    is_target: T,
    should_expand: E,
    cancel: CancellationToken,
}

impl<T> JobWalk<T>
where
    T: Fn(&JobNode) -> bool,
{
    /// Walk every branch until `is_target` matches.
    pub fn new(is_target: T) -> Self {
        Self {
            is_target,
            should_expand: expand_all,
            cancel: CancellationToken::new(),
        }
    }
}

impl<T, E> JobWalk<T, E>
where
    T: Fn(&JobNode) -> bool,
    E: Fn(&JobNode) -> bool,
{
    /// Only fetch non-matching children for which `should_expand` holds.
    /// The root job is always fetched.
    #[must_use]
    pub fn with_expand_filter<F>(self, should_expand: F) -> JobWalk<T, F>
    where
        F: Fn(&JobNode) -> bool,
    {
        JobWalk {
            is_target: self.is_target,
            should_expand,
            cancel: self.cancel,
        }
    }

    /// Abort with [`Error::Cancelled`] when `cancel` fires, including while a
    /// fetch is in flight.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve the resource id below `job_id`.
    ///
    /// The walk is breadth first. `is_target` is applied to every fetched job
    /// and to each child summary as soon as its parent is fetched, so a match
    /// stops the walk without fetching anything below or beside it. A matching
    /// summary with no resource identifier is fetched once to read its full
    /// record.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if any fetch fails; no partial result is returned.
    /// - [`Error::JobWithoutResource`] if the matching job has no resource id.
    /// - [`Error::JobTreeExhausted`] if no job matches.
    /// - [`Error::Cancelled`] if the token fires.
    pub async fn resolve<J>(&self, source: &J, job_id: &str) -> Result<String>
    where
        J: JobSource + ?Sized,
    {
        let mut queue = VecDeque::from([job_id.to_string()]);
        let mut expanded = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !expanded.insert(id.clone()) {
                continue;
            }

            let node = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(Error::Cancelled),
                fetched = source.fetch_job(&id) => fetched.map_err(Error::Remote)?,
            };
            debug!(
                root = %job_id,
                job = %node.id,
                job_type = %node.job_type,
                children = node.sub_jobs.len(),
                "expanded job"
            );

            if (self.is_target)(&node) {
                return node.resource_id.ok_or(Error::JobWithoutResource { job_id: node.id });
            }

            for child in node.sub_jobs {
                if (self.is_target)(&child) {
                    if let Some(resource_id) = child.resource_id {
                        return Ok(resource_id);
                    }
                    // Summary only; read the full record next.
                    queue.push_front(child.id);
                    break;
                }
                if (self.should_expand)(&child) {
                    queue.push_back(child.id);
                }
            }
        }

        Err(Error::JobTreeExhausted {
            job_id: job_id.to_string(),
        })
    }

    /// Wait for the root job to finish, then resolve the resource it created.
    /// Both phases observe this walk's cancellation token.
    ///
    /// # Errors
    ///
    /// Any error from [`converge_with_cancellation`] on the root job, or from
    /// [`JobWalk::resolve`].
    pub async fn await_resource<J>(
        &self,
        source: &J,
        job_id: &str,
        spec: &ConvergenceSpec<JobStatus>,
    ) -> Result<String>
    where
        J: JobSource + ?Sized,
    {
        let probe = JobProbe::new(source, job_id);
        if converge_with_cancellation(&probe, spec, &self.cancel)
            .await?
            .is_none()
        {
            return Err(Error::Probe(ApiError::NotFound(format!(
                "job `{job_id}` disappeared before completing"
            ))));
        }

        self.resolve(source, job_id).await
    }
}

/// A [`Probe`] reporting the execution status of one job.
pub struct JobProbe<'a, J: ?Sized> {
    source: &'a J,
    job_id: String,
}

impl<'a, J: JobSource + ?Sized> JobProbe<'a, J> {
    /// Probe `job_id` through `source`.
    pub fn new(source: &'a J, job_id: impl Into<String>) -> Self {
        Self {
            source,
            job_id: job_id.into(),
        }
    }

    /// The job being probed.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

#[async_trait]
impl<J: JobSource + ?Sized> Probe for JobProbe<'_, J> {
    type Object = JobNode;
    type Status = JobStatus;

    async fn probe(&self) -> ProbeResult<JobNode, JobStatus> {
        let node = self.source.fetch_job(&self.job_id).await?;
        let status = node.status.clone();
        Ok(Observation::new(node, status))
    }
}

/// The default spec for waiting on a job: queued/running until succeeded,
/// failing fast on failed or canceled.
#[must_use]
pub fn job_spec() -> ConvergenceSpec<JobStatus> {
    ConvergenceSpec::create(
        [JobStatus::Queued, JobStatus::Running],
        [JobStatus::Succeeded],
    )
    .with_failed([JobStatus::Failed, JobStatus::Canceled])
}

/// Wait for the root job to finish, then resolve the resource it created.
///
/// # Errors
///
/// See [`JobWalk::await_resource`].
pub async fn await_job_resource<J, F>(
    source: &J,
    job_id: &str,
    is_target: F,
    spec: &ConvergenceSpec<JobStatus>,
) -> Result<String>
where
    J: JobSource + ?Sized,
    F: Fn(&JobNode) -> bool,
{
    JobWalk::new(is_target)
        .await_resource(source, job_id, spec)
        .await
}
