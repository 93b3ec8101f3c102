//! Bounded retry of a mutating call that races a lock on a parent resource.
//!
//! Some control planes reject a create with a client error (403, 409) while a
//! parent object, such as a cluster finishing a previous operation, holds a
//! coarse lock. [`retry_initiator_on_conflict`] waits for the parent to become
//! available again before each retry, and gives up after a fixed number of
//! attempts.

use crate::controller::{converge_with_cancellation, Probe};
use crate::error::{ApiError, Error, Result};
use crate::spec::ConvergenceSpec;
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of retries after the first attempt.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// The mutating remote call that starts a transition.
#[async_trait]
pub trait Initiator: Send + Sync {
    /// Value returned by a successful call (a created object, a job handle, ...).
    type Output: Send;

    /// Issue the call once.
    async fn initiate(&self) -> std::result::Result<Self::Output, ApiError>;
}

/// An [`Initiator`] backed by an async closure. Built with [`initiator_fn`].
#[derive(Clone)]
pub struct FnInitiator<F> {
    f: F,
}

/// Wrap an async closure as an [`Initiator`].
pub const fn initiator_fn<F>(f: F) -> FnInitiator<F> {
    FnInitiator { f }
}

#[async_trait]
impl<F, Fut, T> Initiator for FnInitiator<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, ApiError>> + Send,
    T: Send,
{
    type Output = T;

    async fn initiate(&self) -> std::result::Result<T, ApiError> {
        (self.f)().await
    }
}

/// A resource that must be available before a rejected call is retried.
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Identifier of the awaited resource, used in errors and logs.
    fn id(&self) -> &str;

    /// Block until the resource is available.
    ///
    /// # Errors
    ///
    /// Any convergence failure; it aborts the retry loop.
    async fn await_ready(&self) -> Result<()>;
}

/// A [`Precondition`] satisfied when a probe converges on its spec.
pub struct ConvergedPrecondition<P: Probe> {
    id: String,
    probe: P,
    spec: ConvergenceSpec<P::Status>,
    cancel: CancellationToken,
}

impl<P: Probe> ConvergedPrecondition<P> {
    /// Wait for `probe` to reach `spec`'s target before each retry.
    pub fn new(id: impl Into<String>, probe: P, spec: ConvergenceSpec<P::Status>) -> Self {
        Self {
            id: id.into(),
            probe,
            spec,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the wait with [`Error::Cancelled`] when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl<P: Probe> Precondition for ConvergedPrecondition<P> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn await_ready(&self) -> Result<()> {
        match converge_with_cancellation(&self.probe, &self.spec, &self.cancel).await? {
            Some(_) => Ok(()),
            None => Err(Error::Probe(ApiError::NotFound(format!(
                "precondition `{}` no longer exists",
                self.id
            )))),
        }
    }
}

/// Progress of one conflict-retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRetryState {
    /// Retries performed so far; strictly increasing
    pub attempt: u32,
    /// Resource awaited between attempts
    pub precondition_id: String,
    /// Retries allowed after the first call
    pub max_retries: u32,
}

impl ConflictRetryState {
    /// Start a fresh loop.
    pub fn new(precondition_id: impl Into<String>, max_retries: u32) -> Self {
        Self {
            attempt: 0,
            precondition_id: precondition_id.into(),
            max_retries,
        }
    }

    /// Returns true once no retry is left.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }

    /// Record one more retry.
    pub fn advance(&mut self) {
        self.attempt += 1;
    }

    /// Number of initiator calls made when the current call fails.
    #[must_use]
    pub const fn calls(&self) -> u32 {
        self.attempt + 1
    }
}

/// Call `initiator`, retrying up to `max_depth` times while `is_retryable`
/// accepts the failure. Before each retry `precondition` must become ready.
///
/// An initiator that always fails with a retryable error is called exactly
/// `max_depth + 1` times.
///
/// # Errors
///
/// - [`Error::Remote`] with the original error when it is not retryable.
/// - [`Error::RetriesExhausted`] when the last allowed attempt still fails with
///   a retryable error.
/// - Whatever `precondition.await_ready()` returns if the wait fails.
pub async fn retry_initiator_on_conflict<I, R, P>(
    initiator: &I,
    is_retryable: R,
    precondition: &P,
    max_depth: u32,
) -> Result<I::Output>
where
    I: Initiator + ?Sized,
    R: Fn(&ApiError) -> bool,
    P: Precondition + ?Sized,
{
    let mut state = ConflictRetryState::new(precondition.id(), max_depth);

    loop {
        let err = match initiator.initiate().await {
            Ok(output) => {
                if state.attempt > 0 {
                    debug!(
                        precondition = %state.precondition_id,
                        attempt = state.attempt,
                        "initiator succeeded after retry"
                    );
                }
                return Ok(output);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(Error::Remote(err));
        }

        if state.is_exhausted() {
            return Err(Error::RetriesExhausted {
                attempts: state.calls(),
                precondition_id: state.precondition_id,
                last_error: err,
            });
        }

        warn!(
            precondition = %state.precondition_id,
            attempt = state.attempt + 1,
            max_retries = state.max_retries,
            error = %err,
            "initiator rejected by lock contention, waiting on precondition"
        );
        precondition.await_ready().await?;
        state.advance();
    }
}
