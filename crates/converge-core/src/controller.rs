//! The convergence controller: poll a probe until the remote object settles.
//!
//! A resource operation issues its mutation, then hands a [`Probe`] and a
//! [`ConvergenceSpec`] to [`converge`]. The controller sleeps for the spec's
//! initial delay, then probes sequentially until the classifier reports a
//! terminal outcome, the deadline passes, or the caller cancels.
//!
//! The controller spawns nothing and keeps no state between calls; all timers
//! belong to the call in progress.

use crate::classify::{classify_error, classify_status, Outcome};
use crate::error::{ApiError, Error, Result};
use crate::spec::ConvergenceSpec;
use crate::status::Status;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One observation of a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T, S> {
    /// The object as returned by the remote read
    pub object: T,
    /// Its status, normalized by the probe
    pub status: S,
}

impl<T, S> Observation<T, S> {
    /// Pair an object with its normalized status.
    pub const fn new(object: T, status: S) -> Self {
        Self { object, status }
    }
}

/// Result of a single probe call.
pub type ProbeResult<T, S> = std::result::Result<Observation<T, S>, ApiError>;

/// A side-effecting read of one remote object's current state.
///
/// Implementations perform exactly one remote read per call and translate the
/// raw status label into `Status` before returning.
#[async_trait]
pub trait Probe: Send + Sync {
    /// The object returned on success.
    type Object: fmt::Debug + Send;

    /// The status family this probe reports.
    type Status: Status;

    /// Read the object once.
    async fn probe(&self) -> ProbeResult<Self::Object, Self::Status>;
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for &P {
    type Object = P::Object;
    type Status = P::Status;

    async fn probe(&self) -> ProbeResult<Self::Object, Self::Status> {
        (**self).probe().await
    }
}

/// A [`Probe`] backed by an async closure. Built with [`probe_fn`].
#[derive(Clone)]
pub struct FnProbe<F> {
    f: F,
}

/// Wrap an async closure as a [`Probe`].
pub const fn probe_fn<F>(f: F) -> FnProbe<F> {
    FnProbe { f }
}

#[async_trait]
impl<F, Fut, T, S> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProbeResult<T, S>> + Send,
    T: fmt::Debug + Send,
    S: Status,
{
    type Object = T;
    type Status = S;

    async fn probe(&self) -> ProbeResult<T, S> {
        (self.f)().await
    }
}

/// Poll `probe` until it reaches one of `spec.target`.
///
/// Returns `Ok(Some(object))` with the final observation's object, or `Ok(None)`
/// when a not-found probe counts as success (deletes, or specs that opt in).
///
/// # Errors
///
/// - [`Error::InvalidSpec`] if the spec breaks its invariants.
/// - [`Error::Probe`] on the first probe failure that is not an accepted
///   not-found.
/// - [`Error::FailedStatus`] when the object enters one of `spec.failed`.
/// - [`Error::Timeout`] or [`Error::UnexpectedStatus`] once `spec.timeout`
///   has elapsed.
pub async fn converge<P>(
    probe: &P,
    spec: &ConvergenceSpec<P::Status>,
) -> Result<Option<P::Object>>
where
    P: Probe + ?Sized,
{
    converge_with_cancellation(probe, spec, &CancellationToken::new()).await
}

/// Like [`converge`], but aborts with [`Error::Cancelled`] as soon as `cancel`
/// fires. The token is raced against every sleep and every probe call, so a
/// probe stuck on a remote read is dropped when the token fires. A probe still
/// in flight at the deadline is dropped the same way.
///
/// # Errors
///
/// See [`converge`]; additionally returns [`Error::Cancelled`].
pub async fn converge_with_cancellation<P>(
    probe: &P,
    spec: &ConvergenceSpec<P::Status>,
    cancel: &CancellationToken,
) -> Result<Option<P::Object>>
where
    P: Probe + ?Sized,
{
    spec.validate()?;

    let started = Instant::now();
    let deadline = started + spec.timeout;
    let poll_wait = spec.poll_wait();

    pause(spec.initial_delay, cancel).await?;

    let mut last: Option<(Observation<P::Object, P::Status>, bool)> = None;
    let mut attempt: u32 = 0;

    loop {
        if Instant::now() >= deadline {
            return Err(deadline_error(last, spec.timeout));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempt += 1;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = sleep_until(deadline) => return Err(deadline_error(last, spec.timeout)),
            result = probe.probe() => result,
        };
        let observation = match result {
            Ok(observation) => observation,
            Err(err) => {
                return match classify_error(&err, spec) {
                    Outcome::NotFoundTerminal => {
                        debug!(
                            direction = %spec.direction,
                            attempt,
                            "object not found, treating as converged"
                        );
                        Ok(None)
                    }
                    _ => Err(Error::Probe(err)),
                };
            }
        };

        debug!(
            direction = %spec.direction,
            attempt,
            status = %observation.status,
            elapsed = ?started.elapsed(),
            "probed object"
        );

        match classify_status(&observation.status, spec) {
            Outcome::Target => return Ok(Some(observation.object)),
            Outcome::Failed => {
                return Err(Error::FailedStatus {
                    status: observation.status.to_string(),
                    last_object: Some(format!("{:?}", observation.object)),
                });
            }
            outcome => {
                let recognized = outcome == Outcome::Pending { recognized: true };
                if !recognized {
                    warn!(
                        direction = %spec.direction,
                        status = %observation.status,
                        "unrecognized status, continuing to poll"
                    );
                }
                last = Some((observation, recognized));
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        pause(poll_wait.min(remaining), cancel).await?;
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        () = sleep(duration) => Ok(()),
    }
}

fn deadline_error<T: fmt::Debug, S: Status>(
    last: Option<(Observation<T, S>, bool)>,
    timeout: Duration,
) -> Error {
    match last {
        Some((observation, false)) => Error::UnexpectedStatus {
            status: observation.status.to_string(),
            last_object: Some(format!("{:?}", observation.object)),
        },
        Some((observation, true)) => Error::Timeout {
            last_status: Some(observation.status.to_string()),
            last_object: Some(format!("{:?}", observation.object)),
            timeout,
        },
        None => Error::Timeout {
            last_status: None,
            last_object: None,
            timeout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ResourceStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of results, repeating the last one.
    struct ScriptedProbe {
        script: Mutex<VecDeque<ProbeResult<u32, ResourceStatus>>>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(script: Vec<ProbeResult<u32, ResourceStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        type Object = u32;
        type Status = ResourceStatus;

        async fn probe(&self) -> ProbeResult<u32, ResourceStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn seen(object: u32, status: ResourceStatus) -> ProbeResult<u32, ResourceStatus> {
        Ok(Observation::new(object, status))
    }

    fn spec() -> ConvergenceSpec<ResourceStatus> {
        ConvergenceSpec::create(
            [ResourceStatus::Build, ResourceStatus::Pending],
            [ResourceStatus::Active],
        )
        .with_initial_delay(Duration::from_secs(1))
        .with_poll_interval(Duration::from_secs(2))
        .with_min_poll_interval(Duration::ZERO)
        .with_timeout(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn converges_on_target() {
        let probe = ScriptedProbe::new(vec![
            seen(1, ResourceStatus::Pending),
            seen(2, ResourceStatus::Build),
            seen(3, ResourceStatus::Active),
        ]);

        let object = converge(&probe, &spec()).await.unwrap();
        assert_eq!(object, Some(3));
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_is_fatal() {
        let probe = ScriptedProbe::new(vec![
            seen(1, ResourceStatus::Pending),
            Err(ApiError::Unauthorized("expired".into())),
        ]);

        let err = converge(&probe, &spec()).await.unwrap_err();
        assert_eq!(err, Error::Probe(ApiError::Unauthorized("expired".into())));
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_on_create_is_fatal() {
        let probe = ScriptedProbe::new(vec![Err(ApiError::NotFound("gone".into()))]);
        let err = converge(&probe, &spec()).await.unwrap_err();
        assert!(matches!(err, Error::Probe(ApiError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_stops_polling() {
        let probe = ScriptedProbe::new(vec![
            seen(1, ResourceStatus::Build),
            seen(2, ResourceStatus::Error),
            seen(3, ResourceStatus::Active),
        ]);
        let spec = spec().with_failed([ResourceStatus::Error]);

        let err = converge(&probe, &spec).await.unwrap_err();
        assert_eq!(
            err,
            Error::FailedStatus {
                status: "ERROR".into(),
                last_object: Some("2".into()),
            }
        );
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognized_status_times_out_as_unexpected() {
        let probe = ScriptedProbe::new(vec![seen(7, ResourceStatus::from("migrating"))]);

        let err = converge(&probe, &spec()).await.unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedStatus {
                status: "MIGRATING".into(),
                last_object: Some("7".into()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_spec_never_probes() {
        let probe = ScriptedProbe::new(vec![seen(1, ResourceStatus::Active)]);
        let spec = spec().with_timeout(Duration::ZERO);

        let err = converge(&probe, &spec).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let probe = ScriptedProbe::new(vec![seen(1, ResourceStatus::Pending)]);
        let spec = spec().with_timeout(Duration::from_secs(600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(4)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = converge_with_cancellation(&probe, &spec, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_hung_probe() {
        let probe = probe_fn(|| async {
            sleep(Duration::from_secs(3600)).await;
            Ok::<_, ApiError>(Observation::new(1_u32, ResourceStatus::Pending))
        });
        let spec = spec().with_timeout(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(4)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = converge_with_cancellation(&probe, &spec, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_stops_at_deadline() {
        let probe = probe_fn(|| async {
            sleep(Duration::from_secs(3600)).await;
            Ok::<_, ApiError>(Observation::new(1_u32, ResourceStatus::Active))
        });
        let spec = spec().with_timeout(Duration::from_secs(60));

        let started = Instant::now();
        let err = converge(&probe, &spec).await.unwrap_err();
        assert_eq!(
            err,
            Error::Timeout {
                last_status: None,
                last_object: None,
                timeout: Duration::from_secs(60),
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn closure_probe() {
        let probe = probe_fn(|| async {
            Ok::<_, ApiError>(Observation::new("vol-1", "available".to_string()))
        });
        let spec = ConvergenceSpec::create(["creating".to_string()], ["available".to_string()])
            .with_initial_delay(Duration::ZERO);

        let object = converge(&probe, &spec).await.unwrap();
        assert_eq!(object, Some("vol-1"));
    }
}
