//! # converge-core
//!
//! Convergence engine for asynchronous cloud resources.
//!
//! Remote control planes accept a create, update, or delete and then move the
//! resource through intermediate statuses on their own schedule. This crate
//! provides the pieces a provider needs to wait for those transitions safely.
//!
//! ## Modules
//!
//! - [`error`] - Error types and HTTP status code mapping
//! - [`status`] - Normalized resource and job status enums
//! - [`spec`] - Convergence specs: pending and target statuses plus timing
//! - [`classify`] - Classification of a single observation against a spec
//! - [`controller`] - The polling loop that drives a resource to its target
//! - [`job_tree`] - Resolution of a resource identifier from nested async jobs
//! - [`retry`] - Bounded retry of initiators rejected by lock contention
//! - [`tags`] - Diff-based tag reconciliation
//! - [`locks`] - Per-resource mutual exclusion
//! - [`config`] - Timeout and polling configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod job_tree;
pub mod locks;
pub mod retry;
pub mod spec;
pub mod status;
pub mod tags;

// Re-export commonly used types
pub use classify::{classify, Outcome};
pub use config::ConvergenceConfig;
pub use controller::{converge, converge_with_cancellation, probe_fn, Observation, Probe};
pub use error::{ApiError, Error, Result};
pub use job_tree::{await_job_resource, resolve_job_resource, JobNode, JobSource, JobWalk};
pub use retry::{initiator_fn, retry_initiator_on_conflict, Initiator, Precondition};
pub use spec::{ConvergenceSpec, Direction};
pub use status::{JobStatus, ResourceStatus, Status};
pub use tags::{reconcile_tags, Tag, TagStore};
pub use tokio_util::sync::CancellationToken;
