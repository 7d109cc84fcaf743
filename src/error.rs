//! Error types for resource ownership.
//!
//! The taxonomy separates failures callers can recover from, programmer
//! errors, and the single fatal condition allowed to escape a release path:
//!
//! - [`AcquireError`] - the resource could not be obtained (retryable)
//! - [`ObjectReleased`] - an owner was used after release (programmer error)
//! - [`Corruption`] - process state is inconsistent (always fatal)
//! - [`StepFailure`] - a cleanup step failed; recorded, never raised
//!
//! # Example
//!
//! ```rust
//! use relinquish::{Lifecycle, ObjectReleased, Releasable};
//!
//! let lifecycle = Lifecycle::builder("connection").build();
//! lifecycle.release().unwrap();
//!
//! let err: ObjectReleased = lifecycle.ensure_active().unwrap_err();
//! assert_eq!(err.object, "connection");
//! ```

use std::time::Duration;

use thiserror::Error;

/// Boxed error carried by cleanup steps and external systems.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while acquiring a resource.
///
/// Acquisition is never retried internally; the caller decides.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The external system refused the request.
    #[error("{system} denied acquisition: {source}")]
    Denied {
        /// Name of the external system.
        system: String,
        /// The system's own error.
        #[source]
        source: BoxError,
    },

    /// The external system did not answer within the caller's bound.
    ///
    /// Nothing stays acquired: a reference that arrives late is released.
    #[error("acquisition timed out after {after:?}")]
    Timeout {
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The acquiring task went away before producing a result.
    #[error("acquisition was cancelled")]
    Cancelled,
}

impl AcquireError {
    /// Wrap a system error as a denial.
    pub fn denied(system: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AcquireError::Denied {
            system: system.into(),
            source: source.into(),
        }
    }

    /// Whether retrying the acquisition could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AcquireError::Cancelled)
    }
}

/// An operation was attempted on an owner that has already been released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{object} has already been released")]
pub struct ObjectReleased {
    /// Name of the released owner.
    pub object: String,
}

impl ObjectReleased {
    /// Create the error for the named owner.
    pub fn new(object: impl Into<String>) -> Self {
        ObjectReleased {
            object: object.into(),
        }
    }
}

/// Use of a [`ResourceHandle`](crate::ResourceHandle) after release.
pub type UseAfterRelease = ObjectReleased;

/// Unrecoverable process corruption detected during release.
///
/// This is the only error [`Releasable::release`](crate::Releasable::release)
/// returns. It must never be caught and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("corruption while releasing {object} (step `{step}`): {reason}")]
pub struct Corruption {
    /// Owner whose release detected the corruption.
    pub object: String,
    /// Cleanup step that reported it.
    pub step: String,
    /// Description supplied by the step.
    pub reason: String,
}

/// A cleanup step that failed without corrupting the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{object}: cleanup step `{step}` failed: {cause}")]
pub struct StepFailure {
    /// Owner the step belongs to.
    pub object: String,
    /// Step name.
    pub step: String,
    /// Rendered cause.
    pub cause: String,
}

/// Outcome of one cleanup step, as returned by the step itself.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step failed; siblings and base levels still run.
    #[error(transparent)]
    Failed(BoxError),

    /// A released child reported its own failures.
    #[error("{} nested cleanup failure(s)", .0.len())]
    Nested(Vec<StepFailure>),

    /// The step detected corruption. Remaining steps still run, then the
    /// corruption propagates out of `release()`.
    #[error("corrupted: {0}")]
    Corrupted(String),
}

impl StepError {
    /// Build a plain failure from any error or message.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        StepError::Failed(err.into())
    }

    /// Build a corruption signal.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        StepError::Corrupted(reason.into())
    }
}

/// Crate-level error for callers that funnel everything into one type.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`AcquireError`].
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// See [`ObjectReleased`].
    #[error(transparent)]
    Released(#[from] ObjectReleased),

    /// See [`Corruption`].
    #[error(transparent)]
    Corruption(#[from] Corruption),
}

/// Result alias over [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
