//! Testing utilities for code that owns resources.
//!
//! - [`MockSystem`] - an [`ExternalSystem`] that records every acquire and
//!   release, with switches for denial, slow acquisition and failing
//!   releases
//! - [`assert_released!`](crate::assert_released) and
//!   [`assert_object_released!`](crate::assert_object_released)
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::testing::MockSystem;
//! use relinquish::{assert_released, Releasable, ResourceHandle};
//!
//! let system = Arc::new(MockSystem::new().failing_release("wal"));
//! let wal = ResourceHandle::acquire(system.clone(), &"wal").unwrap();
//!
//! let report = wal.release().unwrap();
//! assert_eq!(report.failures.len(), 1);
//! assert_released!(wal);
//! assert_eq!(system.live(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::handle::ExternalSystem;

/// Reference issued by [`MockSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockRef(pub u64);

/// Failures produced by [`MockSystem`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    /// Acquisition denied by configuration.
    #[error("acquisition of `{0}` denied")]
    Denied(String),
    /// Release configured to fail.
    #[error("release of `{0}` failed")]
    ReleaseFailed(String),
    /// Release configured to report corruption.
    #[error("release of `{0}` found corrupted state")]
    Corrupted(String),
}

#[derive(Debug, Default)]
struct MockState {
    labels: HashMap<u64, &'static str>,
    releases: HashMap<u64, usize>,
    release_log: Vec<&'static str>,
    acquired: usize,
}

/// Recording external system for tests.
///
/// Acquisition specs are static labels; labels double as the keys for the
/// failure switches and the release log.
#[derive(Debug, Default)]
pub struct MockSystem {
    next: AtomicU64,
    deny: bool,
    delay: Option<Duration>,
    failing: HashSet<&'static str>,
    corrupting: HashSet<&'static str>,
    state: Mutex<MockState>,
}

impl MockSystem {
    /// A system that grants everything and releases cleanly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every acquisition.
    pub fn denying(mut self) -> Self {
        self.deny = true;
        self
    }

    /// Block each acquisition for `delay`.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make releases of `label` fail.
    pub fn failing_release(mut self, label: &'static str) -> Self {
        self.failing.insert(label);
        self
    }

    /// Make releases of `label` report corruption.
    pub fn corrupting_release(mut self, label: &'static str) -> Self {
        self.corrupting.insert(label);
        self
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        self.state.lock().acquired
    }

    /// Release calls received for `reference`.
    pub fn releases_of(&self, reference: MockRef) -> usize {
        self.state
            .lock()
            .releases
            .get(&reference.0)
            .copied()
            .unwrap_or(0)
    }

    /// Release calls received in total.
    pub fn total_releases(&self) -> usize {
        self.state.lock().releases.values().sum()
    }

    /// Acquired references that have not been released.
    pub fn live(&self) -> usize {
        let state = self.state.lock();
        state
            .labels
            .keys()
            .filter(|id| !state.releases.contains_key(*id))
            .count()
    }

    /// Labels in the order their releases arrived.
    pub fn release_log(&self) -> Vec<&'static str> {
        self.state.lock().release_log.clone()
    }
}

impl ExternalSystem for MockSystem {
    type Spec = &'static str;
    type Ref = MockRef;
    type Error = MockError;

    fn name(&self) -> &str {
        "mock"
    }

    fn acquire(&self, label: &&'static str) -> Result<MockRef, MockError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.deny {
            return Err(MockError::Denied(label.to_string()));
        }

        let id = self.next.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.labels.insert(id, *label);
        state.acquired += 1;
        Ok(MockRef(id))
    }

    fn release(&self, reference: MockRef) -> Result<(), MockError> {
        let mut state = self.state.lock();
        *state.releases.entry(reference.0).or_insert(0) += 1;
        let label = state.labels.get(&reference.0).copied().unwrap_or("?");
        state.release_log.push(label);

        if self.corrupting.contains(label) {
            Err(MockError::Corrupted(label.to_string()))
        } else if self.failing.contains(label) {
            Err(MockError::ReleaseFailed(label.to_string()))
        } else {
            Ok(())
        }
    }

    fn is_fatal(&self, error: &MockError) -> bool {
        matches!(error, MockError::Corrupted(_))
    }
}

/// Assert that an owner has been released.
///
/// # Example
///
/// ```rust
/// use relinquish::{assert_released, Lifecycle, Releasable};
///
/// let lifecycle = Lifecycle::builder("pool").build();
/// lifecycle.release().unwrap();
/// assert_released!(lifecycle);
/// ```
#[macro_export]
macro_rules! assert_released {
    ($owner:expr) => {
        if !$crate::Releasable::is_released(&$owner) {
            panic!(
                "Expected {} to be released, but it is still active",
                $crate::Releasable::name(&$owner)
            );
        }
    };
}

/// Assert that an operation failed because its owner was released.
///
/// # Example
///
/// ```rust
/// use relinquish::{assert_object_released, Lifecycle, Releasable};
///
/// let lifecycle = Lifecycle::builder("pool").build();
/// lifecycle.release().unwrap();
/// assert_object_released!(lifecycle.ensure_active(), "pool");
/// ```
#[macro_export]
macro_rules! assert_object_released {
    ($result:expr) => {
        match $result {
            Err(err) => {
                let _: &$crate::ObjectReleased = &err;
            }
            Ok(v) => panic!("Expected ObjectReleased, got Ok({:?})", v),
        }
    };
    ($result:expr, $object:expr) => {
        match $result {
            Err(err) => {
                let err: $crate::ObjectReleased = err;
                assert_eq!(err.object, $object);
            }
            Ok(v) => panic!("Expected ObjectReleased for {}, got Ok({:?})", $object, v),
        }
    };
}
