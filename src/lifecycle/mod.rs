//! The release protocol shared by every owner.
//!
//! An owner embeds a [`Lifecycle`] and forwards [`Releasable`] to it. The
//! lifecycle holds:
//!
//! - an atomic state (`Active -> Releasing -> Released`), so racing callers
//!   agree on exactly one winner;
//! - an ordered list of cleanup steps collected at construction;
//! - an optional fallback registration with a [`Reclaimer`].
//!
//! # Extending release logic
//!
//! Each level of an owner that introduces a resource adds one step to the
//! builder. Steps run in reverse registration order, so a base level that
//! registers first runs last, after every level built on top of it. The
//! chain is data: no level can forget to run its base.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use relinquish::{Lifecycle, Releasable};
//!
//! let order = Arc::new(Mutex::new(Vec::new()));
//!
//! let (o1, o2) = (order.clone(), order.clone());
//! let lifecycle = Lifecycle::builder("holder")
//!     .managed("base", move || { o1.lock().unwrap().push("base"); Ok(()) })
//!     .managed("derived", move || { o2.lock().unwrap().push("derived"); Ok(()) })
//!     .build();
//!
//! let report = lifecycle.release().unwrap();
//! assert!(report.is_first());
//! assert!(!lifecycle.release().unwrap().is_first());
//! assert_eq!(*order.lock().unwrap(), vec!["derived", "base"]);
//! ```
//!
//! # Forgotten release
//!
//! Dropping an active lifecycle takes the fallback path. With a fallback
//! registration the work is left to the reclaimer's next sweep; without one
//! the unmanaged steps run inline. Either way managed steps are skipped and
//! failures are only logged.

mod report;
mod step;


use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Corruption, ObjectReleased, StepError, StepFailure};
use crate::reclaimer::{FallbackToken, Reclaimer};

pub use report::{ReleaseOutcome, ReleaseReport};
pub use step::{ReleaseMode, StepKind};

use step::CleanupStep;

const ACTIVE: u8 = 0;
const RELEASING: u8 = 1;
const RELEASED: u8 = 2;

/// A value that owns resources and can give them back exactly once.
///
/// `release` is idempotent: the first call runs the cleanup, later calls
/// return an [`AlreadyReleased`](ReleaseOutcome::AlreadyReleased) report.
/// The only error it returns is [`Corruption`].
pub trait Releasable {
    /// Release everything this value owns.
    fn release(&self) -> Result<ReleaseReport, Corruption>;

    /// True once a release has started.
    fn is_released(&self) -> bool;

    /// Name used in reports and diagnostics.
    fn name(&self) -> &str;

    /// Domain spelling of [`release`](Self::release) for owners where
    /// "close" reads better (files, sockets, sessions). Same semantics.
    fn close(&self) -> Result<ReleaseReport, Corruption> {
        self.release()
    }
}

impl<T: Releasable + ?Sized> Releasable for Arc<T> {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        (**self).release()
    }

    fn is_released(&self) -> bool {
        (**self).is_released()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Releasable + ?Sized> Releasable for Box<T> {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        (**self).release()
    }

    fn is_released(&self) -> bool {
        (**self).is_released()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Usable.
    Active,
    /// A release is running. Treated as released by every check.
    Releasing,
    /// Terminal.
    Released,
}

// ============================================================================
// Core - shared with the reclaimer's fallback callback
// ============================================================================

struct Core {
    name: String,
    state: AtomicU8,
    steps: Mutex<Vec<CleanupStep>>,
}

impl Core {
    fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    fn run(&self, mode: ReleaseMode) -> Result<ReleaseReport, Corruption> {
        if self
            .state
            .compare_exchange(ACTIVE, RELEASING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(ReleaseReport::already_released(&self.name));
        }

        let steps = std::mem::take(&mut *self.steps.lock());
        let mut report = ReleaseReport::released(&self.name, mode);
        let mut corruption: Option<Corruption> = None;

        for step in steps.into_iter().rev() {
            if !step.kind.runs_in(mode) {
                report.steps_skipped += 1;
                continue;
            }

            report.steps_run += 1;
            let CleanupStep { name, action, .. } = step;
            let outcome = catch_unwind(AssertUnwindSafe(action)).unwrap_or_else(|payload| {
                Err(StepError::failed(format!(
                    "panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

            match outcome {
                Ok(()) => {}
                Err(StepError::Failed(cause)) => {
                    tracing::warn!(
                        object = %self.name,
                        step = %name,
                        ?mode,
                        "cleanup step failed: {}",
                        cause
                    );
                    report.failures.push(StepFailure {
                        object: self.name.clone(),
                        step: name,
                        cause: cause.to_string(),
                    });
                }
                Err(StepError::Nested(failures)) => {
                    tracing::warn!(
                        object = %self.name,
                        step = %name,
                        count = failures.len(),
                        "child reported cleanup failures"
                    );
                    report.absorb(failures);
                }
                Err(StepError::Corrupted(reason)) => {
                    tracing::error!(
                        object = %self.name,
                        step = %name,
                        ?mode,
                        "corruption detected: {}",
                        reason
                    );
                    report.failures.push(StepFailure {
                        object: self.name.clone(),
                        step: name.clone(),
                        cause: format!("corrupted: {}", reason),
                    });
                    corruption.get_or_insert(Corruption {
                        object: self.name.clone(),
                        step: name,
                        reason,
                    });
                }
            }
        }

        self.state.store(RELEASED, Ordering::Release);
        tracing::debug!(
            object = %self.name,
            ?mode,
            steps = report.steps_run,
            failures = report.failures.len(),
            "released"
        );

        match corruption {
            Some(c) => Err(c),
            None => Ok(report),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Turn a child's release result into a step outcome.
pub(crate) fn child_outcome(result: Result<ReleaseReport, Corruption>) -> Result<(), StepError> {
    match result {
        Ok(report) if report.is_clean() => Ok(()),
        Ok(report) => Err(StepError::Nested(report.failures)),
        Err(corruption) => Err(StepError::Corrupted(corruption.to_string())),
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Release state machine embedded by concrete owners.
///
/// Built with [`Lifecycle::builder`].
pub struct Lifecycle {
    core: Arc<Core>,
    fallback: Mutex<Option<FallbackToken>>,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.core.name)
            .field("state", &self.state())
            .field("fallback", &self.fallback.lock().as_ref().map(FallbackToken::id))
            .finish()
    }
}

impl Lifecycle {
    /// Start collecting cleanup steps for the named owner.
    pub fn builder(name: impl Into<String>) -> LifecycleBuilder {
        LifecycleBuilder {
            name: name.into(),
            steps: Vec::new(),
            reclaimer: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        match self.core.state.load(Ordering::Acquire) {
            ACTIVE => LifecycleState::Active,
            RELEASING => LifecycleState::Releasing,
            _ => LifecycleState::Released,
        }
    }

    /// Fail with [`ObjectReleased`] unless the owner is still usable.
    ///
    /// Owners call this at the top of every operation except release.
    pub fn ensure_active(&self) -> Result<(), ObjectReleased> {
        if self.core.is_active() {
            Ok(())
        } else {
            Err(ObjectReleased::new(self.core.name.clone()))
        }
    }

    /// Id of the fallback registration, while one is held.
    pub fn fallback_id(&self) -> Option<u64> {
        self.fallback.lock().as_ref().map(FallbackToken::id)
    }
}

impl Releasable for Lifecycle {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        if !self.core.is_active() {
            return Ok(ReleaseReport::already_released(&self.core.name));
        }
        let token = self.fallback.lock().take();
        if let Some(token) = token {
            token.deregister();
        }
        self.core.run(ReleaseMode::Explicit)
    }

    fn is_released(&self) -> bool {
        !self.core.is_active()
    }

    fn name(&self) -> &str {
        &self.core.name
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if !self.core.is_active() {
            return;
        }

        if let Some(token) = self.fallback.get_mut().take() {
            tracing::warn!(
                object = %self.core.name,
                token = token.id(),
                "dropped without release; left for the reclaimer"
            );
            drop(token);
            return;
        }

        tracing::warn!(
            object = %self.core.name,
            "dropped without release; running fallback cleanup"
        );
        if let Err(corruption) = self.core.run(ReleaseMode::Fallback) {
            tracing::error!(
                object = %self.core.name,
                "fallback cleanup hit corruption: {}",
                corruption
            );
        }
    }
}

// ============================================================================
// LifecycleBuilder
// ============================================================================

/// Collects the cleanup chain of an owner.
///
/// Register base levels first; they run last.
pub struct LifecycleBuilder {
    name: String,
    steps: Vec<CleanupStep>,
    reclaimer: Option<Reclaimer>,
}

impl std::fmt::Debug for LifecycleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("fallback", &self.reclaimer.is_some())
            .finish()
    }
}

impl LifecycleBuilder {
    /// Add a step of the given kind.
    pub fn step<F>(mut self, name: impl Into<String>, kind: StepKind, action: F) -> Self
    where
        F: FnOnce() -> Result<(), StepError> + Send + 'static,
    {
        self.steps.push(CleanupStep {
            name: name.into(),
            kind,
            action: Box::new(action),
        });
        self
    }

    /// Add a step that runs on the explicit path only.
    pub fn managed<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<(), StepError> + Send + 'static,
    {
        self.step(name, StepKind::Managed, action)
    }

    /// Add a step that runs on both the explicit and fallback paths.
    pub fn unmanaged<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<(), StepError> + Send + 'static,
    {
        self.step(name, StepKind::Unmanaged, action)
    }

    /// Take ownership of a child and release it on the explicit path.
    ///
    /// The child's own failures are folded into this owner's report. On the
    /// fallback path the child is dropped and handles itself.
    pub fn child<R>(self, name: impl Into<String>, child: R) -> Self
    where
        R: Releasable + Send + 'static,
    {
        self.managed(name, move || child_outcome(child.release()))
    }

    /// Register with `reclaimer` so a forgotten release is eventually swept.
    ///
    /// If the reclaimer is already shutting down nothing is registered and a
    /// forgotten release runs the fallback path inline on drop instead.
    ///
    /// Only owners of raw resources with no other release guarantee need
    /// this; owners that wrap other owners should not register.
    pub fn fallback(mut self, reclaimer: &Reclaimer) -> Self {
        self.reclaimer = Some(reclaimer.clone());
        self
    }

    /// Number of steps collected so far.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no step has been added.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Finish the chain.
    pub fn build(self) -> Lifecycle {
        let core = Arc::new(Core {
            name: self.name,
            state: AtomicU8::new(ACTIVE),
            steps: Mutex::new(self.steps),
        });

        let token = self.reclaimer.and_then(|reclaimer| {
            let swept = Arc::clone(&core);
            reclaimer.register(core.name.clone(), move || {
                child_outcome(swept.run(ReleaseMode::Fallback))
            })
        });

        Lifecycle {
            core,
            fallback: Mutex::new(token),
        }
    }
}
