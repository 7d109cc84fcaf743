//! What a single `release()` call did.

use super::step::ReleaseMode;
use crate::error::StepFailure;

/// Whether a `release()` call performed the release or found it done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReleaseOutcome {
    /// This call won the Active -> Released transition and ran the steps.
    Released,
    /// Another call (or the fallback path) got there first. Nothing ran.
    AlreadyReleased,
}

/// Summary of one `release()` call.
///
/// Step failures are recorded here instead of being raised; only
/// [`Corruption`](crate::Corruption) escapes `release()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Owner that was released.
    pub object: String,
    /// Whether this call did the work.
    pub outcome: ReleaseOutcome,
    /// Path the release took. Meaningful when `outcome` is `Released`.
    pub mode: ReleaseMode,
    /// Steps that ran.
    pub steps_run: usize,
    /// Managed steps dropped without running on the fallback path.
    pub steps_skipped: usize,
    /// Failures recorded while running steps, in execution order.
    pub failures: Vec<StepFailure>,
}

impl ReleaseReport {
    pub(crate) fn released(object: impl Into<String>, mode: ReleaseMode) -> Self {
        ReleaseReport {
            object: object.into(),
            outcome: ReleaseOutcome::Released,
            mode,
            steps_run: 0,
            steps_skipped: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn already_released(object: impl Into<String>) -> Self {
        ReleaseReport {
            object: object.into(),
            outcome: ReleaseOutcome::AlreadyReleased,
            mode: ReleaseMode::Explicit,
            steps_run: 0,
            steps_skipped: 0,
            failures: Vec::new(),
        }
    }

    /// True when this call performed the release.
    pub fn is_first(&self) -> bool {
        self.outcome == ReleaseOutcome::Released
    }

    /// True when no step failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Append failures recorded by a child.
    pub fn absorb(&mut self, failures: impl IntoIterator<Item = StepFailure>) {
        self.failures.extend(failures);
    }
}

impl std::fmt::Display for ReleaseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.outcome {
            ReleaseOutcome::AlreadyReleased => write!(f, "{}: already released", self.object),
            ReleaseOutcome::Released => write!(
                f,
                "{}: released ({:?}, {} step(s), {} failure(s))",
                self.object,
                self.mode,
                self.steps_run,
                self.failures.len()
            ),
        }
    }
}
