//! Cleanup steps and the two release paths.

use crate::error::StepError;

/// Boxed cleanup action.
pub(crate) type StepAction = Box<dyn FnOnce() -> Result<(), StepError> + Send>;

/// How a release was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReleaseMode {
    /// A caller (or a scope guard) asked for release.
    Explicit,
    /// The owner was dropped or leaked without release and the safety net
    /// ran. Other owners may already be gone at this point.
    Fallback,
}

/// Which release paths a cleanup step participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepKind {
    /// Touches other owners (children, wrapped handles, ambient state).
    /// Runs on the explicit path only.
    Managed,
    /// Releases a raw resource nobody else will release.
    /// Runs on both paths.
    Unmanaged,
}

impl StepKind {
    /// Whether a step of this kind runs when released via `mode`.
    pub fn runs_in(self, mode: ReleaseMode) -> bool {
        match (self, mode) {
            (StepKind::Unmanaged, _) => true,
            (StepKind::Managed, ReleaseMode::Explicit) => true,
            (StepKind::Managed, ReleaseMode::Fallback) => false,
        }
    }
}

/// One named level of an owner's release logic.
pub(crate) struct CleanupStep {
    pub(crate) name: String,
    pub(crate) kind: StepKind,
    pub(crate) action: StepAction,
}

impl std::fmt::Debug for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStep")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("action", &"<function>")
            .finish()
    }
}
