//! Leaf owner of one externally-owned reference.
//!
//! A [`ResourceHandle`] pairs a reference with the [`ExternalSystem`] that
//! issued it. The reference goes back to the system exactly once: through
//! [`Releasable::release`], or through the fallback path if the handle is
//! dropped or leaked while live.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::testing::MockSystem;
//! use relinquish::{Releasable, ResourceHandle};
//!
//! let system = Arc::new(MockSystem::new());
//! let handle = ResourceHandle::acquire(system.clone(), &"config.toml").unwrap();
//! let reference = handle.get().unwrap();
//!
//! handle.release().unwrap();
//! handle.release().unwrap();
//!
//! assert_eq!(system.releases_of(reference), 1);
//! assert!(handle.get().is_err());
//! ```

mod heap;
mod system;
#[cfg(feature = "async")]
mod timeout;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::error::{AcquireError, Corruption, StepError, UseAfterRelease};
use crate::lifecycle::{Lifecycle, LifecycleState, Releasable, ReleaseReport};
use crate::reclaimer::Reclaimer;

pub use heap::{HeapAllocator, HeapError, RawBlock};
pub use system::ExternalSystem;

/// A live reference into an [`ExternalSystem`].
///
/// The reference can only be read through [`get`](Self::get), which fails
/// once the handle is released.
pub struct ResourceHandle<S: ExternalSystem> {
    reference: S::Ref,
    system: Arc<S>,
    lifecycle: Lifecycle,
}

impl<S: ExternalSystem> std::fmt::Debug for ResourceHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("system", &self.system.name())
            .field("reference", &self.reference)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl<S: ExternalSystem> ResourceHandle<S> {
    /// Acquire a resource from `system`.
    ///
    /// Fails with [`AcquireError::Denied`] if the system refuses. Nothing is
    /// retried.
    pub fn acquire(system: Arc<S>, spec: &S::Spec) -> Result<Self, AcquireError> {
        let reference = system
            .acquire(spec)
            .map_err(|err| AcquireError::denied(system.name(), err))?;
        Ok(Self::adopt(system, reference, None))
    }

    /// Acquire a resource and register it with `reclaimer`, so a handle
    /// that is leaked or dropped while live is swept later.
    pub fn acquire_with_fallback(
        system: Arc<S>,
        spec: &S::Spec,
        reclaimer: &Reclaimer,
    ) -> Result<Self, AcquireError> {
        let reference = system
            .acquire(spec)
            .map_err(|err| AcquireError::denied(system.name(), err))?;
        Ok(Self::adopt(system, reference, Some(reclaimer)))
    }

    /// Take ownership of a reference acquired elsewhere.
    ///
    /// The reference must not be released by anyone else afterwards.
    pub fn adopt(system: Arc<S>, reference: S::Ref, fallback: Option<&Reclaimer>) -> Self {
        let name = format!("{}#{:?}", system.name(), reference);
        tracing::debug!(handle = %name, "acquired");

        let releaser = Arc::clone(&system);
        let mut builder = Lifecycle::builder(name).unmanaged("release reference", move || {
            releaser.release(reference).map_err(|err| {
                if releaser.is_fatal(&err) {
                    StepError::corrupted(err.to_string())
                } else {
                    StepError::failed(err)
                }
            })
        });
        if let Some(reclaimer) = fallback {
            builder = builder.fallback(reclaimer);
        }

        ResourceHandle {
            reference,
            system,
            lifecycle: builder.build(),
        }
    }

    /// The reference, while the handle is live.
    pub fn get(&self) -> Result<S::Ref, UseAfterRelease> {
        self.lifecycle.ensure_active()?;
        Ok(self.reference)
    }

    /// The issuing system.
    pub fn system(&self) -> &Arc<S> {
        &self.system
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Whether a fallback registration is held.
    pub fn has_fallback(&self) -> bool {
        self.lifecycle.fallback_id().is_some()
    }
}

impl<S: ExternalSystem> Releasable for ResourceHandle<S> {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        self.lifecycle.release()
    }

    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    fn name(&self) -> &str {
        self.lifecycle.name()
    }
}
