//! An owner of one managed handle that other owners build on.
//!
//! [`ResourceHolder`] is the plain shape most owners take: it holds a
//! handle, forwards operations to it while active, and releases it on the
//! explicit path. It never registers a fallback of its own; the handle
//! underneath is responsible for that.
//!
//! Owners that extend a holder add their cleanup through
//! [`ResourceHolder::extend`]. The holder registers its base step first, so
//! every extending step runs before it and the handle is still live while
//! they do.
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::testing::MockSystem;
//! use relinquish::{Releasable, ResourceHandle, ResourceHolder};
//!
//! let system = Arc::new(MockSystem::new());
//! let handle = ResourceHandle::acquire(system.clone(), &"journal").unwrap();
//!
//! let observed = system.clone();
//! let holder = ResourceHolder::extend(handle, move |builder, _handle| {
//!     builder.managed("flush journal", move || {
//!         assert_eq!(observed.total_releases(), 0);
//!         Ok(())
//!     })
//! });
//!
//! let report = holder.release().unwrap();
//! assert!(report.is_clean());
//! assert_eq!(system.total_releases(), 1);
//! ```

use std::sync::Arc;

use crate::error::{Corruption, ObjectReleased};
use crate::handle::{ExternalSystem, ResourceHandle};
use crate::lifecycle::{Lifecycle, LifecycleBuilder, LifecycleState, Releasable, ReleaseReport};

/// Holds a [`ResourceHandle`] and releases it as its base cleanup level.
pub struct ResourceHolder<S: ExternalSystem> {
    handle: Arc<ResourceHandle<S>>,
    lifecycle: Lifecycle,
}

impl<S: ExternalSystem> std::fmt::Debug for ResourceHolder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHolder")
            .field("name", &self.lifecycle.name())
            .field("handle", &self.handle)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl<S: ExternalSystem> ResourceHolder<S> {
    /// Hold `handle` with no further cleanup levels.
    pub fn new(handle: ResourceHandle<S>) -> Self {
        Self::extend(handle, |builder, _| builder)
    }

    /// Hold `handle` and let `levels` add cleanup steps on top of the base.
    ///
    /// `levels` also receives the shared handle, so a step can clone it and
    /// use the live reference during its own cleanup. Steps added by
    /// `levels` run in reverse order of addition, all before the handle is
    /// released.
    pub fn extend<F>(handle: ResourceHandle<S>, levels: F) -> Self
    where
        F: FnOnce(LifecycleBuilder, &Arc<ResourceHandle<S>>) -> LifecycleBuilder,
    {
        let handle = Arc::new(handle);
        let base = Lifecycle::builder(format!("holder({})", handle.name()))
            .child("release handle", Arc::clone(&handle));
        let lifecycle = levels(base, &handle).build();

        ResourceHolder { handle, lifecycle }
    }

    /// The held handle, while the holder is active.
    pub fn handle(&self) -> Result<&ResourceHandle<S>, ObjectReleased> {
        self.lifecycle.ensure_active()?;
        Ok(&self.handle)
    }

    /// Run `op` against the live reference.
    ///
    /// Fails with [`ObjectReleased`] once either the holder or the handle is
    /// released.
    pub fn with_reference<R>(&self, op: impl FnOnce(S::Ref) -> R) -> Result<R, ObjectReleased> {
        self.lifecycle.ensure_active()?;
        let reference = self.handle.get()?;
        Ok(op(reference))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

impl<S: ExternalSystem> Releasable for ResourceHolder<S> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::testing::MockSystem;
    use parking_lot::Mutex;

    fn acquire(system: &Arc<MockSystem>, label: &'static str) -> ResourceHandle<MockSystem> {
        ResourceHandle::acquire(system.clone(), &label).unwrap()
    }

    #[test]
    fn plain_holder_releases_handle_once() {
        let system = Arc::new(MockSystem::new());
        let holder = ResourceHolder::new(acquire(&system, "res"));
        let reference = holder.with_reference(|r| r).unwrap();

        holder.release().unwrap();
        holder.release().unwrap();

        assert_eq!(system.releases_of(reference), 1);
        crate::assert_object_released!(holder.handle());
        crate::assert_object_released!(holder.with_reference(|r| r));
    }

    #[test]
    fn every_level_runs_before_its_base() {
        for depth in 0..6 {
            let system = Arc::new(MockSystem::new());
            let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();

            let observed = system.clone();
            let record = seen.clone();
            let holder = ResourceHolder::extend(acquire(&system, "res"), move |mut builder, _| {
                for level in 1..=depth {
                    let observed = observed.clone();
                    let record = record.clone();
                    builder = builder.managed(format!("level {}", level), move || {
                        record.lock().push((level, observed.total_releases()));
                        Ok(())
                    });
                }
                builder
            });

            let report = holder.release().unwrap();

            let expected: Vec<_> = (1..=depth).rev().map(|level| (level, 0)).collect();
            assert_eq!(*seen.lock(), expected);
            assert_eq!(report.steps_run, depth + 1);
            assert_eq!(system.total_releases(), 1);
        }
    }

    #[test]
    fn failing_level_still_releases_handle() {
        let system = Arc::new(MockSystem::new());
        let holder = ResourceHolder::extend(acquire(&system, "res"), |builder, _| {
            builder.managed("flush", || Err(StepError::failed("disk full")))
        });

        let report = holder.release().unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, "flush");
        assert_eq!(system.total_releases(), 1);
    }

    #[test]
    fn handle_failure_reaches_holder_report() {
        let system = Arc::new(MockSystem::new().failing_release("res"));
        let holder = ResourceHolder::new(acquire(&system, "res"));

        let report = holder.release().unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, "release reference");
    }

    #[test]
    fn dropped_holder_leaves_handle_to_itself() {
        let system = Arc::new(MockSystem::new());
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let holder = ResourceHolder::extend(acquire(&system, "res"), move |builder, _| {
            builder.managed("managed level", move || {
                *flag.lock() = true;
                Ok(())
            })
        });

        drop(holder);

        assert!(!*ran.lock());
        assert_eq!(system.total_releases(), 1);
        assert_eq!(system.live(), 0);
    }

    #[test]
    fn level_can_use_the_handle_before_it_is_released() {
        let system = Arc::new(MockSystem::new());
        let flushed = Arc::new(Mutex::new(None));

        let record = flushed.clone();
        let holder = ResourceHolder::extend(acquire(&system, "journal"), move |builder, handle| {
            let handle = Arc::clone(handle);
            builder.managed("flush through handle", move || {
                let reference = handle.get().map_err(StepError::failed)?;
                *record.lock() = Some(reference);
                Ok(())
            })
        });
        let reference = holder.with_reference(|r| r).unwrap();

        let report = holder.release().unwrap();

        assert!(report.is_clean());
        assert_eq!(*flushed.lock(), Some(reference));
        assert_eq!(system.releases_of(reference), 1);
    }

    #[test]
    fn close_then_release_cleans_up_once() {
        let system = Arc::new(MockSystem::new());
        let holder = ResourceHolder::new(acquire(&system, "socket"));

        holder.close().unwrap();
        let again = holder.release().unwrap();

        assert_eq!(again.steps_run, 0);
        assert_eq!(system.total_releases(), 1);
    }
}
