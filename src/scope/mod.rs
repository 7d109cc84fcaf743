//! Lexical scopes that release what they own on every exit path.
//!
//! A scope moves through three states, each a distinct value so none can
//! be revisited:
//!
//! - [`Scope`] - created, owns the object, nothing entered yet
//! - [`ScopeGuard`] - active; dereferences to the object
//! - exited - the guard was consumed by [`ScopeGuard::exit`] or dropped
//!
//! Dropping a guard releases its object, so early returns, `?` and panics
//! all release. Guards declared later drop first, which gives nested scopes
//! their inner-to-outer exit order.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::testing::MockSystem;
//! use relinquish::{with_scope, Releasable, ResourceHandle};
//!
//! let system = Arc::new(MockSystem::new());
//! let handle = ResourceHandle::acquire(system.clone(), &"socket").unwrap();
//!
//! let reference = with_scope(handle, |h| h.get().unwrap());
//!
//! assert_eq!(system.releases_of(reference), 1);
//! ```

mod ambient;


use std::ops::Deref;

use crate::error::Corruption;
use crate::lifecycle::{Releasable, ReleaseReport};

pub use ambient::{Ambient, AmbientScope, Color, SharedAmbient};

/// A scope that has been created but not entered.
#[derive(Debug)]
pub struct Scope<T: Releasable> {
    object: T,
}

impl<T: Releasable> Scope<T> {
    /// Bind `object` to a new scope.
    pub fn new(object: T) -> Self {
        Scope { object }
    }

    /// Enter the scope. From here on the object is released on exit.
    pub fn enter(self) -> ScopeGuard<T> {
        tracing::trace!(object = self.object.name(), "scope entered");
        ScopeGuard {
            object: self.object,
            exited: false,
        }
    }

    /// Give the object back without entering.
    pub fn into_inner(self) -> T {
        self.object
    }
}

/// An active scope. Releases its object when exited or dropped.
///
/// # Corruption
///
/// If release reports [`Corruption`] while the guard is being dropped, the
/// guard logs it and panics, unless the thread is already unwinding. Use
/// [`exit`](Self::exit) to receive the corruption as a value instead.
#[must_use = "dropping a scope guard immediately releases its object"]
#[derive(Debug)]
pub struct ScopeGuard<T: Releasable> {
    object: T,
    exited: bool,
}

impl<T: Releasable> ScopeGuard<T> {
    /// Leave the scope now and return the release report.
    pub fn exit(mut self) -> Result<ReleaseReport, Corruption> {
        self.exited = true;
        tracing::trace!(object = self.object.name(), "scope exited");
        self.object.release()
    }
}

impl<T: Releasable> Deref for ScopeGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Releasable> Drop for ScopeGuard<T> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        tracing::trace!(object = self.object.name(), "scope exited");

        match self.object.release() {
            Ok(report) if !report.is_clean() => {
                tracing::warn!(
                    object = self.object.name(),
                    failures = report.failures.len(),
                    "scope release recorded failures"
                );
            }
            Ok(_) => {}
            Err(corruption) => {
                tracing::error!(
                    object = self.object.name(),
                    "scope release hit corruption: {}",
                    corruption
                );
                if !std::thread::panicking() {
                    panic!("{}", corruption);
                }
            }
        }
    }
}

/// Run `body` with `object` in scope; release it however `body` exits.
///
/// Returns whatever `body` returns, errors included.
pub fn with_scope<T, R, F>(object: T, body: F) -> R
where
    T: Releasable,
    F: FnOnce(&T) -> R,
{
    let guard = Scope::new(object).enter();
    body(&*guard)
}

/// Async [`with_scope`]. The object is also released if the returned
/// future is dropped before completion.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use futures::FutureExt;
/// use relinquish::testing::MockSystem;
/// use relinquish::{with_scope_async, ResourceHandle};
///
/// # tokio_test::block_on(async {
/// let system = Arc::new(MockSystem::new());
/// let handle = ResourceHandle::acquire(system.clone(), &"db").unwrap();
///
/// let reference = with_scope_async(handle, |h| async move { h.get().unwrap() }.boxed()).await;
///
/// assert_eq!(system.releases_of(reference), 1);
/// # });
/// ```
#[cfg(feature = "async")]
pub async fn with_scope_async<T, R, F>(object: T, body: F) -> R
where
    T: Releasable,
    F: for<'a> FnOnce(&'a T) -> futures::future::BoxFuture<'a, R>,
{
    let guard = Scope::new(object).enter();
    let output = body(&*guard).await;
    drop(guard);
    output
}
