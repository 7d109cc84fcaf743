//! # Relinquish
//!
//! > *"Give it back, exactly once."*
//!
//! A Rust library for releasing resources deterministically, with a
//! safety net for the times nobody did.
//!
//! ## Philosophy
//!
//! Every owner follows one protocol:
//! - **Release** is explicit, idempotent, and reports what happened
//! - **Fallback** catches owners that were dropped or leaked while live
//!
//! The pieces compose: handles sit inside holders, holders inside
//! composites, and all of them inside scopes, without anything being
//! released twice or skipped.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::prelude::*;
//! use relinquish::testing::MockSystem;
//!
//! let system = Arc::new(MockSystem::new());
//!
//! let owner = CompositeOwner::new("request");
//! owner.push(ResourceHandle::acquire(system.clone(), &"socket").unwrap()).unwrap();
//! owner.push(ResourceHandle::acquire(system.clone(), &"tempfile").unwrap()).unwrap();
//!
//! with_scope(owner, |owner| {
//!     assert_eq!(owner.len(), 2);
//! });
//!
//! assert_eq!(system.release_log(), vec!["socket", "tempfile"]);
//! ```
//!
//! ## Shutdown
//!
//! The fallback path only releases what a sweep reaches. Hosts that opt
//! owners into a [`Reclaimer`] must shut it down before exiting:
//!
//! ```rust
//! use relinquish::Reclaimer;
//!
//! fn main() {
//!     let _shutdown = Reclaimer::global().guard();
//!     // ... run the program ...
//! }
//! ```
//!
//! ## Modules
//!
//! - [`handle`] - leaf owners of one external reference
//! - [`lifecycle`] - the release protocol every owner embeds
//! - [`reclaimer`] - the fallback registry and its sweeps
//! - [`scope`] - lexical release, including ambient state
//! - [`composite`], [`holder`], [`buffer`] - owners built from the above
//! - [`testing`] - a recording external system and assertion macros

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod buffer;
pub mod composite;
pub mod error;
pub mod handle;
pub mod holder;
pub mod lifecycle;
pub mod reclaimer;
pub mod scope;
pub mod testing;

// Re-exports
pub use buffer::{BufferBuilder, BufferError, UnmanagedBuffer};
pub use composite::{CompositeOwner, ReleaseOrder};
pub use error::{
    AcquireError, BoxError, Corruption, Error, ObjectReleased, Result, StepError, StepFailure,
    UseAfterRelease,
};
pub use handle::{ExternalSystem, HeapAllocator, HeapError, RawBlock, ResourceHandle};
pub use holder::ResourceHolder;
pub use lifecycle::{
    Lifecycle, LifecycleBuilder, LifecycleState, Releasable, ReleaseMode, ReleaseOutcome,
    ReleaseReport, StepKind,
};
pub use reclaimer::{
    FallbackToken, LeakPolicy, Reclaimer, ReclaimerConfig, ReclaimerStats, ShutdownGuard,
    SweepReport,
};
pub use scope::{with_scope, Ambient, AmbientScope, Color, Scope, ScopeGuard, SharedAmbient};

#[cfg(feature = "async")]
pub use reclaimer::SweeperHandle;
#[cfg(feature = "async")]
pub use scope::with_scope_async;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::composite::CompositeOwner;
    pub use crate::error::{AcquireError, Corruption, ObjectReleased};
    pub use crate::handle::{ExternalSystem, ResourceHandle};
    pub use crate::lifecycle::{Lifecycle, Releasable, ReleaseReport};
    pub use crate::reclaimer::Reclaimer;
    pub use crate::scope::{with_scope, Scope};
}
