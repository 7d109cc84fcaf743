//! The boundary to whatever actually owns the resource.

use std::fmt;

/// An external system that hands out references and takes them back.
///
/// File-descriptor tables, allocators, OS handle tables and connection
/// pools all fit. Implementations are called through `&self` from any
/// thread, including from a reclaimer sweep.
pub trait ExternalSystem: Send + Sync + 'static {
    /// Description of what to acquire.
    type Spec: ?Sized;
    /// Opaque reference identifying one acquired resource.
    type Ref: Copy + Send + Sync + fmt::Debug + 'static;
    /// System-level failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name used in errors and diagnostics.
    fn name(&self) -> &str;

    /// Obtain a resource. May block.
    fn acquire(&self, spec: &Self::Spec) -> Result<Self::Ref, Self::Error>;

    /// Give a resource back. Called at most once per reference.
    fn release(&self, reference: Self::Ref) -> Result<(), Self::Error>;

    /// Whether a release failure means the process state can no longer be
    /// trusted. Such failures escape `release()` as
    /// [`Corruption`](crate::Corruption).
    fn is_fatal(&self, _error: &Self::Error) -> bool {
        false
    }
}
