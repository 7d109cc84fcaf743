//! A heap block owned directly, with an optional managed companion.
//!
//! [`UnmanagedBuffer`] is the owner that carries fallback responsibility: its
//! block is freed on the explicit path and on the fallback path alike, while
//! a managed child is only released explicitly. If the buffer is dropped
//! while live, the child is left to release itself.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::{HeapAllocator, Releasable, UnmanagedBuffer};
//!
//! let heap = Arc::new(HeapAllocator::new());
//! let buffer = UnmanagedBuffer::builder(heap.clone(), 64).build().unwrap();
//!
//! buffer.write(8, b"hello").unwrap();
//! assert_eq!(buffer.read(8, 5).unwrap(), b"hello");
//!
//! buffer.release().unwrap();
//! assert_eq!(heap.live_blocks(), 0);
//! assert!(buffer.read(0, 1).is_err());
//! ```

use std::alloc::Layout;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::error::{AcquireError, Corruption, ObjectReleased, StepError};
use crate::handle::{ExternalSystem, HeapAllocator, RawBlock};
use crate::lifecycle::{Lifecycle, LifecycleState, Releasable, ReleaseReport};
use crate::reclaimer::Reclaimer;

/// Errors from buffer access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The buffer was released.
    #[error(transparent)]
    Released(#[from] ObjectReleased),

    /// The requested range does not fit the block.
    #[error("range {offset}..+{len} is outside a {size}-byte buffer")]
    OutOfBounds {
        /// Start of the range.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// Size of the buffer.
        size: usize,
    },
}

/// Builder for [`UnmanagedBuffer`].
pub struct BufferBuilder {
    heap: Arc<HeapAllocator>,
    size: usize,
    child: Option<Box<dyn Releasable + Send + Sync>>,
    reclaimer: Option<Reclaimer>,
}

impl std::fmt::Debug for BufferBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferBuilder")
            .field("size", &self.size)
            .field("child", &self.child.as_ref().map(|c| c.name().to_string()))
            .field("fallback", &self.reclaimer.is_some())
            .finish()
    }
}

impl BufferBuilder {
    /// Release `child` on the explicit path, before the block is freed.
    pub fn with_child<R>(mut self, child: R) -> Self
    where
        R: Releasable + Send + Sync + 'static,
    {
        self.child = Some(Box::new(child));
        self
    }

    /// Register with `reclaimer` so a forgotten buffer is freed by a sweep
    /// instead of inline on drop.
    pub fn with_fallback(mut self, reclaimer: &Reclaimer) -> Self {
        self.reclaimer = Some(reclaimer.clone());
        self
    }

    /// Allocate the block.
    pub fn build(self) -> Result<UnmanagedBuffer, AcquireError> {
        let heap = self.heap;
        let layout = Layout::array::<u8>(self.size)
            .map_err(|err| AcquireError::denied(heap.name(), err))?;
        let block = heap
            .acquire(&layout)
            .map_err(|err| AcquireError::denied(heap.name(), err))?;
        tracing::debug!(size = block.len(), "buffer allocated");

        let access = Arc::new(Mutex::new(()));
        let freeing = Arc::clone(&access);
        let mut builder = Lifecycle::builder(format!("buffer[{}]", block.len())).unmanaged(
            "free block",
            move || {
                let _exclusive = freeing.lock();
                heap.release(block).map_err(StepError::failed)
            },
        );
        if let Some(child) = self.child {
            builder = builder.child("release child", child);
        }
        if let Some(reclaimer) = &self.reclaimer {
            builder = builder.fallback(reclaimer);
        }

        Ok(UnmanagedBuffer {
            block,
            access,
            lifecycle: builder.build(),
        })
    }
}

/// A raw heap block released on every path.
///
/// Reads and writes hold an access lock that the release step also takes,
/// so memory is never freed under a running access.
pub struct UnmanagedBuffer {
    block: RawBlock,
    access: Arc<Mutex<()>>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for UnmanagedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnmanagedBuffer")
            .field("size", &self.block.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl UnmanagedBuffer {
    /// Start building a `size`-byte buffer drawn from `heap`.
    pub fn builder(heap: Arc<HeapAllocator>, size: usize) -> BufferBuilder {
        BufferBuilder {
            heap,
            size,
            child: None,
            reclaimer: None,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<usize, ObjectReleased> {
        self.lifecycle.ensure_active()?;
        Ok(self.block.len())
    }

    /// Copy `bytes` into the buffer at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        let _access = self.access.lock();
        self.lifecycle.ensure_active()?;
        self.check_range(offset, bytes.len())?;

        // SAFETY: the range is inside the block and the block stays allocated
        // while the access lock is held on an active buffer.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.block.as_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Copy `len` bytes out of the buffer starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, BufferError> {
        let _access = self.access.lock();
        self.lifecycle.ensure_active()?;
        self.check_range(offset, len)?;

        let mut out = vec![0u8; len];
        // SAFETY: see `write`.
        unsafe {
            std::ptr::copy_nonoverlapping(self.block.as_ptr().add(offset), out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Id of the fallback registration, while one is held.
    pub fn fallback_id(&self) -> Option<u64> {
        self.lifecycle.fallback_id()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), BufferError> {
        let size = self.block.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(BufferError::OutOfBounds { offset, len, size }),
        }
    }
}

impl Releasable for UnmanagedBuffer {
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
