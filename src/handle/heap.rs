//! Raw heap blocks as an external system.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use super::ExternalSystem;

/// Failure to obtain a heap block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The allocator returned null.
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory {
        /// Requested size.
        size: usize,
    },
    /// Zero-sized blocks cannot be allocated.
    #[error("zero-sized block requested")]
    ZeroSized,
}

/// One live allocation: pointer plus the layout it was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: a RawBlock is an address and a layout. Access to the memory goes
// through owners that check their lifecycle first.
unsafe impl Send for RawBlock {}
// SAFETY: see above; RawBlock itself exposes no interior mutability.
unsafe impl Sync for RawBlock {}

impl RawBlock {
    /// Size of the block in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; zero-sized blocks are refused at acquisition.
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Start of the block.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Layout the block was allocated with.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// The global allocator, counting blocks it has handed out.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    live: AtomicUsize,
}

impl HeapAllocator {
    /// Create an allocator front-end.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks acquired and not yet released.
    pub fn live_blocks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl ExternalSystem for HeapAllocator {
    type Spec = Layout;
    type Ref = RawBlock;
    type Error = HeapError;

    fn name(&self) -> &str {
        "heap"
    }

    fn acquire(&self, layout: &Layout) -> Result<RawBlock, HeapError> {
        if layout.size() == 0 {
            return Err(HeapError::ZeroSized);
        }
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(*layout) };
        let ptr = NonNull::new(ptr).ok_or(HeapError::OutOfMemory {
            size: layout.size(),
        })?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(RawBlock {
            ptr,
            layout: *layout,
        })
    }

    fn release(&self, block: RawBlock) -> Result<(), HeapError> {
        // SAFETY: block came from `acquire` with this layout and release is
        // called at most once per reference.
        unsafe { dealloc(block.ptr.as_ptr(), block.layout) };
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_balance() {
        let heap = HeapAllocator::new();
        let block = heap.acquire(&Layout::array::<u8>(1024).unwrap()).unwrap();

        assert_eq!(block.len(), 1024);
        assert_eq!(heap.live_blocks(), 1);

        heap.release(block).unwrap();
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn zero_sized_is_refused() {
        let heap = HeapAllocator::new();
        let err = heap.acquire(&Layout::array::<u8>(0).unwrap()).unwrap_err();
        assert_eq!(err, HeapError::ZeroSized);
        assert_eq!(heap.live_blocks(), 0);
    }
}
