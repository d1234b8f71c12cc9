//! Interrupt-safe front-end for the block allocator
//!
//! Tasks and interrupt handlers both allocate, so the whole scan-and-mark of an
//! allocation runs under one `IrqLock` critical section. Two allocations can
//! therefore never claim overlapping blocks.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;

use hyperdrive::locks::irq::IrqLock;

use crate::block::BlockAllocator;
use crate::error::{HeapError, Result};

/// A block allocator shared behind an interrupt-masking lock.
///
/// It starts empty so that it can live in a `static` and be given its region
/// during early startup.
pub struct LockedBlockAllocator {
    inner: IrqLock<Option<BlockAllocator>>,
}

impl Default for LockedBlockAllocator {
    fn default() -> Self {
        Self::empty()
    }
}

impl LockedBlockAllocator {
    #[must_use]
    #[inline]
    pub const fn empty() -> Self {
        Self {
            inner: IrqLock::new(None),
        }
    }

    /// Hand a memory region over to the allocator
    ///
    /// # Safety
    ///
    /// Same contract as `BlockAllocator::new`.
    ///
    /// # Errors
    ///
    /// Any error returned by `BlockAllocator::new`.
    pub unsafe fn init(&self, heap_start: *mut u8, heap_size: usize) -> Result<()> {
        let allocator = unsafe { BlockAllocator::new(heap_start, heap_size) }?;
        self.inner.with_locked(|inner| *inner = Some(allocator));
        Ok(())
    }

    /// Allocate enough blocks for `len` bytes
    ///
    /// # Errors
    ///
    /// - `HeapError::Uninitialized` if `init` has not been called
    /// - Any error returned by `BlockAllocator::allocate`
    pub fn allocate(&self, len: usize) -> Result<NonNull<u8>> {
        self.inner.with_locked(|inner| {
            inner
                .as_mut()
                .ok_or(HeapError::Uninitialized)
                .and_then(|allocator| allocator.allocate(len))
        })
    }

    /// Release the allocation starting at `ptr`
    ///
    /// # Safety
    ///
    /// Same contract as `BlockAllocator::deallocate`.
    ///
    /// # Errors
    ///
    /// - `HeapError::Uninitialized` if `init` has not been called
    /// - Any error returned by `BlockAllocator::deallocate`
    pub unsafe fn release(&self, ptr: NonNull<u8>) -> Result<()> {
        self.inner.with_locked(|inner| {
            let allocator = inner.as_mut().ok_or(HeapError::Uninitialized)?;
            unsafe { allocator.deallocate(ptr) }
        })
    }

    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.inner
            .with_locked(|inner| inner.as_ref().map_or(0, BlockAllocator::free_blocks))
    }
}

unsafe impl GlobalAlloc for LockedBlockAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let res = self.inner.with_locked(|inner| {
            inner
                .as_mut()
                .ok_or(HeapError::Uninitialized)
                .and_then(|allocator| allocator.allocate_layout(layout))
        });

        match res {
            Ok(ptr) => ptr.as_ptr(),
            Err(err) => {
                log::warn!("Allocation of {} bytes failed: {}", layout.size(), err);
                core::ptr::null_mut()
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        // A bad release means the heap bookkeeping can no longer be trusted.
        if let Err(err) = unsafe { self.release(ptr) } {
            panic!("Heap corruption: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;

    extern crate alloc;

    #[test]
    fn test_uninitialized() {
        let allocator = LockedBlockAllocator::empty();
        assert_eq!(allocator.allocate(8), Err(HeapError::Uninitialized));
        assert_eq!(allocator.free_blocks(), 0);

        let layout = Layout::from_size_align(8, 8).unwrap();
        assert!(unsafe { allocator.alloc(layout) }.is_null());
    }

    #[test]
    fn test_global_alloc_roundtrip() {
        let mut buffer = alloc::vec![0u8; 8 * 1024];
        let allocator = LockedBlockAllocator::empty();
        unsafe { allocator.init(buffer.as_mut_ptr(), buffer.len()) }.unwrap();
        let before = allocator.free_blocks();

        let layout = Layout::from_size_align(200, 16).unwrap();
        let ptr = unsafe { allocator.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % BLOCK_SIZE, 0);
        assert_eq!(before - allocator.free_blocks(), 2);

        unsafe { allocator.dealloc(ptr, layout) };
        assert_eq!(allocator.free_blocks(), before);
    }

    #[test]
    #[should_panic(expected = "Heap corruption")]
    fn test_double_dealloc_is_fatal() {
        let mut buffer = alloc::vec![0u8; 8 * 1024];
        let allocator = LockedBlockAllocator::empty();
        unsafe { allocator.init(buffer.as_mut_ptr(), buffer.len()) }.unwrap();

        let layout = Layout::from_size_align(16, 8).unwrap();
        let ptr = unsafe { allocator.alloc(layout) };
        unsafe {
            allocator.dealloc(ptr, layout);
            allocator.dealloc(ptr, layout);
        }
    }
}
