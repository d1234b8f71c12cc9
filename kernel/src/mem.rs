//! Kernel heap.
//!
//! Every dynamic allocation of the kernel, network buffers included, comes from
//! a single block allocator over a static region handed over at startup.

/// The kernel heap. It is the global allocator on bare-metal targets.
#[cfg_attr(all(target_arch = "arm", target_os = "none"), global_allocator)]
pub static HEAP: heaperion::Heap = heaperion::Heap::empty();

/// Hands the region `[start, start + size)` over to the kernel heap.
///
/// # Safety
///
/// The region must be valid for reads and writes, and must not be used by
/// anything else for the rest of the program.
///
/// # Errors
///
/// Returns an error if the region is too small to hold a single block.
pub unsafe fn init(start: *mut u8, size: usize) -> heaperion::Result<()> {
    unsafe { HEAP.init(start, size) }?;
    log::info!(
        "Heap initialized: {} free blocks of {} bytes",
        HEAP.free_blocks(),
        heaperion::BLOCK_SIZE
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{boxed::Box, vec};

    #[test]
    fn test_heap_init() {
        let region = Box::leak(vec![0u8; 64 * heaperion::BLOCK_SIZE].into_boxed_slice());
        unsafe { init(region.as_mut_ptr(), region.len()) }.unwrap();

        let free = HEAP.free_blocks();
        assert!(free > 0);

        let ptr = HEAP.allocate(300).unwrap();
        assert_eq!(HEAP.free_blocks(), free - 3);
        unsafe { HEAP.release(ptr) }.unwrap();
        assert_eq!(HEAP.free_blocks(), free);
    }
}
