//! Integration tests for the heaperion allocator

extern crate alloc;
use alloc::vec::Vec;

use heaperion::{BLOCK_SIZE, BlockAllocator, HeapError, LockedBlockAllocator};
use std::sync::{Arc, Barrier};
use std::thread::spawn;

#[test]
fn test_basic_allocation_flow() {
    let mut buffer = [0u8; 16384];
    let mut allocator = unsafe { BlockAllocator::new(buffer.as_mut_ptr(), buffer.len()) }.unwrap();

    let sizes = [8, 16, 32, 64, 128, 256, 512, 1024, 2048];
    let mut allocations = Vec::new();

    for &size in &sizes {
        match allocator.allocate(size) {
            Ok(ptr) => allocations.push((ptr, size)),
            Err(_) => break,
        }
    }
    assert_eq!(allocations.len(), sizes.len());

    // Every allocation is writable over its whole length.
    for (ptr, size) in &allocations {
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0xAB, *size) };
    }

    for (ptr, _) in allocations {
        unsafe {
            allocator.deallocate(ptr).unwrap();
        }
    }
    assert_eq!(
        allocator.free_blocks(),
        allocator.block_count() - allocator.reserved_blocks()
    );
}

#[test]
fn test_exhaustion_never_blocks() {
    let mut buffer = [0u8; 4096];
    let mut allocator = unsafe { BlockAllocator::new(buffer.as_mut_ptr(), buffer.len()) }.unwrap();

    let mut count = 0;
    while allocator.allocate(BLOCK_SIZE).is_ok() {
        count += 1;
    }
    assert_eq!(count, allocator.block_count() - allocator.reserved_blocks());
    assert_eq!(allocator.allocate(1), Err(HeapError::OutOfMemory));
}

#[test]
fn test_concurrent_allocations_never_overlap() {
    let nb_threads = 4;
    let per_thread = 6;

    let buffer: &'static mut [u8] = Vec::leak(alloc::vec![0u8; 16384]);
    let heap = Arc::new(LockedBlockAllocator::empty());
    unsafe { heap.init(buffer.as_mut_ptr(), buffer.len()) }.unwrap();
    let barrier = Arc::new(Barrier::new(nb_threads));

    let handles = (0..nb_threads)
        .map(|_| {
            let heap = heap.clone();
            let barrier = barrier.clone();
            spawn(move || {
                barrier.wait();
                (0..per_thread)
                    .map(|_| heap.allocate(3 * BLOCK_SIZE).unwrap().as_ptr() as usize)
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    let mut starts = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();
    starts.sort_unstable();

    assert_eq!(starts.len(), nb_threads * per_thread);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= 3 * BLOCK_SIZE);
    }
}
