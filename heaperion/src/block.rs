//! Fixed-size block allocator
//!
//! The managed region is cut into `BLOCK_SIZE`-byte blocks. Each block has one
//! state byte in a table stored at the very beginning of the region itself:
//!
//! - `FREE` (zero): the block is available.
//! - `1..=MAX_RUN`: the block starts an allocation spanning that many blocks.
//! - `CONTINUATION`: the block belongs to the allocation started before it.
//! - `RESERVED`: the block holds the state table and is never handed out.
//!
//! Allocation is a first-fit linear scan. Whenever the scan meets a used block,
//! it jumps over the whole run that block starts.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::{HeapError, Result};
use crate::utils::{align_up, blocks_for};

/// Size of a block, in bytes.
pub const BLOCK_SIZE: usize = 128;

const FREE: u8 = 0;
const RESERVED: u8 = 0xFE;
const CONTINUATION: u8 = 0xFF;
/// Longest run a state byte can encode.
pub const MAX_RUN: usize = 0xFD;

/// A first-fit allocator over equal-sized blocks.
///
/// The allocator itself is not synchronized. Use `LockedBlockAllocator`
/// to share it with interrupt handlers.
pub struct BlockAllocator {
    /// Start of the first block, which is also the start of the state table.
    base: NonNull<u8>,
    /// Total number of blocks, reserved ones included.
    blocks: usize,
    /// Number of leading blocks used by the state table.
    reserved: usize,
    /// Number of blocks currently free.
    free: usize,
}

// Safety: the allocator has exclusive ownership of its region.
unsafe impl Send for BlockAllocator {}

impl BlockAllocator {
    /// Create a new block allocator
    ///
    /// The start of the region is rounded up to a block boundary.
    ///
    /// # Safety
    ///
    /// - `heap_start` must be valid for reads and writes for `heap_size` bytes
    /// - The memory region must not be used by other code while the allocator is active
    ///
    /// # Errors
    ///
    /// - `HeapError::InvalidPointer` if `heap_start` is null
    /// - `HeapError::RegionTooSmall` if no block is left once the state table is reserved
    pub unsafe fn new(heap_start: *mut u8, heap_size: usize) -> Result<Self> {
        if heap_start.is_null() {
            return Err(HeapError::InvalidPointer);
        }

        let start = heap_start as usize;
        let aligned = align_up(start, BLOCK_SIZE);
        let padding = aligned - start;
        if heap_size <= padding {
            return Err(HeapError::RegionTooSmall);
        }

        let blocks = (heap_size - padding) / BLOCK_SIZE;
        let reserved = blocks_for(blocks, BLOCK_SIZE);
        if blocks <= reserved {
            return Err(HeapError::RegionTooSmall);
        }

        // Safety: `aligned` lies within the region, which is not null.
        let base = unsafe { NonNull::new_unchecked(heap_start.add(padding)) };
        let mut allocator = Self {
            base,
            blocks,
            reserved,
            free: blocks - reserved,
        };

        let table = allocator.table_mut();
        table[..reserved].fill(RESERVED);
        table[reserved..].fill(FREE);

        Ok(allocator)
    }

    #[must_use]
    #[inline]
    /// Total number of blocks in the region, including the state table.
    pub const fn block_count(&self) -> usize {
        self.blocks
    }

    #[must_use]
    #[inline]
    /// Number of blocks taken by the state table.
    pub const fn reserved_blocks(&self) -> usize {
        self.reserved
    }

    #[must_use]
    #[inline]
    pub const fn free_blocks(&self) -> usize {
        self.free
    }

    /// Allocate enough contiguous blocks to hold `len` bytes
    ///
    /// # Errors
    ///
    /// - `HeapError::InvalidSize` if `len` is zero or needs more than `MAX_RUN` blocks
    /// - `HeapError::OutOfMemory` if no free run is long enough
    pub fn allocate(&mut self, len: usize) -> Result<NonNull<u8>> {
        if len == 0 {
            return Err(HeapError::InvalidSize);
        }
        let wanted = blocks_for(len, BLOCK_SIZE);
        let run = u8::try_from(wanted)
            .ok()
            .filter(|&run| usize::from(run) <= MAX_RUN)
            .ok_or(HeapError::InvalidSize)?;

        let start = self.find_run(wanted).ok_or(HeapError::OutOfMemory)?;

        let table = self.table_mut();
        table[start] = run;
        table[start + 1..start + wanted].fill(CONTINUATION);
        self.free -= wanted;

        Ok(self.block_ptr(start))
    }

    /// Allocate blocks for `layout`
    ///
    /// Blocks are `BLOCK_SIZE`-aligned, so any alignment up to that is honoured.
    ///
    /// # Errors
    ///
    /// - `HeapError::InvalidAlignment` if `layout.align()` exceeds `BLOCK_SIZE`
    /// - Any error returned by `allocate`
    pub fn allocate_layout(&mut self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.align() > BLOCK_SIZE {
            return Err(HeapError::InvalidAlignment);
        }
        self.allocate(layout.size())
    }

    /// Release the allocation starting at `ptr`
    ///
    /// # Safety
    ///
    /// - `ptr` must not be used after this call
    ///
    /// # Errors
    ///
    /// - `HeapError::InvalidPointer` if `ptr` does not start an allocation of this allocator
    /// - `HeapError::DoubleFree` if the blocks at `ptr` are already free
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<()> {
        let index = self.block_index(ptr)?;

        let table = self.table_mut();
        let run = match table[index] {
            FREE => return Err(HeapError::DoubleFree),
            RESERVED | CONTINUATION => return Err(HeapError::InvalidPointer),
            run => usize::from(run),
        };
        table[index..index + run].fill(FREE);
        self.free += run;

        Ok(())
    }

    /// First-fit search for `wanted` free blocks.
    fn find_run(&self, wanted: usize) -> Option<usize> {
        let table = self.table();
        let mut candidate = self.reserved;

        'scan: while candidate + wanted <= self.blocks {
            for offset in 0..wanted {
                let state = table[candidate + offset];
                if state != FREE {
                    // A used block met after free ones always starts a run.
                    candidate += offset + Self::run_length(state);
                    continue 'scan;
                }
            }
            return Some(candidate);
        }

        None
    }

    fn run_length(state: u8) -> usize {
        match state {
            FREE | RESERVED | CONTINUATION => 1,
            run => usize::from(run),
        }
    }

    fn block_index(&self, ptr: NonNull<u8>) -> Result<usize> {
        let offset = (ptr.as_ptr() as usize)
            .checked_sub(self.base.as_ptr() as usize)
            .ok_or(HeapError::InvalidPointer)?;
        let index = offset / BLOCK_SIZE;
        if offset % BLOCK_SIZE != 0 || index < self.reserved || index >= self.blocks {
            return Err(HeapError::InvalidPointer);
        }
        Ok(index)
    }

    fn block_ptr(&self, index: usize) -> NonNull<u8> {
        // Safety: `index` is within the region.
        unsafe { self.base.add(index * BLOCK_SIZE) }
    }

    fn table(&self) -> &[u8] {
        // Safety: the first `reserved` blocks belong to the table and nothing else.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.blocks) }
    }

    fn table_mut(&mut self) -> &mut [u8] {
        // Safety: the first `reserved` blocks belong to the table and nothing else.
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.blocks) }
    }
}
