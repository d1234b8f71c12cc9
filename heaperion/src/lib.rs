//! # Heaperion: fixed-size block allocator for `no_std` targets
//!
//! Heaperion manages a single static memory region cut into equal-size blocks.
//! An allocation reserves a contiguous run of blocks, found by a first-fit scan
//! of a one-byte-per-block state table kept in the region itself.
//!
//! ## Usage
//!
//! ```rust
//! use heaperion::BlockAllocator;
//!
//! let mut buffer = [0u8; 16384];
//!
//! let mut allocator =
//!     unsafe { BlockAllocator::new(buffer.as_mut_ptr(), buffer.len()) }.unwrap();
//!
//! let ptr = allocator.allocate(300).unwrap();
//!
//! // Use the memory...
//!
//! unsafe {
//!     allocator.deallocate(ptr).unwrap();
//! }
//! ```
//!
//! `LockedBlockAllocator` wraps the allocator behind an interrupt-masking lock
//! and implements `GlobalAlloc`.
#![warn(clippy::pedantic, clippy::nursery)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![no_std]

mod block;
mod error;
mod locked;
mod utils;

// Public exports
pub use block::{BLOCK_SIZE, BlockAllocator, MAX_RUN};
pub use error::{HeapError, Result};
pub use locked::LockedBlockAllocator;

/// The main heap allocator type
pub type Heap = LockedBlockAllocator;
