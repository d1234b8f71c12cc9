//! Synchronization between cooperative tasks and interrupt handlers.
//!
//! ## Modules
//!
//! - `waitqueue` : Broadcast wait queue and the `block_until` primitive.

pub mod waitqueue;

pub use waitqueue::{BlockUntil, WaitQueue, block_until};
