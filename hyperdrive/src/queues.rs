//! Queues module.
//!
//! ## Modules
//!
//! - `ring` : Byte ring with a fixed, heap-allocated capacity.
//! - `slot` : Doubly-linked list stored in a slot arena, addressed by keys.

pub mod ring;
pub mod slot;
