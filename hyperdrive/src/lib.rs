//! Hyperdrive is a utility library for `BeskarOS`.
//!
//! It provides the synchronization and container primitives the network stack
//! is built on: interrupt-masking critical sections, an interrupt-safe lock,
//! a slot-arena linked list, a byte ring and a broadcast wait queue.
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]

extern crate alloc;

pub mod irq;
pub mod locks;
pub mod queues;
pub mod sync;
