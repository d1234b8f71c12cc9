//! Locks shared between tasks and interrupt handlers.
//!
//! ## Modules
//!
//! - `irq` : A spin lock that masks interrupts while it is held.
//!
//! ## Back-off Strategy
//!
//! Locks are generic over a `BackOff` strategy, which decides what a core does
//! while the lock it wants is held elsewhere. The default strategy spins.

pub mod irq;

/// A trait that defines a back-off strategy for locks.
pub trait BackOff {
    /// Performs the back-off operation.
    fn back_off();
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A back-off strategy that uses a spin-wait loop.
pub struct Spin;

impl BackOff for Spin {
    #[inline]
    fn back_off() {
        core::hint::spin_loop();
    }
}
