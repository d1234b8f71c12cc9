//! Interrupt-safe lock.
//!
//! An `IrqLock` disables interrupts before taking its spin flag and restores the
//! previous interrupt state once the guard is dropped. Data protected by an
//! `IrqLock` can therefore be shared between tasks and interrupt handlers on a
//! single core without deadlocking: an interrupt can never fire while the
//! lock is held by the interrupted code.
//!
//! ```rust
//! # use hyperdrive::locks::irq::IrqLock;
//! let lock = IrqLock::<u32>::new(0);
//!
//! lock.with_locked(|value| *value += 1);
//! assert_eq!(lock.with_locked(|value| *value), 1);
//! ```
//!
//! Interrupt handlers that must never spin should use `try_with_locked`:
//!
//! ```rust
//! # use hyperdrive::locks::irq::IrqLock;
//! let lock = IrqLock::<u32>::new(0);
//!
//! let guard = lock.lock();
//! assert!(lock.try_with_locked(|value| *value).is_none());
//! drop(guard);
//! assert_eq!(lock.try_with_locked(|value| *value), Some(0));
//! ```

use super::BackOff;
use crate::irq;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A spin lock that masks interrupts while held.
pub struct IrqLock<T, B: BackOff = super::Spin> {
    /// Whether the lock is currently held.
    locked: AtomicBool,
    /// The inner data protected by the lock.
    data: UnsafeCell<T>,
    /// The back-off strategy to use when the lock is contended.
    _back_off: PhantomData<B>,
}

// Safety:
// Access to the inner data is serialized by the lock.
unsafe impl<T: Send, B: BackOff> Send for IrqLock<T, B> {}
unsafe impl<T: Send, B: BackOff> Sync for IrqLock<T, B> {}

impl<T, B: BackOff> core::fmt::Debug for IrqLock<T, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IrqLock")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl<T: Default, B: BackOff> Default for IrqLock<T, B> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, B: BackOff> IrqLock<T, B> {
    #[must_use]
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
            _back_off: PhantomData,
        }
    }

    #[must_use]
    #[inline]
    /// Masks interrupts, then spins until the lock is acquired.
    pub fn lock(&self) -> IrqGuard<'_, T, B> {
        let were_enabled = irq::save_and_disable();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            B::back_off();
        }

        IrqGuard {
            lock: self,
            were_enabled,
        }
    }

    #[must_use]
    #[inline]
    /// Tries to acquire the lock without spinning.
    ///
    /// On failure, the interrupt state is left untouched.
    pub fn try_lock(&self) -> Option<IrqGuard<'_, T, B>> {
        let were_enabled = irq::save_and_disable();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqGuard {
                lock: self,
                were_enabled,
            })
        } else {
            irq::restore(were_enabled);
            None
        }
    }

    #[inline]
    /// Runs `f` with exclusive access to the inner data.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    #[inline]
    /// Runs `f` with exclusive access to the inner data, if the lock is free.
    pub fn try_with_locked<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.try_lock().map(|mut guard| f(&mut guard))
    }

    #[must_use]
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[must_use]
    #[inline]
    /// Returns a mutable reference to the inner data.
    ///
    /// No locking is needed as the exclusive borrow guarantees there are no other users.
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// RAII guard for the interrupt lock.
///
/// Interrupts are restored to their previous state when the guard is dropped.
pub struct IrqGuard<'l, T, B: BackOff> {
    lock: &'l IrqLock<T, B>,
    were_enabled: bool,
}

impl<T, B: BackOff> Drop for IrqGuard<'_, T, B> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        irq::restore(self.were_enabled);
    }
}

impl<T, B: BackOff> Deref for IrqGuard<'_, T, B> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: If the guard exists, we have the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, B: BackOff> DerefMut for IrqGuard<'_, T, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: If the guard exists, we have the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread::spawn;

    #[test]
    fn test_irq_lock() {
        let lock = IrqLock::<u32>::new(0);

        let mut guard = lock.lock();
        *guard = 42;
        assert!(lock.is_locked());
        drop(guard);

        assert!(!lock.is_locked());
        assert_eq!(lock.with_locked(|value| *value), 42);
    }

    #[test]
    fn test_try_lock_contended() {
        let lock = IrqLock::<u32>::new(7);

        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);

        assert_eq!(lock.try_with_locked(|value| *value), Some(7));
    }

    #[test]
    fn test_irq_lock_concurrent() {
        let nb_threads = 8;
        let barrier = Arc::new(Barrier::new(nb_threads));
        let lock = Arc::new(IrqLock::<usize>::new(0));

        let handles = (0..nb_threads)
            .map(|_| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        lock.with_locked(|value| *value += 1);
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lock.with_locked(|value| *value), nb_threads * 100);
    }
}
