//! Broadcast wait queue.
//!
//! A [`WaitQueue`] parks the wakers of tasks that are waiting for some condition
//! to become true. Waking a queue is a broadcast: every parked waker is woken
//! and removed, and no condition is evaluated. Each waiter must therefore
//! re-check its own condition, which is exactly what [`block_until`] does.
//!
//! The condition is evaluated and the waker is parked inside one critical
//! section, so a wake-up issued from an interrupt handler cannot slip between
//! the check and the registration.
//!
//! ```rust
//! # use hyperdrive::sync::{WaitQueue, block_until};
//! # use core::sync::atomic::{AtomicBool, Ordering};
//! # use core::{future::Future, pin::pin, task::{Context, Poll, Waker}};
//! let queue = WaitQueue::new();
//! let ready = AtomicBool::new(false);
//!
//! let mut cx = Context::from_waker(Waker::noop());
//! let mut wait = pin!(block_until(&queue, || ready.load(Ordering::Acquire)));
//!
//! assert!(wait.as_mut().poll(&mut cx).is_pending());
//! assert_eq!(queue.len(), 1);
//!
//! ready.store(true, Ordering::Release);
//! queue.wake_all();
//! assert!(wait.as_mut().poll(&mut cx).is_ready());
//! ```
use crate::{
    irq::without_interrupts,
    locks::irq::IrqLock,
    queues::slot::{SlotKey, SlotList},
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: IrqLock<SlotList<Waker>>,
}

impl WaitQueue {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            waiters: IrqLock::new(SlotList::new()),
        }
    }

    #[must_use]
    #[inline]
    /// Returns the number of parked wakers.
    pub fn len(&self) -> usize {
        self.waiters.with_locked(|waiters| waiters.len())
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waiters.with_locked(|waiters| waiters.is_empty())
    }

    /// Wakes every parked waker and empties the queue.
    ///
    /// Wakers are popped one at a time from the queue itself, so their slots
    /// are retired and the keys held by woken waiters go stale. Each waker is
    /// invoked once the queue lock has been released. Waiters that park again
    /// meanwhile land at the tail and are left for the next broadcast.
    pub fn wake_all(&self) {
        let parked = self.len();
        for _ in 0..parked {
            let Some(waker) = self.waiters.with_locked(SlotList::pop_head) else {
                break;
            };
            waker.wake();
        }
    }

    /// Parks `waker`, or refreshes the waker already parked under `key`.
    ///
    /// Returns `None` if the waker could not be stored.
    fn park(&self, key: Option<SlotKey>, waker: &Waker) -> Option<SlotKey> {
        self.waiters.with_locked(|waiters| {
            if let Some(parked) = key.and_then(|key| waiters.get_mut(key)) {
                if !parked.will_wake(waker) {
                    parked.clone_from(waker);
                }
                return key;
            }
            waiters.add_tail(waker.clone()).ok()
        })
    }

    fn unpark(&self, key: SlotKey) {
        self.waiters.with_locked(|waiters| drop(waiters.remove(key)));
    }
}

/// Future returned by [`block_until`].
#[must_use = "futures do nothing unless polled"]
pub struct BlockUntil<'q, F> {
    queue: &'q WaitQueue,
    condition: F,
    key: Option<SlotKey>,
}

/// Waits until `condition` returns `true`.
///
/// The condition is checked with interrupts disabled. When it does not hold,
/// the current task is parked on `queue` and the condition is checked again
/// the next time the task is polled, whatever woke it.
pub const fn block_until<F>(queue: &WaitQueue, condition: F) -> BlockUntil<'_, F>
where
    F: FnMut() -> bool + Unpin,
{
    BlockUntil {
        queue,
        condition,
        key: None,
    }
}

impl<F> Future for BlockUntil<'_, F>
where
    F: FnMut() -> bool + Unpin,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        without_interrupts(|| {
            if (this.condition)() {
                if let Some(key) = this.key.take() {
                    this.queue.unpark(key);
                }
                Poll::Ready(())
            } else {
                this.key = this.queue.park(this.key, cx.waker());
                if this.key.is_none() {
                    // Parking failed: ask to be polled again rather than sleep forever.
                    cx.waker().wake_by_ref();
                }
                Poll::Pending
            }
        })
    }
}

impl<F> Drop for BlockUntil<'_, F> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.queue.unpark(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{sync::Arc, task::Wake};
    use core::{
        pin::pin,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_ready_immediately() {
        let queue = WaitQueue::new();
        let mut cx = Context::from_waker(Waker::noop());
        let mut wait = pin!(block_until(&queue, || true));

        assert!(wait.as_mut().poll(&mut cx).is_ready());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wake_all_is_broadcast() {
        let queue = WaitQueue::new();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let mut first = pin!(block_until(&queue, || false));
        let mut second = pin!(block_until(&queue, || false));
        assert!(first.as_mut().poll(&mut cx).is_pending());
        assert!(second.as_mut().poll(&mut cx).is_pending());
        assert_eq!(queue.len(), 2);

        queue.wake_all();
        assert_eq!(counter.0.load(Ordering::Relaxed), 2);
        assert!(queue.is_empty());

        // Woken but still unsatisfied: both park again.
        assert!(first.as_mut().poll(&mut cx).is_pending());
        assert!(second.as_mut().poll(&mut cx).is_pending());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_wakeup_survives_reverse_repoll() {
        let queue = WaitQueue::new();
        let first_woken = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let second_woken = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let first_waker = Waker::from(first_woken.clone());
        let second_waker = Waker::from(second_woken.clone());
        let mut first_cx = Context::from_waker(&first_waker);
        let mut second_cx = Context::from_waker(&second_waker);

        let mut first = pin!(block_until(&queue, || false));
        let mut second = pin!(block_until(&queue, || false));
        assert!(first.as_mut().poll(&mut first_cx).is_pending());
        assert!(second.as_mut().poll(&mut second_cx).is_pending());

        queue.wake_all();
        assert_eq!(first_woken.0.load(Ordering::Relaxed), 1);
        assert_eq!(second_woken.0.load(Ordering::Relaxed), 1);

        // The second waiter parks again before the first one.
        assert!(second.as_mut().poll(&mut second_cx).is_pending());
        assert!(first.as_mut().poll(&mut first_cx).is_pending());
        assert_eq!(queue.len(), 2);

        queue.wake_all();
        assert_eq!(first_woken.0.load(Ordering::Relaxed), 2);
        assert_eq!(second_woken.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_ready_waiter_leaves_others_parked() {
        let queue = WaitQueue::new();
        let flag = AtomicBool::new(false);
        let mut cx = Context::from_waker(Waker::noop());

        let mut ready = pin!(block_until(&queue, || flag.load(Ordering::Relaxed)));
        let mut blocked = pin!(block_until(&queue, || false));
        assert!(ready.as_mut().poll(&mut cx).is_pending());
        queue.wake_all();

        // A fresh waiter may reuse the slot the first one was parked in.
        assert!(blocked.as_mut().poll(&mut cx).is_pending());
        flag.store(true, Ordering::Relaxed);
        assert!(ready.as_mut().poll(&mut cx).is_ready());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_repoll_does_not_duplicate() {
        let queue = WaitQueue::new();
        let mut cx = Context::from_waker(Waker::noop());
        let mut wait = pin!(block_until(&queue, || false));

        for _ in 0..3 {
            assert!(wait.as_mut().poll(&mut cx).is_pending());
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_rechecks_condition_after_wake() {
        let queue = WaitQueue::new();
        let flag = AtomicBool::new(false);
        let mut cx = Context::from_waker(Waker::noop());
        let mut wait = pin!(block_until(&queue, || flag.load(Ordering::Relaxed)));

        assert!(wait.as_mut().poll(&mut cx).is_pending());
        queue.wake_all();
        assert!(wait.as_mut().poll(&mut cx).is_pending());

        flag.store(true, Ordering::Relaxed);
        assert!(wait.as_mut().poll(&mut cx).is_ready());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_unparks() {
        let queue = WaitQueue::new();
        let mut cx = Context::from_waker(Waker::noop());
        {
            let mut wait = Box::pin(block_until(&queue, || false));
            assert!(wait.as_mut().poll(&mut cx).is_pending());
            assert_eq!(queue.len(), 1);
        }
        assert!(queue.is_empty());
    }
}
