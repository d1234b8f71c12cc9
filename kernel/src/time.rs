//! Periodic timer tick.
//!
//! The timer interrupt calls [`Ticks::tick`]. Every tick runs the registered
//! tick work, in registration order, then wakes the tasks sleeping on the tick.
//!
//! Tick work is registered at startup. If the registry happens to be locked when
//! the timer fires, the work of that tick is skipped instead of spinning inside
//! the interrupt handler.
use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};
use hyperdrive::{
    locks::irq::IrqLock,
    queues::slot::SlotList,
    sync::{WaitQueue, block_until},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("Out of memory")]
    OutOfMemory,
}

type TickFn = Box<dyn Fn() + Send + Sync>;

struct TickWork {
    name: &'static str,
    work: TickFn,
}

pub struct Ticks {
    work: IrqLock<SlotList<TickWork>>,
    count: AtomicU64,
    skipped: AtomicU64,
    sleepers: WaitQueue,
}

impl Default for Ticks {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Ticks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ticks")
            .field("count", &self.count())
            .field("skipped", &self.skipped())
            .finish_non_exhaustive()
    }
}

impl Ticks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            work: IrqLock::new(SlotList::new()),
            count: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            sleepers: WaitQueue::new(),
        }
    }

    /// Registers `work` to be run on every tick, after the work already registered.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the work cannot be stored.
    pub fn register(
        &self,
        name: &'static str,
        work: impl Fn() + Send + Sync + 'static,
    ) -> Result<(), TimeError> {
        let work = TickWork {
            name,
            work: Box::new(work),
        };
        self.work
            .with_locked(|list| list.add_tail(work))
            .map_err(|_| TimeError::OutOfMemory)?;
        log::debug!("Registered tick work `{name}`");
        Ok(())
    }

    /// Timer interrupt entry point.
    pub fn tick(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);

        let ran = self.work.try_with_locked(|list| {
            for (_, work) in list.iter() {
                (work.work)();
            }
        });
        if ran.is_none() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }

        self.sleepers.wake_all();
    }

    #[must_use]
    #[inline]
    /// Number of ticks since startup.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[must_use]
    #[inline]
    /// Number of ticks whose work was skipped.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn work_names(&self) -> alloc::vec::Vec<&'static str> {
        self.work
            .with_locked(|list| list.iter().map(|(_, work)| work.name).collect())
    }

    /// Waits for `ticks` ticks to elapse.
    pub async fn sleep(&self, ticks: u64) {
        let deadline = self.count().saturating_add(ticks);
        block_until(&self.sleepers, || self.count() >= deadline).await;
    }
}
