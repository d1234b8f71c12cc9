//! Cooperative task scheduler.
//!
//! Tasks are futures. The scheduler keeps a FIFO run queue of tasks ready to be
//! polled and picks them strictly in order. A task that returns `Pending` is
//! `Waiting` until its waker is invoked, which appends it back to the run queue.
//!
//! A task that completes is `Finished`: it is moved to a dead list and never
//! polled again. Its future is only dropped when the idle path sweeps the dead
//! list, so that completing a task never frees memory from inside `run_once`.
use alloc::{
    boxed::Box,
    sync::{Arc, Weak},
    task::Wake,
};
use core::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll, Waker},
};
use hyperdrive::{locks::irq::IrqLock, queues::slot::SlotList};

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is in the run queue, or being polled.
    Running,
    /// The task is parked until something wakes it.
    Waiting,
    /// The task completed and will never run again.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Out of memory")]
    OutOfMemory,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn new() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Schedule {
    state: TaskState,
    /// Set when the task is woken while it is being polled.
    notified: bool,
}

struct Task {
    id: TaskId,
    name: &'static str,
    schedule: IrqLock<Schedule>,
    future: IrqLock<Option<TaskFuture>>,
    queues: Weak<Queues>,
}

impl Task {
    fn state(&self) -> TaskState {
        self.schedule.with_locked(|schedule| schedule.state)
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let requeue = self.schedule.with_locked(|schedule| match schedule.state {
            TaskState::Waiting => {
                schedule.state = TaskState::Running;
                true
            }
            TaskState::Running => {
                schedule.notified = true;
                false
            }
            TaskState::Finished => false,
        });

        if requeue && let Some(queues) = self.queues.upgrade() {
            queues.enqueue(self.clone());
        }
    }
}

#[derive(Default)]
struct Queues {
    run: IrqLock<SlotList<Arc<Task>>>,
    dead: IrqLock<SlotList<Arc<Task>>>,
}

impl Queues {
    fn enqueue(&self, task: Arc<Task>) {
        if self.run.with_locked(|run| run.add_tail(task)).is_err() {
            log::error!("Run queue allocation failed, a task is lost");
        }
    }
}

/// Handle to a spawned task.
#[derive(Clone)]
pub struct TaskHandle(Arc<Task>);

impl TaskHandle {
    #[must_use]
    #[inline]
    pub fn id(&self) -> TaskId {
        self.0.id
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    #[must_use]
    #[inline]
    pub fn state(&self) -> TaskState {
        self.0.state()
    }
}

impl core::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.0.state())
            .finish()
    }
}

pub struct Scheduler {
    queues: Arc<Queues>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Queues::default()),
        }
    }

    /// Creates a task running `future` and appends it to the run queue.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the task cannot be queued.
    pub fn spawn<F>(&self, name: &'static str, future: F) -> SchedulerResult<TaskHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(Task {
            id: TaskId::new(),
            name,
            schedule: IrqLock::new(Schedule {
                state: TaskState::Running,
                notified: false,
            }),
            future: IrqLock::new(Some(Box::pin(future))),
            queues: Arc::downgrade(&self.queues),
        });

        self.queues
            .run
            .with_locked(|run| run.add_tail(task.clone()))
            .map_err(|_| SchedulerError::OutOfMemory)?;

        log::debug!("Spawned task `{}` ({:?})", name, task.id);
        Ok(TaskHandle(task))
    }

    #[must_use]
    #[inline]
    /// Number of tasks ready to run.
    pub fn runnable(&self) -> usize {
        self.queues.run.with_locked(|run| run.len())
    }

    #[must_use]
    #[inline]
    /// Number of finished tasks not yet swept.
    pub fn finished(&self) -> usize {
        self.queues.dead.with_locked(|dead| dead.len())
    }

    /// Polls the task at the head of the run queue.
    ///
    /// Returns `false` if there was no task to run.
    pub fn run_once(&self) -> bool {
        let Some(task) = self.queues.run.with_locked(SlotList::pop_head) else {
            return false;
        };

        task.schedule
            .with_locked(|schedule| schedule.notified = false);

        let waker = Waker::from(task.clone());
        let mut cx = Context::from_waker(&waker);

        // Polled outside of the lock: tasks run with interrupts enabled.
        let Some(mut future) = task.future.with_locked(Option::take) else {
            return true;
        };
        let poll = future.as_mut().poll(&mut cx);
        task.future.with_locked(|slot| *slot = Some(future));

        match poll {
            Poll::Ready(()) => {
                task.schedule
                    .with_locked(|schedule| schedule.state = TaskState::Finished);
                log::debug!("Task `{}` finished", task.name);
                if self.queues.dead.with_locked(|dead| dead.add_tail(task)).is_err() {
                    log::warn!("Dead list allocation failed, dropping a task early");
                }
            }
            Poll::Pending => {
                let requeue = task.schedule.with_locked(|schedule| {
                    if schedule.notified {
                        schedule.notified = false;
                        true
                    } else {
                        schedule.state = TaskState::Waiting;
                        false
                    }
                });
                if requeue {
                    self.queues.enqueue(task);
                }
            }
        }

        true
    }

    /// Runs tasks until none is ready, then sweeps finished tasks.
    ///
    /// Returns the number of polls performed.
    pub fn run_until_idle(&self) -> usize {
        let mut polls = 0;
        while self.run_once() {
            polls += 1;
        }
        self.sweep_finished();
        polls
    }

    /// Frees the finished tasks, returning how many were freed.
    pub fn sweep_finished(&self) -> usize {
        let mut swept = 0;
        while let Some(task) = self.queues.dead.with_locked(SlotList::pop_head) {
            drop(task.future.with_locked(Option::take));
            swept += 1;
        }
        swept
    }

    /// Runs tasks forever, idling whenever the run queue is empty.
    pub fn run(&self) -> ! {
        loop {
            if !self.run_once() {
                self.idle();
            }
        }
    }

    fn idle(&self) {
        self.sweep_finished();
        wait_for_event();
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
fn wait_for_event() {
    // Safety: `wfe` only suspends the core until the next event or interrupt.
    unsafe {
        core::arch::asm!("wfe", options(nomem, nostack, preserves_flags));
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
fn wait_for_event() {
    core::hint::spin_loop();
}
