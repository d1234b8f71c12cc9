//! Cooperative multitasking.

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerError, TaskHandle, TaskId, TaskState};
