#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_panics_doc, clippy::doc_markdown)]
//! Kernel of the board: heap, cooperative scheduler, timer tick, logging and
//! the glue between the Ethernet MAC and the network stack.
//!
//! Startup code hands the heap region and the UART over to [`start`], then the
//! timer interrupt calls [`timer_interrupt`] and the MAC receive interrupt feeds
//! its fragments to a [`drivers::nic::FrameAssembler`].

pub mod drivers;
pub mod logging;
pub mod mem;
pub mod network;
pub mod process;
pub mod time;

extern crate alloc;

use holonet::Nic;

/// The timer tick, shared with the timer interrupt.
pub static TICKS: time::Ticks = time::Ticks::new();

#[inline]
/// Body of the timer interrupt handler.
pub fn timer_interrupt() {
    TICKS.tick();
}

/// Brings the system up and runs tasks forever.
///
/// # Safety
///
/// `heap_start` and `heap_size` must describe a region that is valid for reads
/// and writes and that nothing else uses. This function must only be called once.
pub unsafe fn start(
    heap_start: *mut u8,
    heap_size: usize,
    console: &'static mut logging::Console,
    nic: impl Nic + Send + 'static,
) -> ! {
    logging::install(console);

    if let Err(err) = unsafe { mem::init(heap_start, heap_size) } {
        log::error!("Heap initialization failed: {err}");
        loop {
            core::hint::spin_loop();
        }
    }

    let scheduler = process::Scheduler::new();
    if let Err(err) = network::init(&scheduler, &TICKS, nic) {
        log::error!("Network bring-up failed: {err}");
    }

    scheduler.run()
}
