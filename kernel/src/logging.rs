//! This module contains the global logger instance used by the `log` crate.
//!
//! Records are written as `[LEVEL] message` lines to the console registered with
//! [`install`], usually the UART. Nothing is printed until a console is registered.

use core::fmt::Write;
use hyperdrive::locks::irq::IrqLock;

/// A text sink the logger writes to.
pub type Console = dyn Write + Send;

/// The backed logger instance used for the `log` crate.
pub static LOGGER: LockedLogger = LockedLogger::new();

/// A logger writing to a console guarded by an interrupt-masking lock.
pub struct LockedLogger {
    console: IrqLock<Option<&'static mut Console>>,
}

impl Default for LockedLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LockedLogger {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            console: IrqLock::new(None),
        }
    }

    /// Replaces the console, returning the previous one.
    pub fn set_console(&self, console: &'static mut Console) -> Option<&'static mut Console> {
        self.console.with_locked(|current| current.replace(console))
    }
}

impl log::Log for LockedLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        if cfg!(debug_assertions) {
            true
        } else {
            metadata.level() <= log::Level::Info
        }
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // A record logged from an interrupt that preempted another record is lost.
        let _ = self.console.try_with_locked(|console| {
            if let Some(console) = console {
                let _ = writeln!(console, "[{:5}] {}", record.level(), record.args());
            }
        });
    }

    fn flush(&self) {}
}

/// Registers `console` and installs the global logger.
///
/// # Errors
///
/// Returns an error if another logger is already installed.
pub fn init(console: &'static mut Console) -> Result<(), log::SetLoggerError> {
    LOGGER.set_console(console);

    log::set_logger(&LOGGER)?;
    log::set_max_level(if cfg!(debug_assertions) {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    });
    Ok(())
}

/// Routes logs to `console`, warning through the current logger if one is
/// already installed.
pub fn install(console: &'static mut Console) {
    if let Err(err) = init(console) {
        log::warn!("Console logger not installed: {err}");
    }
}
