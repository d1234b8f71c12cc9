//! Interrupt masking.
//!
//! Everything shared between interrupt handlers and tasks is mutated inside a
//! critical section opened by [`without_interrupts`].
//!
//! Critical sections save the interrupt mask they found and restore exactly that
//! mask when they end, so they can be nested freely: an inner section never
//! re-enables interrupts that an outer section disabled.
//!
//! On bare-metal ARM targets, the mask is `PRIMASK`. Everywhere else (host builds
//! and tests) masking is a no-op, as there is no interrupt to race against.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod arch {
    #[must_use]
    #[inline]
    /// Returns whether interrupts are currently enabled.
    pub fn are_enabled() -> bool {
        let primask: u32;
        // Safety: reading PRIMASK has no side effect.
        unsafe {
            core::arch::asm!("mrs {}, PRIMASK", out(reg) primask, options(nostack, preserves_flags));
        }
        primask & 1 == 0
    }

    #[inline]
    pub fn disable() {
        // Safety: masking interrupts cannot break memory safety.
        // The asm block acts as a compiler fence.
        unsafe {
            core::arch::asm!("cpsid i", options(nostack, preserves_flags));
        }
    }

    #[inline]
    pub fn enable() {
        // Safety: only called to restore a state that was previously enabled.
        unsafe {
            core::arch::asm!("cpsie i", options(nostack, preserves_flags));
        }
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod arch {
    #[must_use]
    #[inline]
    pub const fn are_enabled() -> bool {
        true
    }

    #[inline]
    pub const fn disable() {}

    #[inline]
    pub const fn enable() {}
}

#[must_use]
#[inline]
/// Returns whether interrupts are currently enabled on this core.
pub fn are_enabled() -> bool {
    arch::are_enabled()
}

#[must_use]
#[inline]
/// Disables interrupts and returns the previous state.
///
/// The returned value must be handed back to [`restore`].
pub fn save_and_disable() -> bool {
    let were_enabled = arch::are_enabled();
    if were_enabled {
        arch::disable();
    }
    were_enabled
}

#[inline]
/// Restores the interrupt state returned by [`save_and_disable`].
pub fn restore(were_enabled: bool) {
    if were_enabled {
        arch::enable();
    }
}

#[inline]
/// Runs `f` with interrupts disabled, then restores the previous state.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let were_enabled = save_and_disable();
    let result = f();
    restore(were_enabled);
    result
}
