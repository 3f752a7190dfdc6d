//! Global interrupt enable/disable.

/// Globally disables IRQ and FIQ.
#[inline]
pub fn disable() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("cpsid if", options(nomem, nostack, preserves_flags));
    }
}

/// Globally enables IRQ and FIQ.
///
/// # Safety
///
/// Do not call this from inside a critical section that some other part of
/// the system is relying on staying closed.
#[inline]
pub unsafe fn enable() {
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("cpsie if", options(nomem, nostack, preserves_flags));
    }
}
