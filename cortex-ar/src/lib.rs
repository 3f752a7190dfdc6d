//! # CPU support for Arm Cortex-A (AArch32)
//!
//! Provides register access, simple assembly wrappers, and a
//! `critical-section` implementation for Armv7-A cores.
//!
//! ## Features
//!
//! - `critical-section-single-core`: a [`critical_section::Impl`] that just
//!   disables interrupts. Not sound on multi-core systems.
//! - `critical-section-multi-core`: a [`critical_section::Impl`] that
//!   disables interrupts and takes a CAS spin-lock keyed by core ID.
//! - `defmt`: implements `defmt::Format` for the register types.

#![no_std]

pub mod asm;
pub mod interrupt;
pub mod register;

#[cfg(any(
    feature = "critical-section-single-core",
    feature = "critical-section-multi-core"
))]
mod critical_section;

/// Triggers a supervisor call with the given comment field.
///
/// The comment field is encoded into the `svc` instruction itself, so it
/// must be a literal integer, not a variable.
#[macro_export]
macro_rules! svc {
    ($num:literal) => {
        unsafe {
            core::arch::asm!("svc {0}", const $num, options(nomem, nostack));
        }
    };
}
