//! Code for managing CPSR (*Current Program Status Register*) and, by the
//! same bit layout, SPSR (*Saved Program Status Register*).

use arbitrary_int::{u5, Number};
use num_enum::TryFromPrimitive;

/// The processor mode encoded in the bottom five bits of CPSR/SPSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ProcessorMode {
    Usr = 0b10000,
    Fiq = 0b10001,
    Irq = 0b10010,
    Svc = 0b10011,
    Mon = 0b10110,
    Abt = 0b10111,
    Hyp = 0b11010,
    Und = 0b11011,
    Sys = 0b11111,
}

/// CPSR (*Current Program Status Register*)
#[bitbybit::bitfield(u32)]
pub struct Cpsr {
    /// Negative condition flag
    #[bit(31, rw)]
    n: bool,
    /// Zero condition flag
    #[bit(30, rw)]
    z: bool,
    /// Carry condition flag
    #[bit(29, rw)]
    c: bool,
    /// Overflow condition flag
    #[bit(28, rw)]
    v: bool,
    /// Big-endian bit
    #[bit(9, rw)]
    e: bool,
    /// Asynchronous abort mask
    #[bit(8, rw)]
    a: bool,
    /// IRQ mask
    #[bit(7, rw)]
    i: bool,
    /// FIQ mask
    #[bit(6, rw)]
    f: bool,
    /// Thumb state bit
    #[bit(5, rw)]
    t: bool,
    /// Processor mode
    #[bits(0..=4, rw)]
    mode_raw: u5,
}

impl Cpsr {
    /// Reads the current value of CPSR.
    #[inline]
    pub fn read() -> Self {
        #[cfg(target_arch = "arm")]
        {
            let value: u32;
            unsafe {
                core::arch::asm!("mrs {0}, cpsr", out(reg) value, options(nomem, nostack, preserves_flags));
            }
            Self::new_with_raw_value(value)
        }
        #[cfg(not(target_arch = "arm"))]
        {
            Self::new_with_raw_value(0)
        }
    }

    /// Writes a new value to CPSR.
    ///
    /// # Safety
    ///
    /// Changing the processor mode or interrupt masks from under running code
    /// can violate invariants the rest of the system relies on.
    #[inline]
    pub unsafe fn write(value: Self) {
        #[cfg(target_arch = "arm")]
        unsafe {
            core::arch::asm!("msr cpsr, {0}", in(reg) value.raw_value(), options(nomem, nostack, preserves_flags));
        }
        #[cfg(not(target_arch = "arm"))]
        {
            let _ = value;
        }
    }

    /// The processor mode this status register encodes.
    pub fn mode(&self) -> Option<ProcessorMode> {
        ProcessorMode::try_from(self.mode_raw().as_u8()).ok()
    }

    /// Builder equivalent of [`Cpsr::mode`].
    pub fn with_mode(self, mode: ProcessorMode) -> Self {
        self.with_mode_raw(u5::new(mode as u8))
    }
}

impl core::fmt::Debug for Cpsr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cpsr")
            .field("n", &self.n())
            .field("z", &self.z())
            .field("c", &self.c())
            .field("v", &self.v())
            .field("i", &self.i())
            .field("f", &self.f())
            .field("t", &self.t())
            .field("mode", &self.mode())
            .finish()
    }
}
