//! Code for managing SCTLR (*System Control Register*)

use crate::register::{SysReg, SysRegRead, SysRegWrite};

/// SCTLR (*System Control Register*)
#[bitbybit::bitfield(u32)]
pub struct Sctlr {
    /// MMU enable
    #[bit(0, rw)]
    m: bool,
    /// Alignment check enable
    #[bit(1, rw)]
    a: bool,
    /// Cache enable
    #[bit(2, rw)]
    c: bool,
    /// Thumb Exception enable — exceptions are taken in Thumb state.
    #[bit(30, rw)]
    te: bool,
    /// High exception vectors
    #[bit(13, rw)]
    v: bool,
    /// Instruction cache enable
    #[bit(12, rw)]
    i: bool,
}

impl SysReg for Sctlr {
    const CP: u32 = 15;
    const CRN: u32 = 1;
    const OP1: u32 = 0;
    const CRM: u32 = 0;
    const OP2: u32 = 0;
}
impl SysRegRead for Sctlr {}
impl SysRegWrite for Sctlr {}

impl Sctlr {
    /// Reads SCTLR.
    #[inline]
    pub fn read() -> Self {
        unsafe { Self::new_with_raw_value(<Self as SysRegRead>::read_raw()) }
    }

    /// Writes SCTLR.
    ///
    /// # Safety
    ///
    /// Enabling/disabling the MMU or caches out from under running code can
    /// easily corrupt memory or hang the core.
    #[inline]
    pub unsafe fn write(value: Self) {
        unsafe {
            <Self as SysRegWrite>::write_raw(value.raw_value());
        }
    }
}

impl core::fmt::Debug for Sctlr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sctlr")
            .field("m", &self.m())
            .field("a", &self.a())
            .field("c", &self.c())
            .field("te", &self.te())
            .field("v", &self.v())
            .field("i", &self.i())
            .finish()
    }
}
