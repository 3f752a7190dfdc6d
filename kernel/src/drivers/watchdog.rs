//! The BCM power-management watchdog, the kernel's only way to reboot or
//! power off: there is no supervisor to ask, so a panic restarts the board
//! instead of halting it.
//!
//! Register offsets and magic constants are straight from the reference
//! kernel's `driver::watchdog`, itself sourced from the Linux
//! `bcm2835_wdt` driver.

use volatile::Volatile;

const WATCHDOG_BASE: usize = 0x7E100000 - 0x3F000000;

#[repr(C)]
struct Registers {
    _padding: [u32; 7],
    rstc: u32,
    rsts: u32,
    wdog: u32,
}

const PM_PASSWORD: u32 = 0x5a00_0000;
const PM_RSTC_WRCFG_CLR: u32 = 0xffff_ffcf;
const PM_RSTC_WRCFG_FULL_RESET: u32 = 0x0000_0020;
const PM_RSTS_RASPBERRYPI_HALT: u32 = 0x555;

unsafe fn regs() -> &'static mut Registers {
    unsafe { &mut *(WATCHDOG_BASE as *mut Registers) }
}

/// Triggers an immediate full board reset. Never returns.
pub fn restart() -> ! {
    unsafe {
        let r = regs();
        Volatile::new(&mut r.wdog).write(10 | PM_PASSWORD);
        let mut val = Volatile::new(&mut r.rstc).read();
        val &= PM_RSTC_WRCFG_CLR;
        val |= PM_PASSWORD | PM_RSTC_WRCFG_FULL_RESET;
        Volatile::new(&mut r.rstc).write(val);
    }
    loop {
        core::hint::spin_loop();
    }
}

/// Tells the bootloader to treat the next reset as a power-off, then resets.
pub fn poweroff() -> ! {
    unsafe {
        let r = regs();
        let mut val = Volatile::new(&mut r.rsts).read();
        val |= PM_PASSWORD | PM_RSTS_RASPBERRYPI_HALT;
        Volatile::new(&mut r.rsts).write(val);
    }
    restart();
}
