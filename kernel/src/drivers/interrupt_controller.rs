//! The BCM interrupt controller: source enable/disable/pending, and the IRQ
//! trampoline's one registered handler, which fans a taken IRQ out to
//! whichever peripheral actually raised it.
//!
//! Grounded in the reference kernel's `driver::interrupts`: a 64-source
//! pending/enable/disable register pair split across two 32-bit halves.

use volatile::Volatile;

use crate::interrupt::InterruptContext;

const INTERRUPT_BASE: usize = 0x7E00B000 - 0x3F000000;

#[repr(C)]
struct Registers {
    _padding: [u32; 128],
    irq_basic_pending: u32,
    irq_pending: [u32; 2],
    fiq_control: u32,
    enable_irqs: [u32; 2],
    enable_basic_irqs: u32,
    disable_irqs: [u32; 2],
    disable_basic_irqs: u32,
}

unsafe fn regs() -> &'static mut Registers {
    unsafe { &mut *(INTERRUPT_BASE as *mut Registers) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    SysTimer0 = 0,
    SysTimer1 = 1,
    SysTimer2 = 2,
    SysTimer3 = 3,
    Uart = 57,
}

fn half_and_bit(source: Source) -> (usize, u32) {
    let s = source as u32;
    if s >= 32 {
        (1, 1 << (s - 32))
    } else {
        (0, 1 << s)
    }
}

pub fn enable_source(source: Source) {
    let (half, bit) = half_and_bit(source);
    unsafe { Volatile::new(&mut regs().enable_irqs[half]).write(bit) };
}

pub fn disable_source(source: Source) {
    let (half, bit) = half_and_bit(source);
    unsafe { Volatile::new(&mut regs().disable_irqs[half]).write(bit) };
}

pub fn check_interrupt(source: Source) -> bool {
    let (half, bit) = half_and_bit(source);
    unsafe { Volatile::new(&mut regs().irq_pending[half]).read() & bit != 0 }
}

/// The handler registered for [`crate::interrupt::InterruptKind::Irq`]:
/// checks every source the kernel cares about and dispatches to its owning
/// driver. Leaves `ctx.result` at its default (`Next`).
pub fn handle_irq(ctx: &mut InterruptContext<'_>, _userdata: usize) {
    use crate::drivers::timer::SystemTimer;

    if check_interrupt(Source::SysTimer0) {
        crate::drivers::timer::reset(SystemTimer::Timer0, ctx);
    }
    if check_interrupt(Source::SysTimer1) {
        crate::drivers::timer::reset(SystemTimer::Timer1, ctx);
    }
    if check_interrupt(Source::SysTimer2) {
        crate::drivers::timer::reset(SystemTimer::Timer2, ctx);
    }
    if check_interrupt(Source::SysTimer3) {
        crate::drivers::timer::reset(SystemTimer::Timer3, ctx);
    }
    if check_interrupt(Source::Uart) {
        crate::drivers::uart::handle_interrupt();
    }
}
