//! The default handler for data-abort, prefetch-abort and undefined-
//! instruction exceptions: decodes the relevant fault status register into
//! a human phrase, dumps registers, and blocks on the console for the user
//! to pick how to continue.
//!
//! Grounded in the reference kernel's `kernel::handle_exception` and its
//! `decode_dfsr`/`decode_ifsr` lookup tables. `handle` is registered the
//! same way as every other handler, via [`crate::interrupt::set_handler`];
//! it is not a special code path in the dispatcher.

use cortex_ar::register::{Cpsr, Dfar, Dfsr, Ifsr};
use cortex_ar::register::{SysReg, SysRegRead};

use crate::interrupt::{Continuation, InterruptContext, InterruptKind};
use crate::kerror;

/// IFAR (*Instruction Fault Address Register*) — not in `cortex_ar` yet, so
/// it gets the same `SysReg`/`SysRegRead` treatment as `Dfar` locally.
struct Ifar(u32);

impl SysReg for Ifar {
    const CP: u32 = 15;
    const CRN: u32 = 6;
    const OP1: u32 = 0;
    const CRM: u32 = 0;
    const OP2: u32 = 2;
}
impl SysRegRead for Ifar {}

impl Ifar {
    fn read() -> Self {
        unsafe { Ifar(<Self as SysRegRead>::read_raw()) }
    }
}

/// Maps the 5-bit `{bit 10, bits 3:0}` status field shared by DFSR/IFSR to a
/// phrase, for instruction-side faults.
fn decode_ifsr_status(status: u8) -> &'static str {
    match status {
        0b00000 => "No function, reset value",
        0b00001 => "No function",
        0b00010 => "Debug event fault",
        0b00011 => "Access Flag fault on Section",
        0b00100 => "No function",
        0b00101 => "Translation fault on Section",
        0b00110 => "Access Flag fault on Page",
        0b00111 => "Translation fault on Page",
        0b01000 => "Precise External Abort",
        0b01001 => "Domain fault on Section",
        0b01010 => "No function",
        0b01011 => "Domain fault on Page",
        0b01100 => "External abort on Section",
        0b01101 => "Permission fault on Section",
        0b01110 => "External abort on Page",
        0b01111 => "Permission fault on Page",
        _ => "No function",
    }
}

/// Maps the same status field for data-side faults (adds the two
/// imprecise/cache-maintenance codes the instruction side doesn't have).
fn decode_dfsr_status(status: u8) -> &'static str {
    match status {
        0b00000 => "No function, reset value",
        0b00001 => "Alignment fault",
        0b00010 => "Debug event fault",
        0b00011 => "Access Flag fault on Section",
        0b00100 => "Cache maintenance operation fault",
        0b00101 => "Translation fault on Section",
        0b00110 => "Access Flag fault on Page",
        0b00111 => "Translation fault on Page",
        0b01000 => "Precise External Abort",
        0b01001 => "Domain fault on Section",
        0b01010 => "No function",
        0b01011 => "Domain fault on Page",
        0b01100 => "External abort on Section",
        0b01101 => "Permission fault on Section",
        0b01110 => "External abort on Page",
        0b01111 => "Permission fault on Page",
        0b10110 => "Imprecise External Abort",
        0b10111 => "No function",
        _ => "No function",
    }
}

fn status_bits(raw: u32) -> u8 {
    // bits {0,1,2,3,10}, packed as bit10 << 4 | bits[3:0].
    let low = raw & 0b1111;
    let hi = (raw >> 10) & 0b1;
    (low | (hi << 4)) as u8
}

fn dump_registers(ctx: &InterruptContext<'_>) {
    kerror!(
        "R0: {:#010x}  R5: {:#010x}  R10: {:#010x}",
        ctx.register(0),
        ctx.register(5),
        ctx.register(10)
    );
    kerror!(
        "R1: {:#010x}  R6: {:#010x}  R11: {:#010x}",
        ctx.register(1),
        ctx.register(6),
        ctx.register(11)
    );
    kerror!(
        "R2: {:#010x}  R7: {:#010x}  R12: {:#010x}",
        ctx.register(2),
        ctx.register(7),
        ctx.register(12)
    );
    kerror!("R3: {:#010x}  R8: {:#010x}", ctx.register(3), ctx.register(8));
    kerror!("R4: {:#010x}  R9: {:#010x}", ctx.register(4), ctx.register(9));
}

#[derive(Clone, Copy)]
enum PrivMode {
    Irq,
    Abt,
    Und,
    Svc,
}

impl PrivMode {
    fn name(self) -> &'static str {
        match self {
            PrivMode::Irq => "irq",
            PrivMode::Abt => "abt",
            PrivMode::Und => "und",
            PrivMode::Svc => "svc",
        }
    }
}

#[cfg(target_arch = "arm")]
fn read_banked(mode: PrivMode) -> (u32, u32, u32) {
    let (lr, sp, spsr): (u32, u32, u32);
    unsafe {
        match mode {
            PrivMode::Irq => {
                core::arch::asm!("mrs {0}, lr_irq", out(reg) lr, options(nomem, nostack));
                core::arch::asm!("mrs {0}, sp_irq", out(reg) sp, options(nomem, nostack));
                core::arch::asm!("mrs {0}, spsr_irq", out(reg) spsr, options(nomem, nostack));
            }
            PrivMode::Abt => {
                core::arch::asm!("mrs {0}, lr_abt", out(reg) lr, options(nomem, nostack));
                core::arch::asm!("mrs {0}, sp_abt", out(reg) sp, options(nomem, nostack));
                core::arch::asm!("mrs {0}, spsr_abt", out(reg) spsr, options(nomem, nostack));
            }
            PrivMode::Und => {
                core::arch::asm!("mrs {0}, lr_und", out(reg) lr, options(nomem, nostack));
                core::arch::asm!("mrs {0}, sp_und", out(reg) sp, options(nomem, nostack));
                core::arch::asm!("mrs {0}, spsr_und", out(reg) spsr, options(nomem, nostack));
            }
            PrivMode::Svc => {
                core::arch::asm!("mrs {0}, lr_svc", out(reg) lr, options(nomem, nostack));
                core::arch::asm!("mrs {0}, sp_svc", out(reg) sp, options(nomem, nostack));
                core::arch::asm!("mrs {0}, spsr_svc", out(reg) spsr, options(nomem, nostack));
            }
        }
    }
    (lr, sp, spsr)
}

#[cfg(not(target_arch = "arm"))]
fn read_banked(_mode: PrivMode) -> (u32, u32, u32) {
    (0, 0, 0)
}

fn dump_mode_registers(mode: PrivMode) {
    let (lr, sp, spsr) = read_banked(mode);
    let psr = Cpsr::new_with_raw_value(spsr);
    kerror!("{:<4} | LR: {:#010x} | SP: {:#010x} | SPSR: {:?}", mode.name(), lr, sp, psr);
}

/// The handler registered for [`InterruptKind::Undefined`],
/// [`InterruptKind::DataAbort`] and [`InterruptKind::PrefetchAbort`]:
/// reports the fault, then blocks on the console for a continuation
/// choice.
pub fn handle(ctx: &mut InterruptContext<'_>, _userdata: usize) {
    kerror!("############ EXCEPTION ############");
    kerror!("{:?} at address {:#010x}", ctx.kind, ctx.address);

    match ctx.kind {
        InterruptKind::DataAbort => {
            let dfsr = Dfsr::read();
            let dfar = Dfar::read();
            let status = status_bits(dfsr.raw_value());
            kerror!("Data Fault Status Register: {:#010x} -> {}", dfsr.raw_value(), decode_dfsr_status(status));
            kerror!("Data Fault Address Register: {:#010x}", dfar.address());
        }
        InterruptKind::PrefetchAbort => {
            let ifsr = Ifsr::read();
            let ifar = Ifar::read();
            let status = status_bits(ifsr.raw_value());
            kerror!("Instruction Fault Status Register: {:#010x} -> {}", ifsr.raw_value(), decode_ifsr_status(status));
            kerror!("Instruction Fault Address Register: {:#010x}", ifar.0);
        }
        _ => {}
    }

    kerror!("");
    kerror!(">> Register snapshot <<");
    dump_registers(ctx);

    kerror!("");
    kerror!(">> Mode-specific registers <<");
    kerror!("User/System | CPSR: {:?}", Cpsr::read());
    dump_mode_registers(PrivMode::Irq);
    dump_mode_registers(PrivMode::Abt);
    dump_mode_registers(PrivMode::Und);
    dump_mode_registers(PrivMode::Svc);

    kerror!("");
    kerror!("Press 'n' for next instruction, 'r' to repeat it, or 'e' to jump into the event loop.");
    ctx.result = loop {
        match crate::drivers::uart::get() {
            b'n' => break Continuation::Next,
            b'r' => break Continuation::Repeat,
            b'e' => break Continuation::EventLoop,
            _ => continue,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_packs_bit_ten_above_the_low_nibble() {
        // raw = bit 10 set, bits 3:0 = 0b0101 (translation fault on section)
        let raw = (1 << 10) | 0b0101;
        assert_eq!(status_bits(raw), 0b10101);
    }

    #[test]
    fn dfsr_table_matches_the_reference_kernel() {
        assert_eq!(decode_dfsr_status(0b00001), "Alignment fault");
        assert_eq!(decode_dfsr_status(0b00101), "Translation fault on Section");
        assert_eq!(decode_dfsr_status(0b10110), "Imprecise External Abort");
        assert_eq!(decode_dfsr_status(0b11111), "No function");
    }

    #[test]
    fn ifsr_table_matches_the_reference_kernel() {
        assert_eq!(decode_ifsr_status(0b01101), "Permission fault on Section");
        assert_eq!(decode_ifsr_status(0b01000), "Precise External Abort");
        assert_eq!(decode_ifsr_status(0b11111), "No function");
    }
}
