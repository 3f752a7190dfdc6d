//! The single entry point every exception trampoline in `cortex-a-rt` calls
//! into, and the table of handlers it dispatches to.
//!
//! Grounded in the reference kernel's `arch::arm::interrupts`: one
//! `interrupt_type` per exception kind, a fixed-size handler table (most
//! recently registered handler wins, same as the original's
//! `register_interrupt_handler`), and a three-field context the handler can
//! inspect and partially mutate to steer what happens next.

use core::cell::UnsafeCell;

use num_enum::TryFromPrimitive;

/// Which exception landed us here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum InterruptKind {
    Undefined = cortex_a_rt::kind::UNDEFINED,
    SoftwareInterrupt = cortex_a_rt::kind::SOFTWARE_INTERRUPT,
    PrefetchAbort = cortex_a_rt::kind::PREFETCH_ABORT,
    DataAbort = cortex_a_rt::kind::DATA_ABORT,
    Irq = cortex_a_rt::kind::IRQ,
    Fiq = cortex_a_rt::kind::FIQ,
}

impl InterruptKind {
    /// How far the banked `lr` at entry sits ahead of the faulting/resume
    /// instruction, matching the original's fixed per-kind offsets.
    fn pc_offset(self) -> u32 {
        match self {
            InterruptKind::DataAbort | InterruptKind::Irq | InterruptKind::Fiq => 8,
            InterruptKind::Undefined | InterruptKind::SoftwareInterrupt | InterruptKind::PrefetchAbort => 4,
        }
    }
}

/// What should happen to the interrupted program once the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Resume just after the instruction that trapped.
    #[default]
    Next,
    /// Resume the very instruction that trapped (used to retry a faulting
    /// access once a handler has fixed up the condition that caused it).
    Repeat,
    /// Abandon whatever was running and drop straight into the main event
    /// loop - used by unrecoverable-fault paths that fall back to a known
    /// good context.
    EventLoop,
    /// Resume wherever the handler itself wrote into
    /// [`InterruptContext::set_pc`]. The dispatcher does not touch `pc` in
    /// this case.
    Custom,
}

/// The register snapshot and mutable decision surface a handler sees.
///
/// `registers` aliases the trampoline's on-stack `r0..=r12` snapshot; writes
/// the handler makes are visible to the interrupted program once it resumes.
/// `pc` starts out as the fixed formula's answer for [`Continuation::Next`],
/// so a handler that never touches `result` or `pc` gets ordinary
/// resume-after-the-faulting-instruction behaviour for free.
pub struct InterruptContext<'a> {
    pub kind: InterruptKind,
    registers: &'a mut [u32; 13],
    /// The faulting/trapping instruction's address.
    pub address: u32,
    pc: u32,
    pub result: Continuation,
}

impl<'a> InterruptContext<'a> {
    pub fn register(&self, n: usize) -> u32 {
        self.registers[n]
    }

    pub fn set_register(&mut self, n: usize, value: u32) {
        self.registers[n] = value;
    }

    /// Overrides the resume address for [`Continuation::Custom`]. Has no
    /// effect unless `result` is also set to `Custom`.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }
}

#[cfg(test)]
impl<'a> InterruptContext<'a> {
    /// Builds a context by hand, for unit tests of handlers that live
    /// outside this module.
    pub(crate) fn for_test(kind: InterruptKind, registers: &'a mut [u32; 13], address: u32) -> Self {
        InterruptContext {
            kind,
            registers,
            address,
            pc: address.wrapping_add(4),
            result: Continuation::default(),
        }
    }
}

pub type Handler = fn(&mut InterruptContext<'_>, usize);

struct Slot {
    handler: Option<Handler>,
    userdata: usize,
}

const EMPTY: Slot = Slot {
    handler: None,
    userdata: 0,
};

const SLOT_COUNT: usize = 6;

struct HandlerTable(UnsafeCell<[Slot; SLOT_COUNT]>);

// SAFETY: every access goes through `critical_section::with`, so there is
// never more than one reader/writer live at a time on this single core.
unsafe impl Sync for HandlerTable {}

static HANDLERS: HandlerTable = HandlerTable(UnsafeCell::new([EMPTY; SLOT_COUNT]));

fn slot_index(kind: InterruptKind) -> usize {
    kind as u32 as usize
}

/// Registers `handler` for `kind`, replacing whatever was registered before.
///
/// `userdata` is passed back to `handler` verbatim on every call; use it to
/// avoid a global for handlers that need per-registration state.
pub fn set_handler(kind: InterruptKind, handler: Handler, userdata: usize) {
    critical_section::with(|_cs| unsafe {
        (*HANDLERS.0.get())[slot_index(kind)] = Slot {
            handler: Some(handler),
            userdata,
        };
    });
}

/// Registers `handler` for every kind in `kinds`, exactly as if `set_handler`
/// had been called once per entry - the original's
/// `set_handler({kind1, kind2, kind3}, handler, userdata)` overload, for
/// handlers (like the exception reporter) that cover several exception kinds
/// identically.
pub fn set_handler_many(kinds: &[InterruptKind], handler: Handler, userdata: usize) {
    for &kind in kinds {
        set_handler(kind, handler, userdata);
    }
}

/// Removes whatever handler is registered for `kind`, if any.
pub fn clear_handler(kind: InterruptKind) {
    critical_section::with(|_cs| unsafe {
        (*HANDLERS.0.get())[slot_index(kind)] = EMPTY;
    });
}

/// Installs the default handlers: `data_abort`/`prefetch_abort`/`undefined`
/// report and drop into the event loop, `irq` routes to the interrupt
/// controller, `svc` routes to the supervisor-call table.
pub fn init() {
    set_handler_many(
        &[InterruptKind::Undefined, InterruptKind::DataAbort, InterruptKind::PrefetchAbort],
        crate::exception_report::handle,
        0,
    );
    set_handler(InterruptKind::SoftwareInterrupt, crate::supervisor::handle_svc, 0);
    set_handler(InterruptKind::Irq, crate::drivers::interrupt_controller::handle_irq, 0);
}

/// The entry point every `cortex-a-rt` trampoline calls. Classifies the
/// exception, runs the registered handler (if any), and applies whatever
/// continuation it chose.
///
/// # Safety
///
/// Called only from assembly immediately after the matching trampoline has
/// pushed exactly 13 words (`r0..=r12`) at `regs`.
#[unsafe(no_mangle)]
pub extern "C" fn _exception_dispatch(kind: u32, regs: *mut u32, raw_lr: u32) -> u32 {
    let kind = InterruptKind::try_from_primitive(kind).unwrap_or(InterruptKind::Undefined);
    let address = raw_lr.wrapping_sub(kind.pc_offset());

    // SAFETY: `regs` points at exactly 13 live words for the duration of
    // this call, per the trampoline's contract.
    let registers = unsafe { &mut *(regs as *mut [u32; 13]) };
    let mut ctx = InterruptContext {
        kind,
        registers,
        address,
        pc: address.wrapping_add(4),
        result: Continuation::default(),
    };

    let slot = critical_section::with(|_cs| unsafe {
        let slot = &(*HANDLERS.0.get())[slot_index(kind)];
        (slot.handler, slot.userdata)
    });
    if let (Some(handler), userdata) = slot {
        handler(&mut ctx, userdata);
    }

    match ctx.result {
        Continuation::Next => address.wrapping_add(4),
        Continuation::Repeat => address,
        Continuation::EventLoop => crate::event_loop::run_main_event_loop as usize as u32,
        Continuation::Custom => ctx.pc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pc_offset_matches_reference_kernel() {
        assert_eq!(InterruptKind::DataAbort.pc_offset(), 8);
        assert_eq!(InterruptKind::Irq.pc_offset(), 8);
        assert_eq!(InterruptKind::SoftwareInterrupt.pc_offset(), 4);
        assert_eq!(InterruptKind::Undefined.pc_offset(), 4);
    }

    #[test]
    fn default_continuation_resumes_after_the_trap() {
        let mut regs = [0u32; 13];
        let mut ctx = InterruptContext {
            kind: InterruptKind::SoftwareInterrupt,
            registers: &mut regs,
            address: 0x1000,
            pc: 0x1004,
            result: Continuation::default(),
        };
        assert_eq!(ctx.result, Continuation::Next);
        ctx.set_pc(0x2000);
        // Custom wasn't selected, so plain `Next` math is what the
        // dispatcher would use - `set_pc` alone has no effect.
        assert_eq!(ctx.result, Continuation::Next);
    }

    #[test]
    fn set_handler_many_registers_every_kind() {
        fn noop(_ctx: &mut InterruptContext<'_>, _userdata: usize) {}
        set_handler_many(&[InterruptKind::Undefined, InterruptKind::DataAbort], noop, 7);
        let (undefined, data_abort) = critical_section::with(|_cs| unsafe {
            let table = &*HANDLERS.0.get();
            (table[slot_index(InterruptKind::Undefined)].userdata, table[slot_index(InterruptKind::DataAbort)].userdata)
        });
        assert_eq!(undefined, 7);
        assert_eq!(data_abort, 7);
        clear_handler(InterruptKind::Undefined);
        clear_handler(InterruptKind::DataAbort);
    }

    #[test]
    fn custom_continuation_carries_the_handlers_pc() {
        let mut regs = [0u32; 13];
        let mut ctx = InterruptContext {
            kind: InterruptKind::DataAbort,
            registers: &mut regs,
            address: 0x8000,
            pc: 0x8004,
            result: Continuation::default(),
        };
        ctx.result = Continuation::Custom;
        ctx.set_pc(0x9000);
        assert_eq!(ctx.pc, 0x9000);
    }
}
