//! # Run-time support for Arm Cortex-A (AArch32)
//!
//! Implements the Arm vector table, a reference start-up routine, and the
//! five per-exception assembly trampolines needed to get from "CPU just took
//! an exception" to a single Rust-level dispatcher.
//!
//! Unlike the upstream `cortex-a-rt` crate this is forked from, the
//! trampolines here do not call one differently-typed `extern "C"` function
//! per exception kind. Instead every trampoline captures the full r0-r12
//! register file onto the exception stack and calls one shared entry point:
//!
//! ```rust ignore
//! extern "C" fn _exception_dispatch(kind: u32, regs: *mut u32, extra: u32) -> u32;
//! ```
//!
//! * `kind` is one of the [`kind`] constants.
//! * `regs` points at the 13 saved words `r0..=r12`, in that order. The
//!   dispatcher may read or overwrite them in place; the trampoline reloads
//!   them from the same memory after the call returns.
//! * `extra` is the raw `lr` banked for this exception at entry, unadjusted.
//!   The dispatcher derives the faulting/resume address from it; the
//!   trampoline itself does no pipeline-offset arithmetic.
//! * The return value is the address execution should resume at - computed
//!   by the dispatcher from its continuation decision, including the
//!   "resume wherever the handler already wrote" case. The trampoline writes
//!   it into the slot `srsfd` reserved for the resume PC, so `rfefd` picks it
//!   back up.
//!
//! This lets one Rust function - not five - own the entire
//! classify/call/apply state machine described for the interrupt dispatcher.
//!
//! ## Constants
//!
//! `__sbss`/`__ebss`, `__sdata`/`__edata`/`__sidata`, and the six
//! fixed-offset-above-`_end_of_kernel` stack-top symbols the linker script
//! computes: `_svc_stack_top`, `_sys_stack_top`, `_fiq_stack_top`,
//! `_irq_stack_top`, `_abt_stack_top`, `_und_stack_top`.
//!
//! ## C-compatible functions
//!
//! * `kmain` - called in SYS mode once start-up has zeroed `.bss` and copied
//!   `.data`. Create one with the [`entry`] attribute.
//! * `_exception_dispatch` - described above. The `kernel` crate provides
//!   this.
//!
//! ## Outputs
//!
//! * `_vector_table` - the vector table.
//! * `_default_start` - the default reset handler.
//! * `_asm_default_{undefined,svc,prefetch_abort,data_abort,irq}_handler` -
//!   the five trampolines.
//! * `_asm_default_fiq_handler` - spins forever; FIQ is performance
//!   sensitive enough that nobody gets a free ride through the dispatcher.

#![no_std]

#[cfg(target_arch = "arm")]
use cortex_ar::register::{cpsr::ProcessorMode, Cpsr};

pub use cortex_ar_rt_macros::entry;

/// The exception-kind tags passed as the first argument to
/// `_exception_dispatch`.
pub mod kind {
    pub const UNDEFINED: u32 = 0;
    pub const SOFTWARE_INTERRUPT: u32 = 1;
    pub const PREFETCH_ABORT: u32 = 2;
    pub const DATA_ABORT: u32 = 3;
    pub const IRQ: u32 = 4;
    pub const FIQ: u32 = 5;
}

unsafe extern "C" {
    /// The single low-level dispatch entry point, provided by the `kernel`
    /// crate. See the module docs for the calling convention.
    fn _exception_dispatch(kind: u32, regs: *mut u32, extra: u32) -> u32;
}

// The Interrupt Vector Table.
#[cfg(target_arch = "arm")]
core::arch::global_asm!(
    r#"
    .section .vector_table,"ax",%progbits
    .global _vector_table
    .type _vector_table, %function
    _vector_table:
        ldr     pc, =_default_start
        ldr     pc, =_asm_default_undefined_handler
        ldr     pc, =_asm_default_svc_handler
        ldr     pc, =_asm_default_prefetch_abort_handler
        ldr     pc, =_asm_default_data_abort_handler
        nop
        ldr     pc, =_asm_default_irq_handler
        ldr     pc, =_asm_default_fiq_handler
    .size _vector_table, . - _vector_table
    "#
);

// The five trampolines, plus the FIQ spin-loop default.
//
// None of these adjust `lr` before banking it: the dispatcher derives both
// the fault address and the default resume address from the raw value,
// matching the one fixed-offset-per-kind formula the reference kernel uses
// for every exception kind uniformly. Each trampoline srsfd's the resume
// {lr, spsr} onto the exception mode's own stack, pushes the r0-r12
// snapshot, calls `_exception_dispatch`, stores the returned resume address
// back into the slot srsfd reserved, restores r0-r12, and rfefd's out.
#[cfg(target_arch = "arm")]
core::arch::global_asm!(
    r#"
    .section .text._asm_default_undefined_handler
    .global _asm_default_undefined_handler
    .type _asm_default_undefined_handler, %function
    _asm_default_undefined_handler:
        srsfd   sp!, #{und_mode}
        push    {{r0-r12}}
        mov     r0, #{kind_undefined}
        mov     r1, sp
        mov     r2, lr
        bl      _exception_dispatch
        str     r0, [sp, #52]
        pop     {{r0-r12}}
        rfefd   sp!
    .size _asm_default_undefined_handler, . - _asm_default_undefined_handler


    .section .text._asm_default_svc_handler
    .global _asm_default_svc_handler
    .type _asm_default_svc_handler, %function
    _asm_default_svc_handler:
        srsfd   sp!, #{svc_mode}
        push    {{r0-r12}}
        mov     r0, #{kind_svc}
        mov     r1, sp
        mov     r2, lr
        bl      _exception_dispatch
        str     r0, [sp, #52]
        pop     {{r0-r12}}
        rfefd   sp!
    .size _asm_default_svc_handler, . - _asm_default_svc_handler


    .section .text._asm_default_data_abort_handler
    .global _asm_default_data_abort_handler
    .type _asm_default_data_abort_handler, %function
    _asm_default_data_abort_handler:
        srsfd   sp!, #{abt_mode}
        push    {{r0-r12}}
        mov     r0, #{kind_data_abort}
        mov     r1, sp
        mov     r2, lr
        bl      _exception_dispatch
        str     r0, [sp, #52]
        pop     {{r0-r12}}
        rfefd   sp!
    .size _asm_default_data_abort_handler, . - _asm_default_data_abort_handler


    .section .text._asm_default_prefetch_abort_handler
    .global _asm_default_prefetch_abort_handler
    .type _asm_default_prefetch_abort_handler, %function
    _asm_default_prefetch_abort_handler:
        srsfd   sp!, #{abt_mode}
        push    {{r0-r12}}
        mov     r0, #{kind_prefetch_abort}
        mov     r1, sp
        mov     r2, lr
        bl      _exception_dispatch
        str     r0, [sp, #52]
        pop     {{r0-r12}}
        rfefd   sp!
    .size _asm_default_prefetch_abort_handler, . - _asm_default_prefetch_abort_handler


    .section .text._asm_default_irq_handler
    .global _asm_default_irq_handler
    .type _asm_default_irq_handler, %function
    _asm_default_irq_handler:
        mov     r2, lr
        srsfd   sp!, #{sys_mode}
        cps     #{sys_mode}
        push    {{lr}}
        push    {{r0-r12}}
        mov     r0, #{kind_irq}
        mov     r1, sp
        bl      _exception_dispatch
        str     r0, [sp, #56]
        pop     {{r0-r12}}
        pop     {{lr}}
        rfefd   sp!
    .size _asm_default_irq_handler, . - _asm_default_irq_handler


    .section .text._asm_default_fiq_handler
    .global _asm_default_fiq_handler
    .type _asm_default_fiq_handler, %function
    _asm_default_fiq_handler:
        b       _asm_default_fiq_handler
    .size    _asm_default_fiq_handler, . - _asm_default_fiq_handler
    "#,
    svc_mode = const ProcessorMode::Svc as u8,
    und_mode = const ProcessorMode::Und as u8,
    abt_mode = const ProcessorMode::Abt as u8,
    sys_mode = const ProcessorMode::Sys as u8,
    kind_undefined = const kind::UNDEFINED,
    kind_svc = const kind::SOFTWARE_INTERRUPT,
    kind_prefetch_abort = const kind::PREFETCH_ABORT,
    kind_data_abort = const kind::DATA_ABORT,
    kind_irq = const kind::IRQ,
);

// Keep the linker happy about the extern symbol even when this file is
// type-checked off-target; the real reference comes from the `bl` above.
#[cfg(target_arch = "arm")]
#[allow(dead_code)]
fn _assert_dispatch_linked() {
    let _ = _exception_dispatch as unsafe extern "C" fn(u32, *mut u32, u32) -> u32;
}

/// This macro expands to code to turn on the FPU
#[cfg(all(target_arch = "arm", any(target_abi = "eabihf", feature = "eabi-fpu")))]
macro_rules! fpu_enable {
    () => {
        r#"
        // Allow VFP coprocessor access
        mrc     p15, 0, r0, c1, c0, 2
        orr     r0, r0, #0xF00000
        mcr     p15, 0, r0, c1, c0, 2
        // Enable VFP
        mov     r0, #0x40000000
        vmsr    fpexc, r0
        "#
    };
}

/// This macro expands to code that does nothing because there is no FPU
#[cfg(all(
    target_arch = "arm",
    not(any(target_abi = "eabihf", feature = "eabi-fpu"))
))]
macro_rules! fpu_enable {
    () => {
        r#"
        // no FPU - do nothing
        "#
    };
}

// Default start-up code for Armv7-A
//
// We set up our stacks and `kmain` in system mode.
#[cfg(target_arch = "arm")]
core::arch::global_asm!(
    r#"
    .section .text.default_start
    .align 0

    .global _default_start
    .type _default_start, %function
    _default_start:
        // Set up stacks: each mode's stack top is a fixed, independent
        // linker symbol (`_end_of_kernel` + a multiple of `_mode_stack_size`),
        // not a chain of subtractions from one shared top.
        ldr     r0, =_und_stack_top
        msr     cpsr, {und_mode}
        mov     sp, r0
        ldr     r0, =_svc_stack_top
        msr     cpsr, {svc_mode}
        mov     sp, r0
        ldr     r0, =_abt_stack_top
        msr     cpsr, {abt_mode}
        mov     sp, r0
        ldr     r0, =_irq_stack_top
        msr     cpsr, {irq_mode}
        mov     sp, r0
        ldr     r0, =_fiq_stack_top
        msr     cpsr, {fiq_mode}
        mov     sp, r0
        ldr     r0, =_sys_stack_top
        msr     cpsr, {sys_mode}
        mov     sp, r0
        // Clear the Thumb Exception bit because we're in Arm mode
        mrc     p15, 0, r0, c1, c0, 0
        bic     r0, #{te_bit}
        mcr     p15, 0, r0, c1, c0, 0
    "#,
    fpu_enable!(),
    r#"
        // Initialise .bss
        ldr     r0, =__sbss
        ldr     r1, =__ebss
        mov     r2, 0
    0:
        cmp     r1, r0
        beq     1f
        stm     r0!, {{r2}}
        b       0b
    1:
        // Initialise .data
        ldr     r0, =__sdata
        ldr     r1, =__edata
        ldr     r2, =__sidata
    0:
        cmp     r1, r0
        beq     1f
        ldm     r2!, {{r3}}
        stm     r0!, {{r3}}
        b       0b
    1:
        // Zero all registers before calling kmain
        mov     r0, 0
        mov     r1, 0
        mov     r2, 0
        mov     r3, 0
        mov     r4, 0
        mov     r5, 0
        mov     r6, 0
        mov     r7, 0
        mov     r8, 0
        mov     r9, 0
        mov     r10, 0
        mov     r11, 0
        mov     r12, 0
        // Jump to application
        bl      kmain
        // In case the application returns, loop forever
        b       .
    .size _default_start, . - _default_start
    "#,
    und_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Und)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    svc_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Svc)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    abt_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Abt)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    fiq_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Fiq)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    irq_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Irq)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    sys_mode = const {
        Cpsr::new_with_raw_value(0)
            .with_mode(ProcessorMode::Sys)
            .with_i(true)
            .with_f(true)
            .raw_value()
    },
    te_bit = const {
        cortex_ar::register::Sctlr::new_with_raw_value(0)
            .with_te(true)
            .raw_value()
    }
);
