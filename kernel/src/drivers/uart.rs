//! The PL011 UART, the kernel's console and the `serial_rx` event source.
//!
//! Register layout and enable sequence grounded in the reference kernel's
//! `driver::serial::PL011`: FIFOs are left disabled (so every received byte
//! raises its own RX interrupt) and only the RX interrupt is unmasked.

use bitflags::bitflags;
use volatile::Volatile;

const SERIAL_BASE: usize = 0x7E201000 - 0x3F000000;

#[repr(C)]
struct Registers {
    dr: u32,
    rsrecr: u32,
    _unused1: [u32; 4],
    fr: u32,
    _unused2: u32,
    ilpr: u32,
    ibrd: u32,
    fbrd: u32,
    lcrh: u32,
    cr: u32,
    ifls: u32,
    imsc: u32,
    ris: u32,
    mis: u32,
    icr: u32,
    dmacr: u32,
}

bitflags! {
    struct Fr: u32 {
        const CTS = 1 << 0;
        const BUSY = 1 << 3;
        /// Receive FIFO empty (or, with FIFOs disabled, the holding register).
        const RXFE = 1 << 4;
        /// Transmit FIFO full (or, with FIFOs disabled, the holding register).
        const TXFF = 1 << 5;
    }
}

bitflags! {
    struct Lcrh: u32 {
        const FEN = 1 << 4;
    }
}

bitflags! {
    struct Interrupts: u32 {
        const CTSM = 1 << 1;
        const RX = 1 << 4;
        const TX = 1 << 5;
        const RT = 1 << 6;
        const FE = 1 << 7;
        const PE = 1 << 8;
        const BE = 1 << 9;
        const OE = 1 << 10;
    }
}

unsafe fn regs() -> &'static mut Registers {
    unsafe { &mut *(SERIAL_BASE as *mut Registers) }
}

/// Disables the RX/TX FIFOs and unmasks the RX interrupt.
pub fn init() {
    unsafe {
        let r = regs();
        let lcrh = Volatile::new(&mut r.lcrh).read();
        Volatile::new(&mut r.lcrh).write(lcrh & !Lcrh::FEN.bits());
        let imsc = Volatile::new(&mut r.imsc).read();
        Volatile::new(&mut r.imsc).write(imsc | Interrupts::RX.bits());
    }
}

/// Blocks until the holding register can accept `byte`, then sends it.
pub fn put(byte: u8) {
    unsafe {
        let r = regs();
        while Volatile::new(&mut r.fr).read() & Fr::TXFF.bits() != 0 {}
        Volatile::new(&mut r.dr).write(byte as u32);
    }
}

pub fn put_str(s: &str) {
    for b in s.bytes() {
        put(b);
    }
}

/// Blocks until a byte has arrived, then returns it.
pub fn get() -> u8 {
    unsafe {
        let r = regs();
        while Volatile::new(&mut r.fr).read() & Fr::RXFE.bits() != 0 {}
        (Volatile::new(&mut r.dr).read() & 0xff) as u8
    }
}

/// Non-blocking: `true` if a byte is waiting to be [`get`].
pub fn available() -> bool {
    unsafe { Volatile::new(&mut regs().fr).read() & Fr::RXFE.bits() == 0 }
}

/// Drains every byte the RX FIFO/holding register is holding, firing a
/// `serial_rx` event for each, and clears whatever the masked interrupt
/// status register reported.
pub fn handle_interrupt() {
    unsafe {
        let r = regs();
        let mis = Volatile::new(&mut r.mis).read();
        Volatile::new(&mut r.icr).write(mis);
        if mis & Interrupts::RX.bits() != 0 {
            while available() {
                crate::event_loop::main_event_loop()
                    .fire_event(crate::event_loop::Event::serial_rx(get() as u32));
            }
        }
    }
}

/// A [`core::fmt::Write`] sink over the UART, installed as the kernel's log
/// target.
pub struct Console;

impl core::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        put_str(s);
        Ok(())
    }
}
