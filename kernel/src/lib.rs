//! A small bare-metal kernel for a single-core Armv7-A Raspberry-Pi-style
//! board: PL011 UART, BCM-style interrupt controller, GPIO, system timer,
//! watchdog. Boots, installs an exception vector table, drives a serial
//! console, and multiplexes application work across two cooperating
//! concurrency layers: preemptive kernel threads scheduled by a periodic
//! timer, and cooperative coroutines dispatched by per-thread event loops
//! that wake on hardware-sourced events.
//!
//! The crate builds both for the target (`armv7a-none-eabi`, `no_std`) and
//! for the host under `cargo test`, where the pure-logic modules (queue,
//! heap, event loop, scheduler bookkeeping) run against a plain allocator
//! and without ever touching MMIO.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod event_loop;
pub mod exception_report;
#[macro_use]
pub mod log;
pub mod coroutine;
pub mod heap;
pub mod interrupt;
pub mod queue;
pub mod shell;
pub mod supervisor;
pub mod thread;

#[cfg(not(test))]
use core::panic::PanicInfo;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: heap::KernelAllocator = heap::KernelAllocator::new();

/// Brings up the subsystems that need to run before anything else can: the
/// heap, the interrupt dispatcher's default routing, the drivers, the
/// thread scheduler, and the main event loop's sources.
///
/// Not used on the host; `main.rs` calls this from `kmain`.
#[cfg(not(test))]
pub fn init() {
    unsafe {
        heap::init(config::heap_region());
    }
    interrupt::init();
    drivers::init();
    thread::init();
    event_loop::configure();
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kerror!("{}", info);
    drivers::watchdog::restart()
}
