//! The `kmain` entry point: brings the kernel up, seeds the main event loop
//! with its standing coroutines, then runs it forever.
//!
//! Grounded in the reference kernel's `kernel::start_kernel`: log the
//! boot banner, configure the LEDs, spawn the debug-input and terminal
//! coroutines, and fall into the event loop.

#![no_std]
#![no_main]

use kernel::drivers::{gpio, uart};
use kernel::{coroutine, event_loop, kdebug, kinfo, kwarn, thread};

static mut CONSOLE: uart::Console = uart::Console;

#[cortex_a_rt::entry]
fn main() -> ! {
    // SAFETY: single-threaded at this point, before interrupts are enabled.
    #[allow(static_mut_refs)]
    kernel::log::set_sink(unsafe { &mut CONSOLE });

    kinfo!("Kernel starting...");
    kernel::init();
    kdebug!("Initialized malloc, heap stats: {:?}", kernel::heap::stats());

    gpio::YELLOW_LED_2.on();
    kdebug!("Turned on the 2nd yellow LED.");

    coroutine::spawn(event_loop::main_event_loop(), async {
        kinfo!("Kernel started. Entering event loop.");
        kernel::shell::run().await;
    });

    // A second, independently-steppable event loop, driven by its own
    // thread - matches the reference kernel spinning up `test.run()` on a
    // detached thread so `move`'s `yield_to` has somewhere to land.
    if thread::create(event_loop::run_secondary_event_loop, &[]).is_err() {
        kwarn!("failed to start the secondary event loop's thread");
    }

    event_loop::run_main_event_loop();
}
