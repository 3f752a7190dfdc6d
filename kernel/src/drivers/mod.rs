//! MMIO drivers for the board this kernel targets: a BCM2835-style
//! Raspberry Pi peripheral set, addressed through the ARM-side alias
//! (`0x7Exxxxxx - 0x3F000000`) the reference kernel uses throughout.

pub mod gpio;
pub mod interrupt_controller;
pub mod timer;
pub mod uart;
pub mod watchdog;

/// Brings up the peripherals the kernel depends on before the event loop and
/// scheduler start firing timer/serial events: the UART (RX interrupt
/// unmasked), the LEDs, and the interrupt controller sources both of those
/// need routed.
pub fn init() {
    uart::init();
    gpio::configure_leds();
}
