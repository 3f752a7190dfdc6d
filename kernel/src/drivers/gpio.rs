//! GPIO pin control for the board's five status LEDs.
//!
//! Grounded in the reference kernel's `driver::gpio::Pin`: the `index`
//! helper only ever resolves to function-select register 0, which is fine
//! for pins 0-9 (all five LEDs live there) and is kept as-is rather than
//! generalized to pins this kernel never drives.

use volatile::Volatile;

const GPIO_BASE: usize = 0x7E200000 - 0x3F000000;
const GPF_BITS: u32 = 3;

#[repr(C)]
struct Registers {
    func: [u32; 6],
    _unused0: u32,
    set: [u32; 2],
    _unused1: u32,
    clr: [u32; 2],
}

unsafe fn regs() -> &'static mut Registers {
    unsafe { &mut *(GPIO_BASE as *mut Registers) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Input = 0,
    Output = 1,
}

#[derive(Debug, Clone, Copy)]
pub struct Pin(u32);

impl Pin {
    pub const fn new(pin: u32) -> Self {
        Pin(pin)
    }

    pub fn configure(self, function: Function) {
        let offset = self.0 * GPF_BITS;
        let all_bits = (1u32 << GPF_BITS) - 1;
        unsafe {
            let r = regs();
            let mut value = Volatile::new(&mut r.func[0]).read();
            value &= !(all_bits << offset);
            value |= (function as u32) << offset;
            Volatile::new(&mut r.func[0]).write(value);
        }
    }

    pub fn on(self) {
        unsafe { Volatile::new(&mut regs().set[0]).write(1 << self.0) };
    }

    pub fn off(self) {
        unsafe { Volatile::new(&mut regs().clr[0]).write(1 << self.0) };
    }

    pub fn set(self, on: bool) {
        if on {
            self.on();
        } else {
            self.off();
        }
    }
}

pub const GREEN_LED_1: Pin = Pin::new(4);
pub const YELLOW_LED_1: Pin = Pin::new(5);
pub const RED_LED: Pin = Pin::new(6);
pub const YELLOW_LED_2: Pin = Pin::new(7);
pub const GREEN_LED_2: Pin = Pin::new(8);

pub const LEDS: [Pin; 5] = [GREEN_LED_1, YELLOW_LED_1, RED_LED, YELLOW_LED_2, GREEN_LED_2];

pub fn configure_leds() {
    for led in LEDS {
        led.configure(Function::Output);
    }
}
