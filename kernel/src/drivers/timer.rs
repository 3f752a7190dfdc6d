//! The BCM system timer: four independent compare channels sharing one
//! free-running counter.
//!
//! Grounded in the reference kernel's `driver::timer`: [`setup`] arms a
//! channel and remembers its callback, [`reset`] (called from the IRQ
//! handler once a channel's pending bit is seen) re-arms it for another
//! `interval` ticks and then runs the callback.

use volatile::Volatile;

use crate::interrupt::InterruptContext;

const TIMER_BASE: usize = 0x7E003000 - 0x3F000000;
const NUM_TIMERS: usize = 4;

#[repr(C)]
struct Registers {
    cs: u32,
    clo: u32,
    chi: u32,
    cc: [u32; NUM_TIMERS],
}

unsafe fn regs() -> &'static mut Registers {
    unsafe { &mut *(TIMER_BASE as *mut Registers) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTimer {
    Timer0 = 0,
    Timer1 = 1,
    Timer2 = 2,
    Timer3 = 3,
}

pub type TimerFn = fn(SystemTimer, u32, &mut InterruptContext<'_>, usize);

struct Config {
    interval: u32,
    func: Option<TimerFn>,
    userdata: usize,
}

const EMPTY: Config = Config {
    interval: 0,
    func: None,
    userdata: 0,
};

static mut CONFIGS: [Config; NUM_TIMERS] = [EMPTY; NUM_TIMERS];

/// Arms `timer` to fire roughly `interval` timer ticks from now, and
/// remembers `func`/`userdata` for [`reset`] to call each time it does.
pub fn setup(timer: SystemTimer, interval: u32, func: TimerFn, userdata: usize) {
    let t = timer as usize;
    // SAFETY: timers are only configured from non-reentrant init paths; once
    // interrupts are live, only `reset` (below) touches this slot, from
    // inside a critical section implied by running in the IRQ handler.
    unsafe {
        CONFIGS[t] = Config {
            interval,
            func: Some(func),
            userdata,
        };
    }

    let r = unsafe { regs() };
    let current = unsafe { Volatile::new(&mut r.clo).read() };
    let next = current.wrapping_add(interval);
    unsafe {
        Volatile::new(&mut r.cc[t]).write(next);
        Volatile::new(&mut r.cs).write(1 << t);
    }
}

/// Re-arms `timer` for another `interval` ticks and runs its callback.
/// Called from the IRQ handler once `timer`'s pending bit has been seen.
pub fn reset(timer: SystemTimer, ctx: &mut InterruptContext<'_>) {
    let t = timer as usize;
    let (interval, func, userdata) = unsafe { (CONFIGS[t].interval, CONFIGS[t].func, CONFIGS[t].userdata) };

    let r = unsafe { regs() };
    let current = unsafe { Volatile::new(&mut r.clo).read() };
    let next = current.wrapping_add(interval);
    unsafe {
        Volatile::new(&mut r.cc[t]).write(next);
        Volatile::new(&mut r.cs).write(1 << t);
    }

    if let Some(func) = func {
        func(timer, current, ctx, userdata);
    }
}
