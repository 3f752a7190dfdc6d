//! The per-thread cooperative scheduler: a circular event queue fed by
//! interrupt handlers, a set of coroutines parked waiting for a named event,
//! and a FIFO of coroutines that just want to hand control back to the loop.
//!
//! Grounded in the reference kernel's `kernel::events::event_loop`. Two
//! details are deliberately NOT literal ports:
//!
//! * The overrun check is `(write_pos + 1) % N == read_pos`, not the
//!   original's `write_pos == read_pos - 1` (which underflows at
//!   `read_pos == 0` and is off-by-one even when it doesn't).
//! * A fired event resumes every coroutine parked on it most-recently-parked
//!   first. The original's recursive `awaiter::complete` happens to resume
//!   oldest-first; this kernel's ordering is the opposite on purpose.

use core::cell::{Cell, RefCell};

use alloc::vec::Vec;

use crate::config::EVENT_QUEUE_SIZE;
use crate::coroutine::TaskId;
use crate::kwarn;
use crate::drivers::interrupt_controller::Source;
use crate::drivers::timer::SystemTimer;
use crate::interrupt::{InterruptContext, InterruptKind};
use crate::queue::{Linked, Queue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Tick = 0,
    SerialRx = 1,
    SystemTimer = 2,
}

const EVENT_TYPE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub kind: EventType,
    pub data: u32,
}

impl Event {
    pub fn tick(data: u32) -> Self {
        Event { kind: EventType::Tick, data }
    }

    pub fn serial_rx(data: u32) -> Self {
        Event { kind: EventType::SerialRx, data }
    }

    pub fn system_timer(data: u32) -> Self {
        Event { kind: EventType::SystemTimer, data }
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::tick(0)
    }
}

struct YieldNode {
    task: TaskId,
    next: Cell<*mut YieldNode>,
}

unsafe impl Linked for YieldNode {
    fn next(&self) -> &Cell<*mut YieldNode> {
        &self.next
    }
}

struct Ring {
    buffer: [Event; EVENT_QUEUE_SIZE],
    read_pos: usize,
    write_pos: usize,
}

impl Ring {
    const fn new() -> Self {
        Ring {
            buffer: [Event { kind: EventType::Tick, data: 0 }; EVENT_QUEUE_SIZE],
            read_pos: 0,
            write_pos: 0,
        }
    }

    fn is_full(&self) -> bool {
        (self.write_pos + 1) % EVENT_QUEUE_SIZE == self.read_pos
    }

    fn push(&mut self, event: Event) -> bool {
        if self.is_full() {
            return false;
        }
        self.buffer[self.write_pos] = event;
        self.write_pos = (self.write_pos + 1) % EVENT_QUEUE_SIZE;
        true
    }

    fn pop(&mut self) -> Option<Event> {
        if self.read_pos == self.write_pos {
            return None;
        }
        let event = self.buffer[self.read_pos];
        self.read_pos = (self.read_pos + 1) % EVENT_QUEUE_SIZE;
        Some(event)
    }
}

pub struct EventLoop {
    counter: Cell<u32>,
    queue: RefCell<Ring>,
    awaiters: [RefCell<Vec<TaskId>>; EVENT_TYPE_COUNT],
    yield_queue: Queue<YieldNode>,
}

// SAFETY: an `EventLoop` is only ever driven by the one kernel thread that
// owns it; producers only ever append to `queue` from inside an IRQ, which
// can't itself be reentered while the event loop's own thread is running.
unsafe impl Sync for EventLoop {}

impl EventLoop {
    const fn new() -> Self {
        EventLoop {
            counter: Cell::new(0),
            queue: RefCell::new(Ring::new()),
            awaiters: [RefCell::new(Vec::new()), RefCell::new(Vec::new()), RefCell::new(Vec::new())],
            yield_queue: Queue::new(),
        }
    }

    /// Queues `event`, dropping it (and logging) if the queue is full.
    pub fn fire_event(&self, event: Event) {
        let pushed = self.queue.borrow_mut().push(event);
        if !pushed {
            kwarn!("event queue overrun, dropping event of type {:?}", event.kind);
        }
    }

    /// Parks `task` on `kind`; the next `fire_event(kind)` resumes it.
    pub fn register_awaiter(&self, kind: EventType, task: TaskId) {
        self.awaiters[kind as usize].borrow_mut().push(task);
    }

    /// Parks `task` on the yield FIFO; the next `step()` resumes it.
    pub fn yield_task(&self, task: TaskId) {
        let node = alloc::boxed::Box::leak(alloc::boxed::Box::new(YieldNode {
            task,
            next: Cell::new(core::ptr::null_mut()),
        }));
        unsafe { self.yield_queue.add(node as *mut YieldNode) };
    }

    /// One pass: synthesizes a `tick` every ten calls, then drains whatever
    /// work `process_events` finds ready.
    pub fn step(&self) {
        let n = self.counter.get();
        if n % crate::config::TICK_PERIOD == 0 {
            self.fire_event(Event::tick(n));
        }
        self.process_events();
        self.counter.set(n.wrapping_add(1));
    }

    fn process_events(&self) {
        if let Some(event) = self.queue.borrow_mut().pop() {
            let mut parked = self.awaiters[event.kind as usize].borrow_mut();
            let resumees: Vec<TaskId> = parked.drain(..).collect();
            drop(parked);
            // Most-recently-parked resumes first.
            for task in resumees.into_iter().rev() {
                crate::coroutine::complete_awaiter(task, event.data);
            }
        }

        while let Some(node) = self.yield_queue.remove() {
            let node = unsafe { alloc::boxed::Box::from_raw(node) };
            // deliver a dummy result so the parked `Yield`/`YieldTo` future's
            // `poll` sees its pending slot filled and resolves, instead of
            // re-parking forever.
            crate::coroutine::complete_awaiter(node.task, 0);
        }
    }

    /// Runs forever: steps the loop, then hands control back to the
    /// scheduler so other threads get a turn.
    pub fn run(&self) -> ! {
        loop {
            self.step();
            crate::thread::yield_now();
        }
    }
}

static MAIN_EVENT_LOOP: EventLoop = EventLoop::new();

pub fn main_event_loop() -> &'static EventLoop {
    &MAIN_EVENT_LOOP
}

/// A second, independently-steppable event loop, grounded in the reference
/// kernel's `start_kernel` creating a local `event_loop test{}` and running
/// it on its own thread - the demonstration vehicle for `yield_to`
/// migration (spec.md §4.2, Testable Property 4, Scenario S3).
static SECONDARY_EVENT_LOOP: EventLoop = EventLoop::new();

pub fn secondary_event_loop() -> &'static EventLoop {
    &SECONDARY_EVENT_LOOP
}

/// [`crate::thread::EntryPoint`]-compatible function that drives the
/// secondary event loop forever on whichever thread runs it. The original's
/// equivalent is the lambda passed to `thread(...)` that just calls
/// `test.run()`.
pub extern "C" fn run_secondary_event_loop(_args: *mut u8) -> ! {
    secondary_event_loop().run();
}

/// Wires the IRQ-to-driver fan-out and the `system_timer` event source, and
/// unmasks the peripherals that feed both. Called once during boot.
pub fn configure() {
    crate::interrupt::set_handler(
        InterruptKind::Irq,
        crate::drivers::interrupt_controller::handle_irq,
        0,
    );
    crate::drivers::interrupt_controller::enable_source(Source::SysTimer1);
    crate::drivers::interrupt_controller::enable_source(Source::Uart);
    crate::drivers::timer::setup(SystemTimer::Timer1, crate::config::SYSTEM_TIMER_INTERVAL, fire_system_timer, 0);
}

fn fire_system_timer(_timer: SystemTimer, value: u32, _ctx: &mut InterruptContext<'_>, _userdata: usize) {
    main_event_loop().fire_event(Event::system_timer(value));
}

/// Drops straight into the main event loop, abandoning whatever was
/// running. Used as the fallback continuation for an unrecovered exception.
pub fn run_main_event_loop() -> ! {
    main_event_loop().run();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_rejects_push_once_full() {
        let mut ring = Ring::new();
        // capacity is EVENT_QUEUE_SIZE - 1 usable slots by design.
        for _ in 0..EVENT_QUEUE_SIZE - 1 {
            assert!(ring.push(Event::tick(0)));
        }
        assert!(!ring.push(Event::tick(0)));
    }

    #[test]
    fn ring_is_fifo() {
        let mut ring = Ring::new();
        ring.push(Event::tick(1));
        ring.push(Event::tick(2));
        assert_eq!(ring.pop().unwrap().data, 1);
        assert_eq!(ring.pop().unwrap().data, 2);
        assert!(ring.pop().is_none());
    }
}
