//! The preemptive thread scheduler: a fixed-size thread table, a ready
//! queue, and the three entry points that move threads between them - the
//! system-timer tick on slot 3, and the `terminate`/`yield` SVCs.
//!
//! Grounded in the reference kernel's `kernel::threads`: two-phase thread
//! creation (`prepare` carves out a slot and argument space, `start`
//! enqueues it ready), register save/restore through the usr-mode banked
//! `lr`/`sp` and `spsr` (the kernel itself runs in System mode, which shares
//! those banked registers with User mode), and a ready queue built on the
//! same intrusive [`crate::queue::Queue`] every other FIFO in this crate
//! uses.

use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::THREAD_COUNT;
use crate::interrupt::{Continuation, InterruptContext};
use crate::queue::{Linked, Queue};

/// A thread's entry point: called with a pointer to its filled argument
/// area, never expected to return (falling off the end reaches
/// [`terminate`] via the `lr` every new thread is seeded with).
pub type EntryPoint = extern "C" fn(*mut u8) -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Ready,
    Waiting,
    Empty,
}

/// Why [`prepare`] could not hand back a usable thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCreateError {
    NoFreeThread,
    OutOfArgumentMemory,
    NoMoreThreadIds,
}

impl fmt::Display for ThreadCreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreadCreateError::NoFreeThread => "no_free_thread",
            ThreadCreateError::OutOfArgumentMemory => "out_of_argument_memory",
            ThreadCreateError::NoMoreThreadIds => "no_more_thread_ids",
        })
    }
}

/// Default PSR a freshly prepared thread starts in: User mode, both
/// interrupt masks clear.
const DEFAULT_PSR: u32 = 0b10000;

#[derive(Clone, Copy)]
struct Registers {
    r: [u32; 13],
    lr: u32,
    sp: u32,
    pc: u32,
    psr: u32,
}

impl Registers {
    const fn new() -> Self {
        Registers {
            r: [0; 13],
            lr: 0,
            sp: 0,
            pc: 0,
            psr: DEFAULT_PSR,
        }
    }
}

struct ThreadControlBlock {
    next: Cell<*mut ThreadControlBlock>,
    state: Cell<State>,
    registers: Cell<Registers>,
}

// SAFETY: every field is only ever touched from inside a critical section
// (interrupts disabled) on this single core.
unsafe impl Sync for ThreadControlBlock {}

unsafe impl Linked for ThreadControlBlock {
    fn next(&self) -> &Cell<*mut ThreadControlBlock> {
        &self.next
    }
}

const EMPTY_TCB: ThreadControlBlock = ThreadControlBlock {
    next: Cell::new(core::ptr::null_mut()),
    state: Cell::new(State::Empty),
    registers: Cell::new(Registers::new()),
};

static THREADS: [ThreadControlBlock; THREAD_COUNT] = [EMPTY_TCB; THREAD_COUNT];
static READY_QUEUE: Queue<ThreadControlBlock> = Queue::new();
static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

/// The thread currently in [`State::Running`], if any.
struct RunningSlot(Cell<*mut ThreadControlBlock>);

// SAFETY: only ever touched from inside a critical section on this single
// core (IRQ/SVC context has exclusive access by construction).
unsafe impl Sync for RunningSlot {}

static RUNNING: RunningSlot = RunningSlot(Cell::new(core::ptr::null_mut()));

fn thread_index(block: *const ThreadControlBlock) -> usize {
    // SAFETY: `block` always points into `THREADS`.
    unsafe { block.offset_from(THREADS.as_ptr()) as usize }
}

/// Reserves slot 0 (the bootstrap thread already running this code) and
/// arms the system-timer channel that drives preemption.
pub fn init() {
    THREADS[0].state.set(State::Running);
    RUNNING.0.set(&THREADS[0] as *const _ as *mut _);

    #[cfg(not(test))]
    {
        use crate::drivers::interrupt_controller::Source;
        use crate::drivers::timer::SystemTimer;
        crate::drivers::interrupt_controller::enable_source(Source::SysTimer3);
        crate::drivers::timer::setup(SystemTimer::Timer3, crate::config::SYSTEM_TIMER_INTERVAL, scheduler_timer_tick, 0);
    }

    crate::supervisor::register_svc(0x04, terminate_thread, 0);
    crate::supervisor::register_svc(0x05, yield_thread, 0);
}

/// A reserved, not-yet-started thread slot: `entry_args` points at the
/// writable argument area carved out for it.
pub struct PreparedThread {
    id: u32,
    block: *mut ThreadControlBlock,
    args: *mut u8,
}

impl PreparedThread {
    /// The thread's newly-assigned id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Pointer to the `args_size`-byte area [`prepare`] carved out, ready
    /// for the caller to fill before calling [`start`].
    pub fn args_ptr(&self) -> *mut u8 {
        self.args
    }
}

/// Reserves an empty thread slot and lays out its initial register state:
/// `pc = entry`, `r0 = args_ptr`, `lr = terminate`, `sp` 8-byte-aligned
/// below the argument area, `psr` = user mode.
///
/// Does not make the thread runnable; call [`start`] once the argument area
/// has been filled.
pub fn prepare(entry: EntryPoint, args_size: usize) -> Result<PreparedThread, ThreadCreateError> {
    if args_size > crate::config::THREAD_STACK_SIZE {
        return Err(ThreadCreateError::OutOfArgumentMemory);
    }

    let index = critical_section::with(|_cs| {
        let slot = THREADS.iter().position(|t| t.state.get() == State::Empty);
        if let Some(index) = slot {
            // Reserve it immediately so a preempting thread can't claim it too.
            THREADS[index].state.set(State::Waiting);
        }
        slot
    });
    let Some(index) = index else {
        return Err(ThreadCreateError::NoFreeThread);
    };

    let id = NEXT_THREAD_ID.load(Ordering::SeqCst);
    if id == u32::MAX {
        THREADS[index].state.set(State::Empty);
        return Err(ThreadCreateError::NoMoreThreadIds);
    }
    NEXT_THREAD_ID.store(id + 1, Ordering::SeqCst);

    #[cfg(not(test))]
    let stack_top = crate::config::thread_stack_base(index) + crate::config::THREAD_STACK_SIZE;
    #[cfg(test)]
    let stack_top: usize = 0x1000_0000 + index * crate::config::THREAD_STACK_SIZE;

    let args = (stack_top - args_size) as *mut u8;
    let sp = (args as usize) & !0b111;

    let mut regs = Registers::new();
    regs.pc = entry as usize as u32;
    regs.sp = sp as u32;
    regs.r[0] = args as u32;
    regs.lr = terminate as usize as u32;
    THREADS[index].registers.set(regs);
    THREADS[index].state.set(State::Ready);

    Ok(PreparedThread {
        id,
        block: &THREADS[index] as *const _ as *mut _,
        args,
    })
}

/// Enqueues a [`prepare`]d thread onto the ready queue.
pub fn start(prepared: PreparedThread) -> u32 {
    // SAFETY: the block was just reserved by `prepare` and is not linked
    // into any other queue.
    unsafe { READY_QUEUE.add(prepared.block) };
    prepared.id
}

/// Convenience wrapper: prepares a thread, copies `args` into its argument
/// area, and starts it.
pub fn create(entry: EntryPoint, args: &[u8]) -> Result<u32, ThreadCreateError> {
    let prepared = prepare(entry, args.len())?;
    unsafe { core::ptr::copy_nonoverlapping(args.as_ptr(), prepared.args_ptr(), args.len()) };
    Ok(start(prepared))
}

#[cfg(target_arch = "arm")]
fn save_banked_usr(ctx: &InterruptContext<'_>) -> (u32, u32, u32) {
    let (lr, sp, psr): (u32, u32, u32);
    unsafe {
        core::arch::asm!("mrs {0}, lr_usr", out(reg) lr, options(nomem, nostack));
        core::arch::asm!("mrs {0}, sp_usr", out(reg) sp, options(nomem, nostack));
        core::arch::asm!("mrs {0}, spsr", out(reg) psr, options(nomem, nostack));
    }
    let _ = ctx;
    (lr, sp, psr)
}

#[cfg(not(target_arch = "arm"))]
fn save_banked_usr(_ctx: &InterruptContext<'_>) -> (u32, u32, u32) {
    (0, 0, DEFAULT_PSR)
}

#[cfg(target_arch = "arm")]
unsafe fn restore_banked_usr(lr: u32, sp: u32, psr: u32) {
    unsafe {
        core::arch::asm!("msr lr_usr, {0}", in(reg) lr, options(nomem, nostack));
        core::arch::asm!("msr sp_usr, {0}", in(reg) sp, options(nomem, nostack));
        core::arch::asm!("msr spsr, {0}", in(reg) psr, options(nomem, nostack));
    }
}

#[cfg(not(target_arch = "arm"))]
unsafe fn restore_banked_usr(_lr: u32, _sp: u32, _psr: u32) {}

fn save_current(block: &ThreadControlBlock, ctx: &InterruptContext<'_>) {
    let mut regs = block.registers.get();
    for i in 0..13 {
        regs.r[i] = ctx.register(i);
    }
    let (lr, sp, psr) = save_banked_usr(ctx);
    regs.lr = lr;
    regs.sp = sp;
    regs.psr = psr;
    regs.pc = ctx.address.wrapping_add(4);
    block.registers.set(regs);
}

fn restore_into(block: &ThreadControlBlock, ctx: &mut InterruptContext<'_>) {
    let regs = block.registers.get();
    for i in 0..13 {
        ctx.set_register(i, regs.r[i]);
    }
    // SAFETY: called only while handling the SVC/timer that will itself
    // `rfefd` out through these banked registers.
    unsafe { restore_banked_usr(regs.lr, regs.sp, regs.psr) };
    ctx.address = regs.pc.wrapping_sub(4);
}

fn running() -> Option<&'static ThreadControlBlock> {
    let ptr = RUNNING.0.get();
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &*ptr })
    }
}

fn preempt_current() {
    if let Some(current) = running() {
        current.state.set(State::Ready);
        unsafe { READY_QUEUE.add(current as *const _ as *mut _) };
        RUNNING.0.set(core::ptr::null_mut());
    }
}

fn continue_next() -> &'static ThreadControlBlock {
    let next = READY_QUEUE.remove().unwrap_or_else(|| {
        panic!("no more threads to run - the event loop thread terminated");
    });
    // SAFETY: `next` came straight out of `THREADS` via the ready queue.
    let next = unsafe { &*next };
    next.state.set(State::Running);
    RUNNING.0.set(next as *const _ as *mut _);
    next
}

/// The handler registered for SVC `0x04`: the current thread is done.
/// Frees its slot and switches to the next ready thread.
///
/// # Panics
///
/// Panics if no thread is ready - the scheduler assumes at least one
/// event-loop thread is always live.
fn terminate_thread(ctx: &mut InterruptContext<'_>, _userdata: usize) {
    if let Some(current) = running() {
        current.state.set(State::Empty);
        RUNNING.0.set(core::ptr::null_mut());
    }
    let next = continue_next();
    restore_into(next, ctx);
    ctx.result = Continuation::Next;
}

/// The handler registered for SVC `0x05`, and also invoked directly by
/// [`scheduler_timer_tick`]: if the ready queue is empty, leaves the
/// current thread running. Otherwise saves it, enqueues it ready, and
/// switches to the next ready thread.
fn yield_thread(ctx: &mut InterruptContext<'_>, _userdata: usize) {
    if READY_QUEUE.is_empty() {
        ctx.result = Continuation::Next;
        return;
    }

    let current_index = running().map(thread_index);
    if let Some(current) = running() {
        save_current(current, ctx);
        preempt_current();
    }

    let next = continue_next();
    if Some(thread_index(next)) != current_index {
        restore_into(next, ctx);
    }
    ctx.result = Continuation::Next;
}

/// The handler registered for the system-timer channel that drives
/// preemption (slot 3): equivalent to an unsolicited `yield` SVC.
pub fn scheduler_timer_tick(
    _timer: crate::drivers::timer::SystemTimer,
    _value: u32,
    ctx: &mut InterruptContext<'_>,
    _userdata: usize,
) {
    yield_thread(ctx, 0);
}

/// Terminates the calling thread via SVC `0x04`. Never returns.
#[cfg(target_arch = "arm")]
pub fn terminate() -> ! {
    unsafe {
        core::arch::asm!("mov r0, #4", "mov r1, #0", "svc #0", out("r0") _, out("r1") _, options(nostack));
    }
    unreachable!("terminate SVC does not return")
}

#[cfg(not(target_arch = "arm"))]
pub fn terminate() -> ! {
    panic!("terminate() called on a thread with no scheduler to hand off to")
}

/// Yields the remainder of the calling thread's quantum via SVC `0x05`.
#[cfg(target_arch = "arm")]
pub fn yield_now() {
    unsafe {
        core::arch::asm!("mov r0, #5", "svc #0", out("r0") _, options(nostack));
    }
}

#[cfg(not(target_arch = "arm"))]
pub fn yield_now() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset() {
        for t in THREADS.iter() {
            t.state.set(State::Empty);
            t.next.set(core::ptr::null_mut());
        }
        while READY_QUEUE.remove().is_some() {}
        RUNNING.0.set(core::ptr::null_mut());
        NEXT_THREAD_ID.store(1, Ordering::SeqCst);
        THREADS[0].state.set(State::Running);
        RUNNING.0.set(&THREADS[0] as *const _ as *mut _);
    }

    extern "C" fn dummy_entry(_args: *mut u8) -> ! {
        loop {}
    }

    #[test]
    fn prepare_then_start_round_trips_entry_and_args() {
        reset();
        let prepared = prepare(dummy_entry, 4).unwrap();
        unsafe { core::ptr::write(prepared.args_ptr() as *mut u32, 0xdead_beef) };
        let args_ptr = prepared.args_ptr();
        let id = start(prepared);
        assert_eq!(id, 1);

        let block = unsafe { &*READY_QUEUE.peek() };
        let regs = block.registers.get();
        assert_eq!(regs.pc, dummy_entry as usize as u32);
        assert_eq!(regs.r[0], args_ptr as u32);
        assert_eq!(regs.lr, terminate as usize as u32);
        assert_eq!(unsafe { core::ptr::read(args_ptr as *const u32) }, 0xdead_beef);
    }

    #[test]
    fn prepare_rejects_oversized_args() {
        reset();
        let err = prepare(dummy_entry, crate::config::THREAD_STACK_SIZE + 1).unwrap_err();
        assert_eq!(err, ThreadCreateError::OutOfArgumentMemory);
    }

    #[test]
    fn prepare_fails_once_every_slot_is_taken() {
        reset();
        let mut prepared = alloc::vec::Vec::new();
        // slot 0 is the bootstrap thread `reset()` marks `Running`, so only
        // `THREAD_COUNT - 1` slots are actually free to claim.
        for _ in 0..THREAD_COUNT - 1 {
            prepared.push(prepare(dummy_entry, 0).unwrap());
        }
        assert_eq!(prepare(dummy_entry, 0).unwrap_err(), ThreadCreateError::NoFreeThread);
    }

    #[test]
    fn yield_with_empty_ready_queue_is_a_no_op() {
        reset();
        let mut regs = [0u32; 13];
        let mut ctx = InterruptContext::for_test(crate::interrupt::InterruptKind::SoftwareInterrupt, &mut regs, 0x1000);
        yield_thread(&mut ctx, 0);
        assert_eq!(ctx.result, Continuation::Next);
    }

    #[test]
    #[should_panic(expected = "no more threads to run")]
    fn terminate_with_no_ready_thread_panics() {
        reset();
        let mut regs = [0u32; 13];
        let mut ctx = InterruptContext::for_test(crate::interrupt::InterruptKind::SoftwareInterrupt, &mut regs, 0x1000);
        terminate_thread(&mut ctx, 0);
    }
}
