//! Compile-time constants mirrored from the original kernel's configuration
//! header: arena sizes, queue depths, timer intervals, and the per-mode and
//! per-thread stack geometry carved out by the linker script.

/// Size in bytes of the arena the heap allocator manages.
pub const MALLOC_MEMORY_SIZE: usize = 0x8000;

/// Capacity of the event loop's circular event queue.
pub const EVENT_QUEUE_SIZE: usize = 1024;

/// Free-running timer ticks between system-timer interrupts.
pub const SYSTEM_TIMER_INTERVAL: u32 = 1_000_000;

/// Number of event-loop steps between synthesized `tick` events.
pub const TICK_PERIOD: u32 = 10;

/// Fixed size of the thread table.
pub const THREAD_COUNT: usize = 32;

/// Stack size reserved per kernel thread.
pub const THREAD_STACK_SIZE: usize = 0x10_000;

/// Minimum severity a log record must have to be printed.
pub const MINIMUM_LOG_LEVEL: crate::log::Level = crate::log::Level::Info;

#[cfg(not(test))]
unsafe extern "C" {
    static _heap_start: u8;
    static _heap_end: u8;
    static _thread_stacks_start: u8;
}

/// Returns the `[start, end)` byte range the linker reserved for the heap
/// arena, read from the `_heap_start`/`_heap_end` symbols in `link.x`.
#[cfg(not(test))]
pub fn heap_region() -> (*mut u8, usize) {
    unsafe {
        let start = core::ptr::addr_of!(_heap_start) as *mut u8;
        let end = core::ptr::addr_of!(_heap_end) as usize;
        (start, end - start as usize)
    }
}

/// Returns the base address of the `index`-th thread's stack, `index` in
/// `0..THREAD_COUNT`. Thread stacks grow down from `base + THREAD_STACK_SIZE`.
#[cfg(not(test))]
pub fn thread_stack_base(index: usize) -> usize {
    debug_assert!(index < THREAD_COUNT);
    let start = unsafe { core::ptr::addr_of!(_thread_stacks_start) as usize };
    start + index * THREAD_STACK_SIZE
}
