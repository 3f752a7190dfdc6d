//! A minimal single-threaded `async`/`.await` executor for kernel
//! coroutines, and the two awaitable primitives every event loop offers:
//! waiting for a named event, and yielding control back to the loop.
//!
//! Grounded in the reference kernel's `kernel::coroutine`/`kernel::events`
//! coroutine machinery, re-expressed with real `core::future::Future`
//! instead of hand-rolled C++20 coroutine-handle bookkeeping: a top-level
//! coroutine is `Pin<Box<dyn Future<Output = ()>>>` kept in a small slab,
//! and `.await` composition inside it is ordinary Rust rather than anything
//! this crate has to implement. Parking/resuming is driven entirely by
//! explicit calls from [`crate::event_loop`] rather than a generic waker
//! queue, since there is exactly one thing ever polling: the event loop that
//! owns the coroutine.

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::event_loop::{EventLoop, EventType};

/// Identifies a spawned coroutine within the executor's slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(usize);

impl TaskId {
    /// The slab index backing this id, for display purposes (`whoami`).
    pub fn id(&self) -> usize {
        self.0
    }
}

struct Task {
    future: Pin<Box<dyn Future<Output = ()>>>,
    /// The task that directly `submit_coroutine`d this one, if any - the
    /// "parent handle" of the data model, kept for diagnostics and so a
    /// submitted child's completion can wake a parent awaiting it through
    /// [`Coroutine`].
    parent: Option<TaskId>,
}

struct Executor {
    tasks: Vec<Option<Task>>,
    /// The task currently being polled, if any - read by [`current_task`]
    /// from inside an awaiter's `poll`.
    current: Option<usize>,
    /// One slot per task: `Some(result)` once an awaited event/yield has
    /// been delivered, consumed by the matching awaiter's next `poll`.
    pending: Vec<Option<u32>>,
    /// The event loop each task currently belongs to - reassigned by
    /// `yield_to` on migration. `EventAwaiter`/`Yield`/`YieldTo` register
    /// against whichever loop this says, instead of a single hardcoded loop.
    owner: Vec<Option<&'static EventLoop>>,
}

impl Executor {
    const fn new() -> Self {
        Executor {
            tasks: Vec::new(),
            current: None,
            pending: Vec::new(),
            owner: Vec::new(),
        }
    }
}

static EXECUTOR: critical_section::Mutex<RefCell<Executor>> =
    critical_section::Mutex::new(RefCell::new(Executor::new()));

fn noop_clone(_: *const ()) -> RawWaker {
    noop_raw_waker()
}
fn noop_action(_: *const ()) {}
fn noop_raw_waker() -> RawWaker {
    static VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop_action, noop_action, noop_action);
    RawWaker::new(core::ptr::null(), &VTABLE)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Submits `future` to `event_loop` as a new top-level coroutine, resuming
/// it up to its first `.await`, exactly like the reference kernel's
/// `event_loop::submit_coroutine`. If the coroutine runs to completion
/// without ever suspending, a warning is logged - top-level coroutines are
/// expected to loop or wait, not return immediately.
pub fn spawn(event_loop: &'static EventLoop, future: impl Future<Output = ()> + 'static) -> TaskId {
    let parent = current_task();
    let id = critical_section::with(|cs| {
        let mut ex = EXECUTOR.borrow(cs).borrow_mut();
        let task = Task { future: Box::pin(future), parent };
        let slot = ex.tasks.iter().position(|t| t.is_none());
        let idx = match slot {
            Some(i) => {
                ex.tasks[i] = Some(task);
                i
            }
            None => {
                ex.tasks.push(Some(task));
                ex.tasks.len() - 1
            }
        };
        if idx >= ex.pending.len() {
            ex.pending.resize(idx + 1, None);
        }
        ex.pending[idx] = None;
        if idx >= ex.owner.len() {
            ex.owner.resize(idx + 1, None);
        }
        ex.owner[idx] = Some(event_loop);
        idx
    });
    let id = TaskId(id);
    poll_task(id);
    if task_has_completed(id) {
        kwarn!(
            "coroutine #{} completed before its first suspension point (top-level coroutines are expected to loop or wait)",
            id.0
        );
    }
    id
}

fn task_has_completed(id: TaskId) -> bool {
    critical_section::with(|cs| EXECUTOR.borrow(cs).borrow().tasks.get(id.0).map(Option::is_none).unwrap_or(true))
}

/// The task whose future is presently being polled, if any.
pub fn current_task() -> Option<TaskId> {
    critical_section::with(|cs| EXECUTOR.borrow(cs).borrow().current.map(TaskId))
}

/// The event loop `id` currently belongs to, or `None` once it has finished.
pub fn owner_of(id: TaskId) -> Option<&'static EventLoop> {
    critical_section::with(|cs| EXECUTOR.borrow(cs).borrow().owner.get(id.0).copied().flatten())
}

fn set_owner(id: TaskId, event_loop: &'static EventLoop) {
    critical_section::with(|cs| {
        let mut ex = EXECUTOR.borrow(cs).borrow_mut();
        if id.0 >= ex.owner.len() {
            ex.owner.resize(id.0 + 1, None);
        }
        ex.owner[id.0] = Some(event_loop);
    });
}

fn take_pending(id: TaskId) -> Option<u32> {
    critical_section::with(|cs| EXECUTOR.borrow(cs).borrow_mut().pending.get_mut(id.0).and_then(|slot| slot.take()))
}

fn set_pending(id: TaskId, value: u32) {
    critical_section::with(|cs| {
        let mut ex = EXECUTOR.borrow(cs).borrow_mut();
        if id.0 >= ex.pending.len() {
            ex.pending.resize(id.0 + 1, None);
        }
        ex.pending[id.0] = Some(value);
    });
}

/// Polls `id`'s future once. If it completes, frees its slab slot and wakes
/// its parent (if it was submitted via [`spawn_child`]).
pub fn poll_task(id: TaskId) {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let (done, parent) = critical_section::with(|cs| {
        let mut ex = EXECUTOR.borrow(cs).borrow_mut();
        let prev = ex.current.replace(id.0);
        let result = match ex.tasks.get_mut(id.0).and_then(Option::as_mut) {
            Some(task) => task.future.as_mut().poll(&mut cx),
            None => Poll::Ready(()),
        };
        ex.current = prev;
        let parent = ex.tasks.get(id.0).and_then(Option::as_ref).and_then(|t| t.parent);
        (matches!(result, Poll::Ready(())), parent)
    });

    if done {
        critical_section::with(|cs| {
            let mut ex = EXECUTOR.borrow(cs).borrow_mut();
            if let Some(slot) = ex.tasks.get_mut(id.0) {
                *slot = None;
            }
        });
        if let Some(parent) = parent {
            poll_task(parent);
        }
    }
}

/// Delivers `result` to `id`'s parked awaiter and re-polls it. Called by
/// the event loop once an event it was parked on has fired.
pub fn complete_awaiter(id: TaskId, result: u32) {
    set_pending(id, result);
    poll_task(id);
}

/// An awaitable that resolves the next time `kind` fires on the event loop
/// the awaiting coroutine belongs to.
pub struct EventAwaiter {
    kind: EventType,
    parked: bool,
}

impl EventAwaiter {
    pub fn new(kind: EventType) -> Self {
        EventAwaiter { kind, parked: false }
    }
}

impl Future for EventAwaiter {
    type Output = u32;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<u32> {
        let id = current_task().expect("awaited outside a coroutine");
        if let Some(result) = take_pending(id) {
            return Poll::Ready(result);
        }
        if !self.parked {
            self.parked = true;
            owner_of(id).expect("task has no owning event loop").register_awaiter(self.kind, id);
        }
        Poll::Pending
    }
}

/// An awaitable that parks the calling coroutine on the event loop's yield
/// FIFO and resolves the next time that loop steps.
pub struct Yield {
    parked: bool,
}

impl Yield {
    pub fn new() -> Self {
        Yield { parked: false }
    }
}

impl Default for Yield {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for Yield {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let id = current_task().expect("awaited outside a coroutine");
        if take_pending(id).is_some() {
            return Poll::Ready(());
        }
        if !self.parked {
            self.parked = true;
            owner_of(id).expect("task has no owning event loop").yield_task(id);
        }
        Poll::Pending
    }
}

/// The only sanctioned event-loop migration primitive. Reassigns the
/// calling coroutine's owning event loop to `target`, enqueues it on
/// `target`'s yield FIFO, and (by virtue of no longer being on the origin
/// loop's queues at all) clears the origin's claim on it. The coroutine
/// resumes on `target`'s next step.
pub struct YieldTo {
    target: &'static EventLoop,
    parked: bool,
}

impl YieldTo {
    pub fn new(target: &'static EventLoop) -> Self {
        YieldTo { target, parked: false }
    }
}

impl Future for YieldTo {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let id = current_task().expect("awaited outside a coroutine");
        if take_pending(id).is_some() {
            return Poll::Ready(());
        }
        if !self.parked {
            self.parked = true;
            set_owner(id, self.target);
            self.target.yield_task(id);
        }
        Poll::Pending
    }
}

/// Waits for the next occurrence of `kind`, returning its payload.
pub async fn wait_for(kind: EventType) -> u32 {
    EventAwaiter::new(kind).await
}

/// Yields control back to the event loop, resuming on its next step.
pub async fn yield_now() {
    Yield::new().await
}

/// Migrates the calling coroutine to `target`: the next time `target` steps,
/// this coroutine resumes there instead of on its current loop.
pub async fn yield_to(target: &'static EventLoop) {
    YieldTo::new(target).await
}

/// A typed handle over a coroutine submitted as a child of the caller: a
/// boxed future plus a result cell. Awaiting it suspends the parent until
/// the child's future completes, at which point the parent is woken the
/// same way any child with a `parent` link is (see [`poll_task`]).
pub struct Coroutine<R> {
    id: TaskId,
    result: Rc<RefCell<Option<R>>>,
}

impl<R> Coroutine<R> {
    /// The id of the underlying task, for diagnostics.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<R> Future for Coroutine<R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<R> {
        match self.result.borrow_mut().take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

/// Submits `future` to `event_loop` as a child of the calling coroutine,
/// exactly like [`spawn`], but returns a [`Coroutine`] handle whose eventual
/// result the caller can `.await` directly - the "final-suspend bookkeeping
/// of directly-submitted coroutines awaited by another submitted coroutine"
/// the data model names.
pub fn spawn_child<R: 'static>(event_loop: &'static EventLoop, future: impl Future<Output = R> + 'static) -> Coroutine<R> {
    let result = Rc::new(RefCell::new(None));
    let result_slot = Rc::clone(&result);
    let id = spawn(event_loop, async move {
        let value = future.await;
        *result_slot.borrow_mut() = Some(value);
    });
    Coroutine { id, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    use crate::event_loop::{main_event_loop, secondary_event_loop};

    static SEEN: AtomicU32 = AtomicU32::new(0);

    #[test]
    fn completes_immediately_for_a_future_with_no_await_point() {
        let id = spawn(main_event_loop(), async {
            SEEN.store(1, Ordering::SeqCst);
        });
        // the coroutine had no `.await`, so `spawn` already drove it to
        // completion; a further poll is a harmless no-op on a freed slot.
        poll_task(id);
        assert_eq!(SEEN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_warns_when_the_coroutine_never_suspends() {
        static WARN_COUNT: AtomicU32 = AtomicU32::new(0);

        struct CountingSink;
        impl core::fmt::Write for CountingSink {
            fn write_str(&mut self, _s: &str) -> core::fmt::Result {
                WARN_COUNT.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        static mut SINK: CountingSink = CountingSink;

        #[allow(static_mut_refs)]
        crate::log::set_sink(unsafe { &mut SINK });
        spawn(main_event_loop(), async {});
        assert!(WARN_COUNT.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn complete_awaiter_resumes_a_parked_event_wait() {
        static GOT: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);
        let id = spawn(main_event_loop(), async {
            let v = wait_for(EventType::Tick).await;
            GOT.store(v, core::sync::atomic::Ordering::SeqCst);
        });
        complete_awaiter(id, 42);
        assert_eq!(GOT.load(core::sync::atomic::Ordering::SeqCst), 42);
    }

    #[test]
    fn yield_to_moves_the_coroutine_to_the_target_loop() {
        static RESUMED_ON_SECONDARY: AtomicU32 = AtomicU32::new(0);
        let id = spawn(main_event_loop(), async {
            yield_to(secondary_event_loop()).await;
            RESUMED_ON_SECONDARY.store(1, Ordering::SeqCst);
        });
        assert!(core::ptr::eq(owner_of(id).unwrap(), secondary_event_loop()));
        // The coroutine parked on the secondary loop's yield FIFO; only
        // *that* loop's step resumes it.
        main_event_loop().step();
        assert_eq!(RESUMED_ON_SECONDARY.load(Ordering::SeqCst), 0);
        secondary_event_loop().step();
        assert_eq!(RESUMED_ON_SECONDARY.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_child_delivers_its_result_to_the_parent() {
        static GOT: AtomicU32 = AtomicU32::new(0);
        spawn(main_event_loop(), async {
            let child = spawn_child(main_event_loop(), async { 99u32 });
            let value = child.await;
            GOT.store(value, Ordering::SeqCst);
        });
        // the child has no `.await` of its own, so it completed inline
        // during `spawn_child`, and `poll_task` already woke the parent.
        assert_eq!(GOT.load(Ordering::SeqCst), 99);
    }
}
