//! The supervisor-call table: up to 256 handlers, selected by the value the
//! caller left in `r0` before `svc #0`, exactly the POSIX-syscall-style
//! convention the reference kernel's `kernel::supervisor` uses.

use core::cell::UnsafeCell;

use crate::interrupt::{Continuation, Handler, InterruptContext};

const SVC_COUNT: usize = 256;

struct Slot {
    handler: Option<Handler>,
    userdata: usize,
}

const EMPTY: Slot = Slot {
    handler: None,
    userdata: 0,
};

struct Table(UnsafeCell<[Slot; SVC_COUNT]>);

// SAFETY: every access is guarded by `critical_section::with`.
unsafe impl Sync for Table {}

static TABLE: Table = Table(UnsafeCell::new([EMPTY; SVC_COUNT]));

/// Registers `handler` for `svc_number`, warning (not refusing) if it
/// replaces one already registered.
///
/// # Panics
///
/// Panics if `svc_number >= 256`.
pub fn register_svc(svc_number: u32, handler: Handler, userdata: usize) {
    let svc_number = svc_number as usize;
    assert!(svc_number < SVC_COUNT, "no SVC handler slot above 255");
    critical_section::with(|_cs| unsafe {
        let table = &mut (*TABLE.0.get());
        if table[svc_number].handler.is_some() {
            kwarn!("overwriting SVC handler for SVC number {}", svc_number);
        }
        table[svc_number] = Slot {
            handler: Some(handler),
            userdata,
        };
    });
}

/// The handler registered for [`crate::interrupt::InterruptKind::SoftwareInterrupt`].
/// Looks up `r0` in the table and runs whatever it finds, falling back to
/// the exception reporter when nothing is registered for that number.
pub fn handle_svc(ctx: &mut InterruptContext<'_>, _userdata: usize) {
    let svc_number = ctx.register(0) as usize;
    let slot = critical_section::with(|_cs| unsafe {
        let table = &*TABLE.0.get();
        table.get(svc_number).map(|s| (s.handler, s.userdata))
    });

    match slot.and_then(|(handler, userdata)| handler.map(|h| (h, userdata))) {
        Some((handler, userdata)) => handler(ctx, userdata),
        None => {
            ctx.result = Continuation::Next;
            crate::exception_report::handle(ctx, 0);
        }
    }
}
