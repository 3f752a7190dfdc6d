//! A free-list heap allocator over a single fixed-size arena.
//!
//! Grounded in the original kernel's `malloc`/`free`: blocks are
//! doubly-linked in address order, the low bit of the size word marks
//! "used", allocation starts its search at the last-allocated block and
//! wraps around the arena once ("last-fit-with-wrap"), an allocation that
//! doesn't leave enough room for a new block header just takes the whole
//! free block, and freeing coalesces with both left and right neighbours in
//! one pass.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr::{self, NonNull};

use critical_section::Mutex;

/// Every allocation is rounded up to this alignment, matching the
/// original's `alignment_of<max_align_t>`. [`GlobalAlloc::alloc`] on a
/// `Layout` that asks for more than this panics rather than silently
/// under-aligning.
const ALIGNMENT: usize = 8;
const USED_MASK: usize = 0b1;
const SIZE_MASK: usize = !0b111;

#[repr(C)]
struct BlockHeader {
    prev: *mut BlockHeader,
    next: *mut BlockHeader,
    size: usize,
}

impl BlockHeader {
    #[inline]
    fn is_used(&self) -> bool {
        self.size & USED_MASK != 0
    }

    #[inline]
    fn payload_size(&self) -> usize {
        self.size & SIZE_MASK
    }

    #[inline]
    unsafe fn data_ptr(block: *mut BlockHeader) -> *mut u8 {
        unsafe { (block as *mut u8).add(size_of::<BlockHeader>()) }
    }
}

/// Point-in-time allocator counters, mirroring `kernel::memory_statistics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub memory_total: usize,
    pub memory_allocated: usize,
    pub num_blocks: usize,
    pub num_allocations: usize,
    pub block_overhead: usize,
}

struct HeapState {
    start: *mut BlockHeader,
    last_allocation: *mut BlockHeader,
    stats: Stats,
}

// SAFETY: a `HeapState` is only ever reached through the allocator's
// critical-section-guarded `Mutex`.
unsafe impl Send for HeapState {}

fn round_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

impl HeapState {
    unsafe fn new(start: *mut u8, size: usize) -> Self {
        unsafe {
            let block = start as *mut BlockHeader;
            (*block).prev = ptr::null_mut();
            (*block).next = ptr::null_mut();
            (*block).size = size - size_of::<BlockHeader>();
            HeapState {
                start: block,
                last_allocation: block,
                stats: Stats {
                    memory_total: size,
                    memory_allocated: 0,
                    num_blocks: 1,
                    num_allocations: 0,
                    block_overhead: size_of::<BlockHeader>(),
                },
            }
        }
    }

    unsafe fn find_fit(&self, size_aligned: usize) -> Option<*mut BlockHeader> {
        unsafe {
            let mut current = self.last_allocation;
            while !current.is_null() {
                if !(*current).is_used() && (*current).payload_size() >= size_aligned {
                    return Some(current);
                }
                current = (*current).next;
            }
            current = self.start;
            while !current.is_null() && current != self.last_allocation {
                if !(*current).is_used() && (*current).payload_size() >= size_aligned {
                    return Some(current);
                }
                current = (*current).next;
            }
            None
        }
    }

    unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let size_aligned = round_up(size, ALIGNMENT);

        let Some(pick) = (unsafe { self.find_fit(size_aligned) }) else {
            return ptr::null_mut();
        };

        unsafe {
            let data = BlockHeader::data_ptr(pick);
            let picked_size = (*pick).payload_size();
            let final_size;

            if picked_size == size_aligned {
                (*pick).size |= USED_MASK;
                final_size = size_aligned;
            } else if picked_size < size_aligned + size_of::<BlockHeader>() + ALIGNMENT {
                // Not enough room left over for a header plus a useful
                // payload; hand over the whole block instead of splitting.
                (*pick).size |= USED_MASK;
                final_size = picked_size;
            } else {
                let remaining = picked_size - size_of::<BlockHeader>() - size_aligned;
                let new_block = data.add(size_aligned) as *mut BlockHeader;
                (*new_block).next = (*pick).next;
                (*new_block).prev = pick;
                (*new_block).size = remaining;
                if !(*pick).next.is_null() {
                    (*(*pick).next).prev = new_block;
                }
                (*pick).next = new_block;
                (*pick).size = size_aligned | USED_MASK;
                final_size = size_aligned;
                self.stats.num_blocks += 1;
            }

            self.last_allocation = pick;
            ptr::write_bytes(data, 0, final_size);
            self.stats.num_allocations += 1;
            self.stats.memory_allocated += final_size;
            data
        }
    }

    unsafe fn deallocate(&mut self, data: *mut u8) {
        if data.is_null() {
            return;
        }
        unsafe {
            let block = data.sub(size_of::<BlockHeader>()) as *mut BlockHeader;
            if !(*block).is_used() {
                panic!("double free");
            }

            self.stats.memory_allocated -= (*block).payload_size();
            self.stats.num_allocations -= 1;

            let prev = (*block).prev;
            let next = (*block).next;
            let prev_free = !prev.is_null() && !(*prev).is_used();
            let next_free = !next.is_null() && !(*next).is_used();

            if prev_free && next_free {
                (*prev).size += (*block).payload_size() + (*next).payload_size() + 2 * size_of::<BlockHeader>();
                (*prev).next = (*next).next;
                if !(*next).next.is_null() {
                    (*(*next).next).prev = prev;
                }
                if self.last_allocation == block || self.last_allocation == next {
                    self.last_allocation = prev;
                }
                self.stats.num_blocks -= 2;
            } else if prev_free {
                (*prev).size += (*block).payload_size() + size_of::<BlockHeader>();
                (*prev).next = next;
                if !next.is_null() {
                    (*next).prev = prev;
                }
                if self.last_allocation == block {
                    self.last_allocation = prev;
                }
                self.stats.num_blocks -= 1;
            } else if next_free {
                (*block).size += (*next).payload_size() + size_of::<BlockHeader>();
                (*block).size &= !USED_MASK;
                if !(*next).next.is_null() {
                    (*(*next).next).prev = block;
                }
                if self.last_allocation == next {
                    self.last_allocation = block;
                }
                (*block).next = (*next).next;
                self.stats.num_blocks -= 1;
            } else {
                (*block).size &= !USED_MASK;
            }
        }
    }
}

/// The `#[global_allocator]` for the kernel target.
pub struct KernelAllocator {
    state: Mutex<core::cell::RefCell<Option<HeapState>>>,
}

impl KernelAllocator {
    pub const fn new() -> Self {
        KernelAllocator {
            state: Mutex::new(core::cell::RefCell::new(None)),
        }
    }

    /// Returns a snapshot of the allocator's counters.
    pub fn stats(&self) -> Stats {
        critical_section::with(|cs| {
            self.state
                .borrow(cs)
                .borrow()
                .as_ref()
                .map(|s| s.stats)
                .unwrap_or_default()
        })
    }
}

impl Default for KernelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the global allocator to manage `region = (start, len)`.
///
/// # Safety
///
/// `region` must describe writable memory not otherwise in use, and this
/// must be called exactly once before any allocation happens.
pub unsafe fn init(region: (*mut u8, usize)) {
    unsafe {
        let (start, len) = region;
        critical_section::with(|cs| {
            *ALLOCATOR_STATE.borrow(cs).borrow_mut() = Some(HeapState::new(start, len));
        });
    }
}

static ALLOCATOR_STATE: Mutex<core::cell::RefCell<Option<HeapState>>> =
    Mutex::new(core::cell::RefCell::new(None));

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        assert!(
            layout.align() <= ALIGNMENT,
            "requested alignment exceeds the heap's max alignment"
        );
        critical_section::with(|cs| {
            let mut state = ALLOCATOR_STATE.borrow(cs).borrow_mut();
            match state.as_mut() {
                Some(s) => unsafe { s.allocate(layout.size()) },
                None => ptr::null_mut(),
            }
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        critical_section::with(|cs| {
            let mut state = ALLOCATOR_STATE.borrow(cs).borrow_mut();
            if let Some(s) = state.as_mut() {
                unsafe { s.deallocate(ptr) };
            }
        })
    }
}

/// Allocates `size` bytes directly against the heap arena, bypassing
/// [`GlobalAlloc`]'s `Layout` requirement - for the shell's `malloc`
/// command, which (like the original's `malloc()`) only ever gets a byte
/// count from the user.
pub fn raw_alloc(size: usize) -> *mut u8 {
    critical_section::with(|cs| {
        let mut state = ALLOCATOR_STATE.borrow(cs).borrow_mut();
        match state.as_mut() {
            Some(s) => unsafe { s.allocate(size) },
            None => ptr::null_mut(),
        }
    })
}

/// Allocates space for `n` elements of `size` bytes each, already zeroed
/// (every allocation out of this arena is zeroed anyway - see
/// [`HeapState::allocate`]). Returns null on a `n * size` overflow instead
/// of silently wrapping, matching the original's `calloc(n, sz)`.
pub fn calloc(n: usize, size: usize) -> *mut u8 {
    match n.checked_mul(size) {
        Some(total) => raw_alloc(total),
        None => ptr::null_mut(),
    }
}

/// Frees a pointer previously returned by [`raw_alloc`] (or the global
/// allocator), without needing its `Layout` back - for the shell's `free`
/// command.
pub fn raw_free(ptr: *mut u8) {
    critical_section::with(|cs| {
        let mut state = ALLOCATOR_STATE.borrow(cs).borrow_mut();
        if let Some(s) = state.as_mut() {
            unsafe { s.deallocate(ptr) };
        }
    })
}

/// Returns current heap counters, or all-zero if the heap has not been
/// initialized yet.
pub fn stats() -> Stats {
    critical_section::with(|cs| {
        ALLOCATOR_STATE
            .borrow(cs)
            .borrow()
            .as_ref()
            .map(|s| s.stats)
            .unwrap_or_default()
    })
}

#[allow(dead_code)]
fn _assert_non_null_ptr(_: NonNull<u8>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_arena<R>(size: usize, f: impl FnOnce(&mut HeapState) -> R) -> R {
        let mut buf = alloc::vec![0u8; size];
        let mut state = unsafe { HeapState::new(buf.as_mut_ptr(), buf.len()) };
        let r = f(&mut state);
        drop(buf);
        r
    }

    #[test]
    fn single_allocation_uses_whole_arena_header() {
        with_arena(256, |state| {
            let p = unsafe { state.allocate(16) };
            assert!(!p.is_null());
            assert_eq!(state.stats.num_allocations, 1);
            assert_eq!(state.stats.num_blocks, 2);
        });
    }

    #[test]
    fn free_coalesces_both_neighbours() {
        with_arena(512, |state| {
            let a = unsafe { state.allocate(16) };
            let b = unsafe { state.allocate(16) };
            let c = unsafe { state.allocate(16) };
            assert_eq!(state.stats.num_blocks, 4);

            unsafe {
                state.deallocate(a);
                state.deallocate(c);
                state.deallocate(b);
            }
            // a, b, c and the trailing free block all collapse into one.
            assert_eq!(state.stats.num_blocks, 1);
            assert_eq!(state.stats.num_allocations, 0);
        });
    }

    #[test]
    fn out_of_memory_returns_null() {
        with_arena(64, |state| {
            let p = unsafe { state.allocate(1024) };
            assert!(p.is_null());
        });
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        with_arena(128, |state| {
            let p = unsafe { state.allocate(8) };
            unsafe {
                state.deallocate(p);
                state.deallocate(p);
            }
        });
    }

    #[test]
    fn zero_size_allocation_returns_null() {
        with_arena(128, |state| {
            let p = unsafe { state.allocate(0) };
            assert!(p.is_null());
        });
    }

    #[test]
    fn calloc_overflow_returns_null() {
        assert!(calloc(usize::MAX, 2).is_null());
    }

    #[test]
    fn calloc_without_a_heap_returns_null() {
        // no `init()` has run in this test binary, so the allocator has no
        // arena to serve from; `calloc` must fail closed, not panic.
        assert!(calloc(4, 8).is_null());
    }
}
