//! Kernel heap singleton.
//!
//! The backing region is carved out of the first usable memory-map entry
//! that sits inside the loader's identity window (so the heap keeps
//! working across the CR3 switch; its pages are in the low 4 MiB that
//! stays identity-mapped). The engine is the boundary-tag allocator from
//! `tephra-core`; this module adds the lock, the region policy, the
//! C-style entry points the rest of the kernel uses, and a
//! `GlobalAlloc` so `alloc::` containers work.
//!
//! Interrupt handlers must never allocate: the lock is a plain spinlock
//! and a handler spinning on it while the foreground holds it would hang
//! the machine. Foreground paths take the lock under an [`IrqGuard`].

use crate::arch::x86_64::IrqGuard;
use crate::boot::BootInfo;
use crate::config;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use tephra_core::heap::{Heap, MAX_ALIGN, MIN_BLOCK_SIZE};

static HEAP: spin::Mutex<Option<Heap>> = spin::Mutex::new(None);

/// Find a region for the heap and lay it down. The chosen entry's first
/// page is skipped (the zero page of a region is often special), the
/// region is clamped to the identity window, and the heap is capped at
/// [`config::HEAP_MAX_BYTES`].
pub fn init_from_mmap(info: &BootInfo) -> bool {
    for entry in info.mmap.iter() {
        if !entry.is_usable() || entry.len == 0 {
            continue;
        }
        let start = entry.addr + 0x1000;
        if start >= config::IDENTITY_WINDOW {
            continue;
        }
        let end = (entry.addr + entry.len).min(config::IDENTITY_WINDOW);
        if end <= start {
            continue;
        }
        let size = ((end - start) as usize).min(config::HEAP_MAX_BYTES);
        if size < MIN_BLOCK_SIZE {
            continue;
        }

        let Some(heap) = (unsafe { Heap::new(start as *mut u8, size) }) else {
            continue;
        };
        {
            let _guard = IrqGuard::new();
            *HEAP.lock() = Some(heap);
        }

        log::info!("heap: {} KiB at {:#x}", size / 1024, start);
        return true;
    }
    false
}

fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
    let _guard = IrqGuard::new();
    HEAP.lock().as_mut().map(f)
}

/// Allocate `n` bytes, null when the heap is exhausted (or not up yet).
pub fn alloc(n: usize) -> *mut u8 {
    with_heap(|heap| heap.alloc(n)).unwrap_or(ptr::null_mut())
}

/// Zeroed `n * size` bytes, null on overflow or exhaustion.
pub fn calloc(n: usize, size: usize) -> *mut u8 {
    with_heap(|heap| heap.calloc(n, size)).unwrap_or(ptr::null_mut())
}

/// Resize an allocation.
///
/// # Safety
///
/// `p` must be null or live from this heap; it is invalid afterwards
/// unless returned unchanged.
pub unsafe fn realloc(p: *mut u8, new_size: usize) -> *mut u8 {
    with_heap(|heap| unsafe { heap.realloc(p, new_size) }).unwrap_or(ptr::null_mut())
}

/// Free an allocation. Null and foreign pointers are ignored.
///
/// # Safety
///
/// `p` must not be used after this call.
pub unsafe fn free(p: *mut u8) {
    with_heap(|heap| unsafe { heap.free(p) });
}

struct KernelAllocator;

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Every heap pointer is MAX_ALIGN-aligned; stricter layouts
        // would need over-allocation nothing in the kernel asks for.
        if layout.align() > MAX_ALIGN {
            return ptr::null_mut();
        }
        crate::heap::alloc(layout.size())
    }

    unsafe fn dealloc(&self, p: *mut u8, _layout: Layout) {
        unsafe { free(p) };
    }
}
