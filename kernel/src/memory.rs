//! Physical frame allocator singleton.
//!
//! The bitmap engine lives in `tephra-core`; this module owns the boot
//! policy. The managed span is derived from the usable memory-map
//! entries, the bitmap itself is heap-allocated (which is why the heap
//! initializes first), and three classes of frames are reserved before
//! anything is handed out:
//!
//! 1. every non-usable memory-map region intersecting the span,
//! 2. the low 16 MiB (identity window, legacy holes, kernel image),
//! 3. the VGA text page.
//!
//! The allocator is only called during table creation and early setup,
//! never from interrupt context, so the plain lock suffices.

use crate::boot::BootInfo;
use crate::config;
use tephra_core::frames::{FrameBitmap, Region};
use tephra_core::PAGE_SIZE;

/// Memory maps on PC hardware run 10–20 entries; 64 leaves slack.
const MAX_REGIONS: usize = 64;

static FRAMES: spin::Once<spin::Mutex<FrameBitmap<'static>>> = spin::Once::new();

/// Build the allocator from the memory map. `false` when the map has no
/// usable memory or the bitmap cannot be allocated; the caller treats
/// that as a failed boot precondition.
pub fn init(info: &BootInfo) -> bool {
    let mut regions = [Region {
        addr: 0,
        len: 0,
        usable: false,
    }; MAX_REGIONS];
    let mut count = 0;
    for entry in info.mmap.iter().take(MAX_REGIONS) {
        regions[count] = Region {
            addr: entry.addr,
            len: entry.len,
            usable: entry.is_usable(),
        };
        count += 1;
    }
    let regions = &regions[..count];

    let Some((base, limit)) = FrameBitmap::span(regions) else {
        return false;
    };

    let bitmap_bytes = FrameBitmap::bytes_needed(base, limit);
    let bits_ptr = crate::heap::alloc(bitmap_bytes);
    if bits_ptr.is_null() {
        return false;
    }
    let bits: &'static mut [u8] =
        unsafe { core::slice::from_raw_parts_mut(bits_ptr, bitmap_bytes) };

    let mut frames = FrameBitmap::new(bits, base, limit);
    frames.reserve_regions(regions);
    frames.reserve_range(0, config::LOW_RESERVED);
    let vga_page = 0xB8000 & !(PAGE_SIZE - 1);
    frames.reserve_range(vga_page, vga_page + PAGE_SIZE);

    log::info!(
        "frames: {:#x}..{:#x}, {} free of {} ({} byte bitmap)",
        base,
        limit,
        frames.free_pages(),
        frames.total_pages(),
        bitmap_bytes
    );

    FRAMES.call_once(|| spin::Mutex::new(frames));
    true
}

/// Allocate one 4 KiB frame. `None` when physical memory is exhausted
/// (or the allocator is not up).
pub fn alloc_page() -> Option<u64> {
    FRAMES.get()?.lock().alloc_page()
}

/// Return a frame. Out-of-span addresses are ignored.
pub fn free_page(pa: u64) {
    if let Some(frames) = FRAMES.get() {
        frames.lock().free_page(pa);
    }
}

/// Free-frame count, for diagnostics.
pub fn free_pages() -> u64 {
    FRAMES.get().map(|f| f.lock().free_pages()).unwrap_or(0)
}
