//! Boot-time smoke tests.
//!
//! Compiled in with the `smoke-test` feature and run from `kmain` once
//! interrupts are live. These exercise the pieces the host suite cannot:
//! the real heap region, real frames, and the real page tables. Output
//! goes to serial; a failed assertion panics with the reason.

use crate::arch::x86_64 as x86;
use crate::{events, heap, memory, println};
use tephra_core::PAGE_SIZE;

pub fn run_all() {
    test_heap();
    test_frames();
    test_paging();
    test_ticks();
    println!();
    println!("[ok] all smoke tests passed");
}

/// Heap: raw entry points plus the `alloc::` containers riding on the
/// global allocator.
fn test_heap() {
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::vec::Vec;

    let p1 = heap::alloc(64);
    let p2 = heap::alloc(128);
    assert!(!p1.is_null() && !p2.is_null());
    assert_ne!(p1, p2);
    unsafe {
        heap::free(p1);
        heap::free(p2);
    }

    let z = heap::calloc(16, 8);
    assert!(!z.is_null());
    for i in 0..128 {
        assert_eq!(unsafe { *z.add(i) }, 0);
    }
    unsafe {
        *z = 0x5A;
        let grown = heap::realloc(z, 1024);
        assert!(!grown.is_null());
        assert_eq!(*grown, 0x5A);
        heap::free(grown);
    }

    let mut v = Vec::new();
    v.extend_from_slice(&[1u32, 2, 3]);
    assert_eq!(v.iter().sum::<u32>(), 6);
    let b = Box::new(0xDEAD_BEEFu32);
    assert_eq!(*b, 0xDEAD_BEEF);
    let mut s = String::from("tephra");
    s.push_str(" heap");
    assert_eq!(s, "tephra heap");

    println!("[test] heap: raw + containers verified");
}

/// Frames: exclusivity and recycling.
fn test_frames() {
    let a = memory::alloc_page().expect("frame a");
    let b = memory::alloc_page().expect("frame b");
    assert_ne!(a, b);
    assert_eq!(a % PAGE_SIZE, 0);

    memory::free_page(a);
    let c = memory::alloc_page().expect("frame c");
    assert_eq!(c, a, "freed frame should be recycled first");

    memory::free_page(b);
    memory::free_page(c);
    println!("[test] frames: {} free after round-trip", memory::free_pages());
}

/// Paging: map one frame at two virtual addresses; a write through one
/// must be visible through the other, and `translate` must agree.
fn test_paging() {
    let frame = memory::alloc_page().expect("frame for paging test");
    let va1 = crate::vmem::alloc_range(PAGE_SIZE).expect("va1");
    let va2 = crate::vmem::alloc_range(PAGE_SIZE).expect("va2");

    let flags = x86::paging::PRESENT | x86::paging::WRITABLE;
    assert!(x86::paging::map_page(va1, frame, flags));
    assert!(x86::paging::map_page(va2, frame, flags));
    assert_eq!(x86::paging::translate(va1), Some(frame));
    assert_eq!(x86::paging::translate(va2 + 0x10), Some(frame + 0x10));

    let p1 = va1 as *mut u64;
    let p2 = va2 as *const u64;
    unsafe {
        p1.write_volatile(0xCAFE_F00D_1234_5678);
        assert_eq!(p2.read_volatile(), 0xCAFE_F00D_1234_5678);
    }

    println!("[test] paging: double mapping of {:#x} agrees", frame);
}

/// Ticks: the counter must advance while we halt.
fn test_ticks() {
    let before = events::ticks();
    for _ in 0..4 {
        x86::halt();
    }
    let after = events::ticks();
    assert!(after > before, "PIT ticks did not advance ({} -> {})", before, after);
    println!("[test] events: {} ticks observed", after);
}
