//! Kernel entry and boot orchestration.
//!
//! A Multiboot2 loader calls [`kernel_main`] with the magic value and
//! the info-blob pointer. Init runs in a fixed order, each subsystem
//! depending on the ones before it, and any step whose preconditions
//! are not met halts with an error banner rather than limping on:
//!
//! serial → console → logger → multiboot parse → heap → frame
//! allocator → VA pool → paging (identity low 4 MiB, CR3 switch) →
//! GDT → exception gates → `lidt` → PIC remap + unmask → IRQ gates →
//! keyboard (non-fatal) → PIT → event hooks → `sti` → idle loop.

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

extern crate alloc;

mod arch;
mod boot;
mod config;
mod console;
mod events;
mod heap;
mod logging;
mod memory;
#[cfg(feature = "smoke-test")]
mod tests;
mod vmem;

use arch::x86_64 as x86;
use core::sync::atomic::{AtomicU64, Ordering};

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print_fmt(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($($arg:tt)*) => {{
        $crate::print!($($arg)*);
        $crate::print!("\n");
    }};
}

/// Seconds since the tick subsystem went live. Bumped from IRQ context;
/// a single atomic is all the synchronization that needs.
static UPTIME_SECONDS: AtomicU64 = AtomicU64::new(0);

fn on_second() {
    let uptime = UPTIME_SECONDS.fetch_add(1, Ordering::Relaxed) + 1;
    println!("uptime: {} s", uptime);
}

fn on_minute() {
    println!("minute passed");
}

/// Abort the init chain: banner, reason, halt.
fn boot_failure(reason: &str) -> ! {
    log::error!("boot failed: {}", reason);
    println!();
    println!("*** boot halted: {} ***", reason);
    loop {
        x86::halt();
    }
}

#[no_mangle]
pub extern "C" fn kernel_main(magic: u32, mbi: *const u8) -> ! {
    x86::serial::init();
    console::init();
    logging::init();

    println!("tephra {} booting", env!("CARGO_PKG_VERSION"));

    if magic != boot::BOOTLOADER_MAGIC {
        boot_failure("not started by a Multiboot2 loader");
    }
    let Some(info) = (unsafe { boot::parse(mbi) }) else {
        boot_failure("multiboot info blob is malformed");
    };

    if let Some(name) = info.bootloader {
        log::info!("loader: {}", name);
    }
    if let Some(cmdline) = info.cmdline {
        log::info!("cmdline: {}", cmdline);
    }
    log::info!(
        "mmap: {} entries, {} modules",
        info.mmap.len(),
        info.module_count
    );
    for (index, module) in info.modules().enumerate() {
        log::info!("module {}: {:#x}..{:#x}", index, module.start, module.end);
    }
    if let Some(fb) = info.framebuffer {
        log::info!(
            "framebuffer: {}x{}x{} at {:#x}",
            fb.width,
            fb.height,
            fb.bpp,
            fb.addr
        );
    }

    // Memory: heap first (the frame bitmap lives in it), then frames,
    // then the higher-half pool, then our own tables.
    if !heap::init_from_mmap(&info) {
        boot_failure("no usable memory-map entry for the heap");
    }
    if !memory::init(&info) {
        boot_failure("no usable memory for the frame allocator");
    }
    log::info!(
        "vmem: pool {:#x}+{:#x}",
        config::VA_POOL_BASE,
        config::VA_POOL_SIZE
    );
    if !x86::paging::init(x86::paging::PRESENT | x86::paging::WRITABLE) {
        boot_failure("paging bring-up failed");
    }
    log::info!("vmem: {} KiB of pool unclaimed", vmem::remaining() / 1024);

    // CPU structures and the interrupt stack.
    x86::gdt::init();
    x86::interrupts::register_exceptions();
    x86::interrupts::load();
    x86::pic::remap(0x20, 0x28);
    x86::pic::unmask(0);
    x86::pic::unmask(1);
    x86::interrupts::register_irqs();

    if !x86::keyboard::init() {
        log::warn!("keyboard: PS/2 controller timed out, continuing without it");
    }

    x86::pit::set_frequency(config::TICK_HZ);
    events::set_hz(config::TICK_HZ);
    events::register_second(on_second);
    events::register_minute(on_minute);

    x86::enable_interrupts();
    log::info!("interrupts on, entering idle loop");

    #[cfg(feature = "smoke-test")]
    tests::run_all();

    loop {
        x86::keyboard::poll_once();
        x86::halt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;

    x86::disable_interrupts();
    // The panicking code may have been holding the console lock; this
    // path never returns, so breaking the lock is fine.
    let mut con = unsafe { console::crash_console() };
    let _ = writeln!(con, "\n!!! KERNEL PANIC !!!\n{}", info);
    drop(con);
    loop {
        x86::halt();
    }
}
