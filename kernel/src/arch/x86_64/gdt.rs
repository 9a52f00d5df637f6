//! Minimal flat GDT: null, 64-bit kernel code, kernel data.
//!
//! Long mode ignores base and limit on code/data descriptors; the table
//! exists to pin down the L bit (64-bit mode), the privilege level, and
//! to give the IDT a code selector to name. Everything runs in ring 0
//! and there is no TSS: exceptions are terminal here, so no IST stack
//! is ever needed.

use core::arch::asm;
use core::mem::size_of;

/// Selector of GDT index 1 (bottom three bits are TI/RPL, zero for us).
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Selector of GDT index 2.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// The table itself. Read-only after `lgdt`; the CPU only ever reads it.
///
/// Code descriptor 0x00AF_9A00_0000_FFFF: present, DPL 0, code,
/// readable, G=1, **L=1** (the bit that keeps the CPU in 64-bit mode).
/// Data descriptor 0x00CF_9200_0000_FFFF: present, DPL 0, data,
/// writable, G=1, D/B=1.
static GDT: [u64; 3] = [0, 0x00AF_9A00_0000_FFFF, 0x00CF_9200_0000_FFFF];

#[repr(C, packed)]
struct GdtRegister {
    limit: u16,
    base: u64,
}

/// Load the GDT and make every segment register point at it.
///
/// CS cannot be `mov`-ed; it only changes together with RIP. The far
/// return pops both at once: push the new selector and a label address,
/// `retfq`, land on the label with CS reloaded.
pub fn init() {
    let gdtr = GdtRegister {
        limit: (size_of::<[u64; 3]>() - 1) as u16,
        base: &raw const GDT as u64,
    };

    unsafe {
        asm!("lgdt [{}]", in(reg) &gdtr, options(readonly, nostack, preserves_flags));

        asm!(
            "push {sel}",
            "lea {tmp}, [rip + 2f]",
            "push {tmp}",
            "retfq",
            "2:",
            sel = in(reg) KERNEL_CODE_SELECTOR as u64,
            tmp = lateout(reg) _,
            options(preserves_flags),
        );

        asm!(
            "mov ds, {sel:x}",
            "mov es, {sel:x}",
            "mov ss, {sel:x}",
            "mov fs, {sel:x}",
            "mov gs, {sel:x}",
            sel = in(reg) KERNEL_DATA_SELECTOR,
            options(nostack, preserves_flags),
        );
    }

    log::info!("gdt: flat 64-bit code/data loaded");
}
