//! Kernel page tables.
//!
//! Two phases with fundamentally different addressability, kept as
//! separate code paths on purpose.
//!
//! **Phase A (pre-CR3, [`init`]).** No kernel-managed tables exist yet;
//! the only mapping is whatever identity window the loader left over
//! low memory. Table frames come from the frame allocator (whose first
//! frames sit just above the 16 MiB reservation) and are zeroed and
//! wired through their *physical* addresses, legal only inside that
//! identity window. The phase builds:
//!
//! - an identity chain covering the low 4 MiB with 4 KiB leaves
//!   (PML4[0] → PDPT → PD → two PTs), and
//! - a higher-half chain for the VA pool (PML4[256] → …PT), into which
//!   three pool pages are permanently wired: the PML4 itself, the
//!   scratch window, and a window onto the PT holding the pool's own
//!   leaves.
//!
//! Then CR3 is loaded and physical addresses stop being dereferencable.
//!
//! **Phase B (post-CR3).** Table pages are reached one at a time
//! through the scratch window: point the scratch leaf PTE at the frame,
//! `invlpg`, touch, unpoint. The leaf itself stays reachable because
//! its PT is one of the permanently mapped pool pages; that one-page
//! self-map is what breaks the chicken-and-egg between "remap scratch"
//! and "walk the tables". The PML4 is read and written directly through
//! its permanent mapping.
//!
//! [`map_page`]/[`map_range`] feed the walker in `tephra-core` with a
//! [`TableAccess`] built from the scratch window. There is no locking:
//! table edits only happen on the boot path and the foreground, never
//! from interrupt context, so the single writer is structural.

use crate::{config, memory, vmem};
use core::arch::asm;
use tephra_core::paging::{self, Table, ADDR_MASK};
use tephra_core::PAGE_SIZE;

pub use tephra_core::paging::{NO_EXECUTE, PRESENT, USER, WRITABLE};

struct PagingState {
    /// CR3 value.
    pml4_pa: u64,
    /// Permanent mapping of the PML4 page.
    pml4_va: u64,
    /// The one remappable window.
    scratch_va: u64,
    /// Permanent window onto the PT that contains the pool's leaves,
    /// including the scratch leaf itself.
    pool_pt_va: u64,
    /// Index of the scratch leaf within that PT.
    scratch_slot: usize,
}

static PAGING: spin::Once<PagingState> = spin::Once::new();

fn invlpg(va: u64) {
    unsafe {
        asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}

fn write_cr3(pml4_pa: u64) {
    unsafe {
        asm!("mov cr3, {}", in(reg) pml4_pa, options(nostack, preserves_flags));
    }
}

// ---------------------------------------------------------------------
// Phase A: pre-CR3, physical-address writes in the identity window
// ---------------------------------------------------------------------

/// Allocate a table frame and zero it through its physical address.
/// Pre-CR3 only.
fn alloc_table_identity() -> Option<u64> {
    let pa = memory::alloc_page()?;
    unsafe { core::ptr::write_bytes(pa as *mut u8, 0, PAGE_SIZE as usize) };
    Some(pa)
}

/// View a freshly allocated table frame through the identity window.
/// Pre-CR3 only.
unsafe fn table_identity(pa: u64) -> &'static mut Table {
    unsafe { &mut *(pa as *mut Table) }
}

/// Build the kernel tables and switch CR3 to them.
///
/// `identity_leaf_flags` is applied to the low-memory identity leaves
/// (PRESENT is implied for the walk to work; pass it anyway).
///
/// Precondition: the loader's identity mapping must cover both the low
/// 4 MiB and the frames the allocator is currently handing out (the
/// first of which sit just past [`config::LOW_RESERVED`]).
///
/// Returns `false` if any frame or pool allocation fails; the system
/// then stays on the loader's tables.
pub fn init(identity_leaf_flags: u64) -> bool {
    if PAGING.get().is_some() {
        return true;
    }

    // Eight table frames: the root, the low identity chain (PDPT, PD,
    // two PTs for 4 MiB of 4 KiB leaves), and the high pool chain.
    let Some(pml4_pa) = alloc_table_identity() else {
        return false;
    };
    let Some(pdpt_lo) = alloc_table_identity() else {
        return false;
    };
    let Some(pd_lo) = alloc_table_identity() else {
        return false;
    };
    let Some(pt_lo0) = alloc_table_identity() else {
        return false;
    };
    let Some(pt_lo1) = alloc_table_identity() else {
        return false;
    };
    let Some(pdpt_hi) = alloc_table_identity() else {
        return false;
    };
    let Some(pd_hi) = alloc_table_identity() else {
        return false;
    };
    let Some(pool_pt) = alloc_table_identity() else {
        return false;
    };

    // Three pool pages that stay mapped forever. They are the first
    // three allocations from the pool, so they share `pool_pt`.
    let Some(pml4_va) = vmem::alloc_range(PAGE_SIZE) else {
        return false;
    };
    let Some(scratch_va) = vmem::alloc_range(PAGE_SIZE) else {
        return false;
    };
    let Some(pool_pt_va) = vmem::alloc_range(PAGE_SIZE) else {
        return false;
    };

    unsafe {
        let pml4 = table_identity(pml4_pa);

        // Low chain: identity-map the first 4 MiB at 4 KiB granularity.
        pml4[paging::pml4_index(0)] = pdpt_lo | PRESENT | WRITABLE;
        table_identity(pdpt_lo)[paging::pdpt_index(0)] = pd_lo | PRESENT | WRITABLE;
        let pd = table_identity(pd_lo);
        pd[0] = pt_lo0 | PRESENT | WRITABLE;
        pd[1] = pt_lo1 | PRESENT | WRITABLE;
        let flags = identity_leaf_flags & !paging::PAGE_SIZE_BIT;
        let low = table_identity(pt_lo0);
        let high = table_identity(pt_lo1);
        for i in 0..paging::ENTRY_COUNT {
            low[i] = (i as u64 * PAGE_SIZE) | flags;
            high[i] = ((i + paging::ENTRY_COUNT) as u64 * PAGE_SIZE) | flags;
        }

        // High chain for the VA pool.
        let base = config::VA_POOL_BASE;
        pml4[paging::pml4_index(base)] = pdpt_hi | PRESENT | WRITABLE;
        table_identity(pdpt_hi)[paging::pdpt_index(base)] = pd_hi | PRESENT | WRITABLE;
        table_identity(pd_hi)[paging::pd_index(base)] = pool_pt | PRESENT | WRITABLE;

        // Permanent pool leaves: the PML4 and the pool PT's own window.
        // The scratch leaf stays clear until the first map_scratch.
        let pt = table_identity(pool_pt);
        pt[paging::pt_index(pml4_va)] = pml4_pa | PRESENT | WRITABLE;
        pt[paging::pt_index(pool_pt_va)] = pool_pt | PRESENT | WRITABLE;
    }

    // The point of no return: physical addresses stop working here.
    write_cr3(pml4_pa);

    PAGING.call_once(|| PagingState {
        pml4_pa,
        pml4_va,
        scratch_va,
        pool_pt_va,
        scratch_slot: paging::pt_index(scratch_va),
    });

    log::info!(
        "paging: CR3={:#x}, PML4 at {:#x}, scratch at {:#x}",
        pml4_pa,
        pml4_va,
        scratch_va
    );
    true
}

// ---------------------------------------------------------------------
// Phase B: post-CR3, everything through the scratch window
// ---------------------------------------------------------------------

/// Point the scratch window at `pa`.
fn map_scratch(state: &PagingState, pa: u64) {
    unsafe {
        let leaves = state.pool_pt_va as *mut u64;
        leaves
            .add(state.scratch_slot)
            .write_volatile((pa & ADDR_MASK) | PRESENT | WRITABLE);
    }
    invlpg(state.scratch_va);
}

/// Clear the scratch window. Always paired with [`map_scratch`]; the
/// window is never left pointing at a table between operations.
fn unmap_scratch(state: &PagingState) {
    unsafe {
        let leaves = state.pool_pt_va as *mut u64;
        leaves.add(state.scratch_slot).write_volatile(0);
    }
    invlpg(state.scratch_va);
}

/// [`paging::TableAccess`] over the live tables: the PML4 through its
/// permanent mapping, every other table through a scratch
/// acquire-use-release.
struct ScratchTables {
    state: &'static PagingState,
}

impl paging::TableAccess for ScratchTables {
    fn alloc_table(&mut self) -> Option<u64> {
        let pa = memory::alloc_page()?;
        map_scratch(self.state, pa);
        unsafe {
            core::ptr::write_bytes(self.state.scratch_va as *mut u8, 0, PAGE_SIZE as usize)
        };
        unmap_scratch(self.state);
        Some(pa)
    }

    fn with_table<R, F>(&mut self, pa: u64, f: F) -> Option<R>
    where
        F: FnOnce(&mut Table) -> R,
    {
        if pa == self.state.pml4_pa {
            return Some(f(unsafe { &mut *(self.state.pml4_va as *mut Table) }));
        }
        map_scratch(self.state, pa);
        let result = f(unsafe { &mut *(self.state.scratch_va as *mut Table) });
        unmap_scratch(self.state);
        Some(result)
    }

    fn flush(&mut self, va: u64) {
        invlpg(va);
    }
}

/// Map one 4 KiB page. `false` when paging is not initialized or a
/// table allocation fails mid-walk (partially created intermediates are
/// kept; they carry no leaves).
pub fn map_page(va: u64, pa: u64, flags: u64) -> bool {
    let Some(state) = PAGING.get() else {
        return false;
    };
    paging::map_page(&mut ScratchTables { state }, state.pml4_pa, va, pa, flags)
}

/// Map `size` bytes, stopping at the first failure.
pub fn map_range(va: u64, pa: u64, size: u64, flags: u64) -> bool {
    let Some(state) = PAGING.get() else {
        return false;
    };
    paging::map_range(&mut ScratchTables { state }, state.pml4_pa, va, pa, size, flags)
}

/// Physical address `va` currently maps to, if any.
pub fn translate(va: u64) -> Option<u64> {
    let state = PAGING.get()?;
    paging::translate(&mut ScratchTables { state }, state.pml4_pa, va)
}
