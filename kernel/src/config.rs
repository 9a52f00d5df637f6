//! Boot-time tunables, gathered in one place.

/// Kernel virtual-address pool: a canonical higher-half region. The
/// first pages handed out are the permanently mapped PML4, the scratch
/// window, and the scratch window's page-table view.
pub const VA_POOL_BASE: u64 = 0xFFFF_8000_0000_0000;
pub const VA_POOL_SIZE: u64 = 1024 * 1024;

/// PIT channel-0 rate. The event dispatcher derives its second/minute/
/// hour cadence from this.
pub const TICK_HZ: u32 = 60;

/// The loader's identity mapping is assumed to cover at least this much
/// low memory before our own tables are live. The bootstrap heap is
/// clamped inside it, and the pre-CR3 paging phase writes table frames
/// through it.
pub const IDENTITY_WINDOW: u64 = 4 * 1024 * 1024;

/// Bootstrap heap is capped at 1 MiB; the kernel has no business
/// hoarding more this early.
pub const HEAP_MAX_BYTES: usize = 1024 * 1024;

/// Physical memory below this is never handed out by the frame
/// allocator: the identity window, legacy device holes, and the kernel
/// image all live down there.
pub const LOW_RESERVED: u64 = 16 * 1024 * 1024;

/// Bound on PS/2 controller status polls. Exhausting it means the
/// controller is absent or wedged; the keyboard stays disabled and boot
/// continues.
pub const PS2_SPIN_LIMIT: usize = 10_000;

/// Wipe the console before rendering a CPU-exception report.
pub const CLEAR_CONSOLE_ON_CRASH: bool = true;
