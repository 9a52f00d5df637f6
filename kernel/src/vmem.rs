//! Kernel virtual-address pool singleton.

use crate::config;
use tephra_core::vspace::VaPool;
use tephra_core::PAGE_SIZE;

static POOL: spin::Mutex<VaPool> =
    spin::Mutex::new(VaPool::new(config::VA_POOL_BASE, config::VA_POOL_SIZE));

/// One page-aligned range of `size` bytes, `None` once the pool is dry.
pub fn alloc_range(size: u64) -> Option<u64> {
    POOL.lock().alloc_range(size, PAGE_SIZE)
}

/// Bytes left in the pool.
pub fn remaining() -> u64 {
    POOL.lock().remaining()
}
