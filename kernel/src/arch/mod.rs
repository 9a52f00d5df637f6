//! Architecture-specific code. Only x86_64 exists; the cfg keeps the
//! door open without pretending a second port is underway.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::*;
