//! Tick event singleton.
//!
//! The timer interrupt drives [`on_timer_tick`]; everything else is
//! one-shot registration from the boot path. The dispatcher lock is
//! taken from IRQ context, so foreground accessors hold an [`IrqGuard`]
//! for their whole critical section.

use crate::arch::x86_64::IrqGuard;
use tephra_core::events::{Hook, TickDispatcher};

static DISPATCHER: spin::Mutex<TickDispatcher> = spin::Mutex::new(TickDispatcher::new());

/// Tell the dispatcher what rate the PIT was programmed for.
pub fn set_hz(hz: u32) {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().set_hz(hz);
}

pub fn register_tick(hook: Hook) {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().register_tick(hook);
}

pub fn register_second(hook: Hook) {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().register_second(hook);
}

pub fn register_minute(hook: Hook) {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().register_minute(hook);
}

pub fn register_hour(hook: Hook) {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().register_hour(hook);
}

/// Ticks since the PIT was unmasked.
pub fn ticks() -> u64 {
    let _guard = IrqGuard::new();
    DISPATCHER.lock().ticks()
}

/// IRQ0 body. Runs with IF=0 (interrupt gate), so the plain lock is
/// safe against the foreground's guarded accesses.
pub fn on_timer_tick() {
    DISPATCHER.lock().advance();
}
