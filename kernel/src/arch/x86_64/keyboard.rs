//! PS/2 keyboard.
//!
//! The IRQ 1 handler does one thing: read the scancode from port 0x60
//! and push it into the ring from `tephra-core`. Modifier tracking,
//! set-1 translation, echo, and the `on_key` callback all run on the
//! consumer side in the idle loop, so the interrupt path stays a few
//! instructions long and translation state is touched from exactly one
//! context.
//!
//! Controller bring-up follows the usual sequence: flush, disable both
//! ports, patch the config byte (IRQ 1 on, translation off), re-enable
//! port 1, tell the device to start scanning. Every status-register
//! wait is bounded: a machine without a PS/2 controller (or with a
//! wedged one) exhausts the bound, [`init`] reports `false`, and the
//! kernel simply runs without a keyboard.

use super::port::{inb, outb};
use crate::arch::x86_64::IrqGuard;
use crate::config;
use tephra_core::scancode::{translate_set1, Modifiers, ScancodeRing};

const DATA: u16 = 0x60;
/// Status on read, command on write.
const STATUS: u16 = 0x64;

// Status bits.
const OUTPUT_FULL: u8 = 1 << 0;
const INPUT_FULL: u8 = 1 << 1;

static RING: spin::Mutex<ScancodeRing> = spin::Mutex::new(ScancodeRing::new());
static MODIFIERS: spin::Mutex<Modifiers> = spin::Mutex::new(Modifiers::new());
static ON_KEY: spin::Mutex<Option<fn(char)>> = spin::Mutex::new(None);

/// IRQ 1 body: buffer the raw byte. A full ring drops it; losing a
/// keystroke beats blocking an interrupt handler.
pub fn isr_scancode() {
    let scancode = unsafe { inb(DATA) };
    let _ = RING.lock().push(scancode);
}

/// Spin until the controller will accept a command byte.
fn wait_input_clear() -> bool {
    for _ in 0..config::PS2_SPIN_LIMIT {
        if unsafe { inb(STATUS) } & INPUT_FULL == 0 {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}

/// Spin until the controller has a byte for us.
fn wait_output_full() -> bool {
    for _ in 0..config::PS2_SPIN_LIMIT {
        if unsafe { inb(STATUS) } & OUTPUT_FULL != 0 {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}

/// Drain stale bytes left over from the firmware.
fn flush() {
    for _ in 0..16 {
        if unsafe { inb(STATUS) } & OUTPUT_FULL == 0 {
            break;
        }
        unsafe { inb(DATA) };
    }
}

/// Bring the controller and device up. `false` means a bounded wait ran
/// out and the keyboard stays disabled; boot continues without it.
pub fn init() -> bool {
    flush();

    // Quiesce both ports while reconfiguring.
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(STATUS, 0xAD) }; // disable port 1
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(STATUS, 0xA7) }; // disable port 2, if present

    // Config byte: IRQ 1 on, scancode translation off.
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(STATUS, 0x20) };
    if !wait_output_full() {
        return false;
    }
    let mut cfg = unsafe { inb(DATA) };
    cfg |= 0x01;
    cfg &= !0x10;
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(STATUS, 0x60) };
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(DATA, cfg) };

    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(STATUS, 0xAE) }; // enable port 1

    // Device command: enable scanning.
    if !wait_input_clear() {
        return false;
    }
    unsafe { outb(DATA, 0xF4) };
    if !wait_output_full() {
        return false;
    }
    let ack = unsafe { inb(DATA) };
    if ack != 0xFA {
        log::warn!("keyboard: expected ACK for enable-scanning, got {:#04x}", ack);
    }

    log::info!("keyboard: PS/2 port 1 enabled");
    true
}

/// Register a callback fired for every translated character.
pub fn set_on_key(hook: fn(char)) {
    let _guard = IrqGuard::new();
    *ON_KEY.lock() = Some(hook);
}

/// Pop buffered scancodes until one translates. Break codes and
/// modifier traffic update state and keep draining; an empty ring ends
/// the attempt.
pub fn getch() -> Option<char> {
    loop {
        let scancode = {
            let _guard = IrqGuard::new();
            RING.lock().pop()
        }?;
        let mut mods = MODIFIERS.lock();
        mods.update(scancode);
        if let Some(c) = translate_set1(scancode, &mods) {
            return Some(c);
        }
    }
}

/// Accumulate a line into `buf`: stops at newline (kept), at a full
/// buffer, or when the ring runs dry. Backspace removes the previous
/// byte. Returns the byte count; the buffer is NUL-terminated.
pub fn read_line(buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    let mut n = 0;
    while n < buf.len() - 1 {
        let Some(c) = getch() else {
            break;
        };
        match c {
            '\n' => {
                buf[n] = b'\n';
                n += 1;
                break;
            }
            '\x08' => n = n.saturating_sub(1),
            _ => {
                buf[n] = c as u8;
                n += 1;
            }
        }
    }
    buf[n] = 0;
    n
}

/// One idle-loop iteration of keyboard work: translate the next
/// buffered key, echo it, and run the registered callback.
pub fn poll_once() {
    if let Some(c) = getch() {
        let hook = {
            let _guard = IrqGuard::new();
            *ON_KEY.lock()
        };
        if let Some(hook) = hook {
            hook(c);
        }
        crate::print!("{}", c);
    }
}
