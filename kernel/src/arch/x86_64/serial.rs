//! COM1 16550 UART: the kernel's transcript channel.
//!
//! Everything the console shows is mirrored here, so a `-serial stdio`
//! QEMU run (or a real null-modem cable) captures the whole boot.

use super::port::{inb, outb};

const COM1: u16 = 0x3F8;

/// Program COM1 for 115200 baud, 8N1, FIFOs on.
pub fn init() {
    unsafe {
        outb(COM1 + 1, 0x00); // mask UART interrupts; we poll
        outb(COM1 + 3, 0x80); // DLAB on to reach the divisor latch
        outb(COM1 + 0, 0x01); // divisor 1 = 115200 baud
        outb(COM1 + 1, 0x00);
        outb(COM1 + 3, 0x03); // 8 data bits, no parity, 1 stop, DLAB off
        outb(COM1 + 2, 0xC7); // FIFO on, cleared, 14-byte threshold
        outb(COM1 + 4, 0x0B); // DTR | RTS | OUT2
    }
}

fn transmit(byte: u8) {
    unsafe {
        // LSR bit 5: transmit holding register empty.
        while inb(COM1 + 5) & 0x20 == 0 {
            core::hint::spin_loop();
        }
        outb(COM1, byte);
    }
}

/// Send one character, expanding `\n` to CR+LF for terminals.
pub fn write_char(c: u8) {
    if c == b'\n' {
        transmit(b'\r');
    }
    transmit(c);
}
