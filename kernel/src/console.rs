//! VGA text console.
//!
//! 80×25 cells at physical 0xB8000, each `char | attr << 8` with
//! `attr = bg << 4 | fg`. Newline behaves as CR+LF; writing past the
//! bottom row scrolls. Every character is mirrored to COM1, so serial
//! captures are a superset of what the screen shows.
//!
//! The buffer lives in the low identity window, so the same pointer
//! works before and after the CR3 switch.

use crate::arch::x86_64::{port::outb, serial, IrqGuard};
use core::fmt;

pub const WIDTH: usize = 80;
pub const HEIGHT: usize = 25;

const VGA_BASE: *mut u16 = 0xB8000 as *mut u16;

// VGA CRT controller registers driving the hardware cursor.
const CRTC_INDEX: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;

/// The standard 16-color text-mode palette.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

pub struct Console {
    row: usize,
    col: usize,
    fg: Color,
    bg: Color,
}

static CONSOLE: spin::Mutex<Console> = spin::Mutex::new(Console {
    row: 0,
    col: 0,
    fg: Color::LightGray,
    bg: Color::Black,
});

impl Console {
    fn cell(&self, c: u8) -> u16 {
        c as u16 | ((self.fg as u16 | (self.bg as u16) << 4) << 8)
    }

    fn store(&self, row: usize, col: usize, value: u16) {
        unsafe { VGA_BASE.add(row * WIDTH + col).write_volatile(value) };
    }

    /// Blank the screen and home the cursor.
    pub fn clear(&mut self) {
        let blank = self.cell(b' ');
        for index in 0..WIDTH * HEIGHT {
            unsafe { VGA_BASE.add(index).write_volatile(blank) };
        }
        self.set_cursor(0, 0);
    }

    /// Move both the logical and the hardware cursor.
    pub fn set_cursor(&mut self, col: usize, row: usize) {
        self.col = col;
        self.row = row;
        let pos = row * WIDTH + col;
        unsafe {
            outb(CRTC_INDEX, 0x0E);
            outb(CRTC_DATA, (pos >> 8) as u8);
            outb(CRTC_INDEX, 0x0F);
            outb(CRTC_DATA, pos as u8);
        }
    }

    /// Drop every row by one and blank the bottom line.
    pub fn scroll_up(&mut self) {
        for row in 1..HEIGHT {
            for col in 0..WIDTH {
                let value = unsafe { VGA_BASE.add(row * WIDTH + col).read_volatile() };
                self.store(row - 1, col, value);
            }
        }
        let blank = self.cell(b' ');
        for col in 0..WIDTH {
            self.store(HEIGHT - 1, col, blank);
        }
    }

    pub fn write_char(&mut self, c: u8) {
        serial::write_char(c);

        if c == b'\n' {
            self.col = 0;
            self.row += 1;
        } else {
            self.store(self.row, self.col, self.cell(c));
            self.col += 1;
            if self.col >= WIDTH {
                self.col = 0;
                self.row += 1;
            }
        }

        if self.row >= HEIGHT {
            self.scroll_up();
            self.row = HEIGHT - 1;
        }
        self.set_cursor(self.col, self.row);
    }

    pub fn write(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_char(byte);
        }
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.write_char(b'\n');
    }

    /// Sixteen uppercase hex digits, no prefix.
    pub fn write_hex64(&mut self, value: u64) {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        for shift in (0..16).rev() {
            self.write_char(DIGITS[((value >> (shift * 4)) & 0xF) as usize]);
        }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

/// Clear the screen at boot.
pub fn init() {
    let _guard = IrqGuard::new();
    CONSOLE.lock().clear();
}

/// Formatted output path shared by `print!` and the logger. Interrupts
/// are held off while the console lock is held so an IRQ-context
/// callback printing a line cannot deadlock against us.
pub fn print_fmt(args: fmt::Arguments) {
    use core::fmt::Write;
    let _guard = IrqGuard::new();
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Console access for the terminal CPU-exception path. The interrupted
/// code may have been holding the lock, and it is never coming back, so
/// the lock is broken by force. Only callable from a handler that will
/// halt the CPU.
///
/// # Safety
///
/// Must not be used outside a render-then-halt exception handler.
pub unsafe fn crash_console() -> spin::MutexGuard<'static, Console> {
    if CONSOLE.is_locked() {
        unsafe { CONSOLE.force_unlock() };
    }
    CONSOLE.lock()
}
