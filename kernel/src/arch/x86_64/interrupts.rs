//! IDT, CPU exception handlers, and the hardware IRQ gates.
//!
//! All 256 gates are 64-bit interrupt gates (type 0x8E): present, DPL 0,
//! IF cleared on entry, so handlers never nest. The handlers use the
//! `x86-interrupt` calling convention: the compiler saves every
//! register, accounts for the error code when the signature declares
//! one, and returns with `iretq`.
//!
//! Exceptions are terminal in this kernel: there is no user mode to
//! recover into, so every handler renders a report and parks the CPU in
//! a `hlt` loop. Three shapes cover vectors 0-31:
//!
//! - generic with error code (#DF, #TS, #NP, #SS, #GP, #AC),
//! - generic without (everything else, including reserved 21–31),
//! - specialised #DE, #UD, and #PF (the latter reads CR2 and decodes
//!   the error-code bit field).
//!
//! Hardware IRQs arrive on 0x20/0x21 after the PIC remap. Their
//! handlers do the minimum (tick fan-out, scancode buffering) and
//! issue EOI as their final action.

use super::{gdt, keyboard, pic};
use crate::config;
use crate::console::{self, Console};
use core::arch::asm;
use core::fmt::Write;
use core::mem::size_of;

/// Interrupt gate: present, DPL 0, 64-bit interrupt gate.
pub const INT_GATE: u8 = 0x8E;

/// Vector IRQ 0 lands on after the remap.
pub const IRQ_BASE: u8 = 0x20;

// ---------------------------------------------------------------------
// Gate descriptors
// ---------------------------------------------------------------------

/// One 16-byte IDT gate. The handler address is split across three
/// fields, a relic of the 32-bit format this layout grew out of.
#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const MISSING: IdtEntry = IdtEntry {
        offset_low: 0,
        selector: 0,
        ist: 0,
        type_attr: 0,
        offset_mid: 0,
        offset_high: 0,
        reserved: 0,
    };
}

static mut IDT: [IdtEntry; 256] = [IdtEntry::MISSING; 256];

#[repr(C, packed)]
struct IdtRegister {
    limit: u16,
    base: u64,
}

/// Install `handler` (a raw function address) at `vector`. IST is never
/// used; there is no TSS.
pub fn set_gate(vector: usize, handler: u64, selector: u16, type_attr: u8) {
    let entry = IdtEntry {
        offset_low: handler as u16,
        selector,
        ist: 0,
        type_attr,
        offset_mid: (handler >> 16) as u16,
        offset_high: (handler >> 32) as u32,
        reserved: 0,
    };
    unsafe {
        (*(&raw mut IDT))[vector] = entry;
    }
}

/// `lidt`. Callable once the exception gates are registered.
pub fn load() {
    unsafe {
        let idtr = IdtRegister {
            limit: (size_of::<[IdtEntry; 256]>() - 1) as u16,
            base: &raw const IDT as u64,
        };
        asm!("lidt [{}]", in(reg) &idtr, options(readonly, nostack, preserves_flags));
    }
    log::info!("idt: 256 gates loaded");
}

// ---------------------------------------------------------------------
// Exception rendering
// ---------------------------------------------------------------------

/// The frame the CPU pushes before entering a handler.
#[repr(C)]
pub struct InterruptStackFrame {
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

static EXCEPTION_NAMES: [&str; 32] = [
    "#DE Divide Error",
    "#DB Debug",
    "NMI",
    "#BP Breakpoint",
    "#OF Overflow",
    "#BR Bound Range Exceeded",
    "#UD Invalid Opcode",
    "#NM Device Not Available",
    "#DF Double Fault",
    "Coprocessor Segment Overrun",
    "#TS Invalid TSS",
    "#NP Segment Not Present",
    "#SS Stack Segment Fault",
    "#GP General Protection Fault",
    "#PF Page Fault",
    "Reserved",
    "#MF x87 Floating-Point Error",
    "#AC Alignment Check",
    "#MC Machine Check",
    "#XM SIMD Floating-Point",
    "#VE Virtualization Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

fn halt_forever() -> ! {
    loop {
        unsafe { asm!("hlt", options(nomem, nostack)) };
    }
}

/// Start the crash report: optionally wipe the screen, home the cursor,
/// print the banner. Returns the (force-acquired) console for the rest
/// of the report.
fn render_banner(name: &str) -> spin::MutexGuard<'static, Console> {
    let mut con = unsafe { console::crash_console() };
    if config::CLEAR_CONSOLE_ON_CRASH {
        con.clear();
    }
    con.set_cursor(0, 0);
    con.writeln("=== CPU EXCEPTION ===");
    con.write("CPU exception encountered: ");
    con.writeln(name);
    con.writeln("---------------------");
    con
}

fn render_frame(con: &mut Console, frame: &InterruptStackFrame) {
    let mut dump = |key: &str, value: u64| {
        con.write(key);
        con.write(": ");
        con.write_hex64(value);
        con.write_char(b'\n');
    };
    dump("RIP   ", frame.rip);
    dump("CS    ", frame.cs);
    dump("RFLAGS", frame.rflags);
    dump("RSP   ", frame.rsp);
    dump("SS    ", frame.ss);
}

/// Decode a #PF error code into its named bits.
fn render_page_fault_error(con: &mut Console, error_code: u64) {
    con.write("Error ");
    con.write_hex64(error_code);
    con.write(" : ");

    let mut first = true;
    let mut add = |s: &str| {
        if !first {
            con.write(", ");
        }
        con.write(s);
        first = false;
    };

    add(if error_code & (1 << 0) != 0 {
        "P=protection"
    } else {
        "P=non-present"
    });
    add(if error_code & (1 << 1) != 0 {
        "W=write"
    } else {
        "R=read"
    });
    add(if error_code & (1 << 2) != 0 {
        "U=user"
    } else {
        "S=supervisor"
    });
    if error_code & (1 << 3) != 0 {
        add("RSVD");
    }
    if error_code & (1 << 4) != 0 {
        add("I/D=instr-fetch");
    }
    if error_code & (1 << 5) != 0 {
        add("PK");
    }
    if error_code & (1 << 6) != 0 {
        add("SS");
    }
    if error_code & (1 << 7) != 0 {
        add("HLAT");
    }
    con.write_char(b'\n');
}

// ---------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------

extern "x86-interrupt" fn generic_with_error(frame: InterruptStackFrame, error_code: u64) {
    let mut con = render_banner("Generic exception (with error code)");
    render_frame(&mut con, &frame);
    let _ = writeln!(con, "Error code: {:#x}", error_code);
    drop(con);
    halt_forever();
}

extern "x86-interrupt" fn generic_no_error(frame: InterruptStackFrame) {
    let mut con = render_banner("Generic exception (no error code)");
    render_frame(&mut con, &frame);
    drop(con);
    halt_forever();
}

extern "x86-interrupt" fn divide_error(frame: InterruptStackFrame) {
    let mut con = render_banner(EXCEPTION_NAMES[0]);
    render_frame(&mut con, &frame);
    drop(con);
    halt_forever();
}

extern "x86-interrupt" fn invalid_opcode(frame: InterruptStackFrame) {
    let mut con = render_banner(EXCEPTION_NAMES[6]);
    render_frame(&mut con, &frame);
    drop(con);
    halt_forever();
}

extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: u64) {
    // CR2 holds the faulting virtual address.
    let cr2: u64;
    unsafe {
        asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }

    let mut con = render_banner(EXCEPTION_NAMES[14]);
    render_frame(&mut con, &frame);
    con.write("CR2   : ");
    con.write_hex64(cr2);
    con.write_char(b'\n');
    render_page_fault_error(&mut con, error_code);
    drop(con);
    halt_forever();
}

/// Vectors that push an error code and use the generic renderer. #PF is
/// handled separately; vector 8 (#DF) always pushes zero but pushes one
/// nonetheless.
fn pushes_error_code(vector: usize) -> bool {
    matches!(vector, 8 | 10 | 11 | 12 | 13 | 17)
}

/// Point vectors 0–31 at their handlers. Reserved vectors share the
/// no-error generic handler.
pub fn register_exceptions() {
    type Plain = extern "x86-interrupt" fn(InterruptStackFrame);
    type WithError = extern "x86-interrupt" fn(InterruptStackFrame, u64);

    let plain = |vector: usize, handler: Plain| {
        set_gate(vector, handler as usize as u64, gdt::KERNEL_CODE_SELECTOR, INT_GATE);
    };
    let with_error = |vector: usize, handler: WithError| {
        set_gate(vector, handler as usize as u64, gdt::KERNEL_CODE_SELECTOR, INT_GATE);
    };

    for vector in 0..32 {
        match vector {
            0 => plain(vector, divide_error),
            6 => plain(vector, invalid_opcode),
            14 => with_error(vector, page_fault),
            v if pushes_error_code(v) => with_error(vector, generic_with_error),
            _ => plain(vector, generic_no_error),
        }
    }
}

// ---------------------------------------------------------------------
// Hardware IRQs
// ---------------------------------------------------------------------

/// IRQ 0, the PIT tick. Fan-out first, EOI strictly last.
extern "x86-interrupt" fn irq0_timer(_frame: InterruptStackFrame) {
    crate::events::on_timer_tick();
    pic::eoi(0);
}

/// IRQ 1, PS/2 byte ready. Buffer it; translation happens in the idle
/// loop. EOI strictly last.
extern "x86-interrupt" fn irq1_keyboard(_frame: InterruptStackFrame) {
    keyboard::isr_scancode();
    pic::eoi(1);
}

/// Install the two hardware IRQ gates. Vectors 0x22–0x2F stay missing
/// until something claims them.
pub fn register_irqs() {
    set_gate(
        IRQ_BASE as usize,
        irq0_timer as usize as u64,
        gdt::KERNEL_CODE_SELECTOR,
        INT_GATE,
    );
    set_gate(
        IRQ_BASE as usize + 1,
        irq1_keyboard as usize as u64,
        gdt::KERNEL_CODE_SELECTOR,
        INT_GATE,
    );
}
