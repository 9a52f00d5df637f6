//! 8254 PIT, channel 0: the system tick.
//!
//! The chip counts down from a divisor at 1,193,182 Hz (a twelfth of
//! the IBM PC's 14.31818 MHz crystal) and pulses IRQ 0 each time it
//! reloads, so interrupt rate = base / divisor.

use super::port::outb;

const CHANNEL_0: u16 = 0x40;
const COMMAND: u16 = 0x43;

const PIT_FREQUENCY: u32 = 1_193_182;

/// Program channel 0 for a periodic interrupt at `hz`. Rates below the
/// 16-bit divisor floor (~19 Hz) clamp to the hardware maximum; 0 is
/// rejected outright.
pub fn set_frequency(hz: u32) {
    if hz == 0 {
        return;
    }
    let divisor = PIT_FREQUENCY / hz;
    // A divisor of 0 means 65536 to the chip; anything larger than
    // 16 bits has to clamp there.
    let divisor = if divisor > 0xFFFF { 0 } else { divisor as u16 };

    unsafe {
        // 0x36: channel 0, lobyte/hibyte access, mode 3, binary.
        outb(COMMAND, 0x36);
        outb(CHANNEL_0, divisor as u8);
        outb(CHANNEL_0, (divisor >> 8) as u8);
    }

    log::info!("pit: channel 0 at {} Hz", hz);
}
