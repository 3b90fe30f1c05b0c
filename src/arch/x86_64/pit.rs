//! Intel 8253/8254 Programmable Interval Timer.
//!
//! Channel 0 (IRQ0, ports 0x40/0x43) is the only channel this kernel drives.
//! It exists for one reason: to run at a known frequency for a short,
//! interrupt-free window during boot so the Local APIC timer can be
//! calibrated against it. Once that calibration is done the LAPIC timer
//! takes over driving the bell-ringer tick and the PIT is left free-running
//! but otherwise ignored.

use x86_64::instructions::port::Port;

/// PIT input clock, in Hz.
pub const PIT_FREQUENCY: u32 = 1_193_182;

const CHANNEL0: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Programs channel 0 for periodic interrupts (mode 3, square wave) at the
/// given frequency.
///
/// # Safety
/// Must run with interrupts disabled and before IRQ0 is unmasked.
pub unsafe fn init(frequency: u32) {
    let divisor = PIT_FREQUENCY / frequency;
    assert!(divisor != 0 && divisor <= 0xFFFF, "PIT divisor {} out of range", divisor);

    Port::<u8>::new(COMMAND).write(0x36);
    Port::<u8>::new(CHANNEL0).write((divisor & 0xFF) as u8);
    Port::<u8>::new(CHANNEL0).write((divisor >> 8) as u8);
}

/// Busy-waits for approximately `us` microseconds by reprogramming channel 0
/// into one-shot mode and polling its OUT status. Only ever used during the
/// boot-time LAPIC calibration window, with interrupts disabled.
///
/// # Safety
/// Leaves channel 0 back in one-shot mode; the caller must reprogram it with
/// [`init`] before relying on periodic IRQ0 again.
pub unsafe fn delay_us(us: u32) {
    let mut ticks = ((us as u64 * PIT_FREQUENCY as u64) / 1_000_000) as u32;
    if ticks == 0 {
        return;
    }
    while ticks > 0 {
        let chunk = core::cmp::min(ticks, 0xFFFF);
        delay_ticks(chunk as u16);
        ticks -= chunk;
    }
}

unsafe fn delay_ticks(ticks: u16) {
    Port::<u8>::new(COMMAND).write(0x30); // channel 0, lobyte/hibyte, mode 0
    Port::<u8>::new(CHANNEL0).write((ticks & 0xFF) as u8);
    Port::<u8>::new(CHANNEL0).write((ticks >> 8) as u8);
    loop {
        Port::<u8>::new(COMMAND).write(0xE2); // read-back status, channel 0
        let status: u8 = Port::<u8>::new(CHANNEL0).read();
        if status & 0x80 != 0 {
            break;
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_for_1khz_matches_datasheet() {
        assert_eq!(PIT_FREQUENCY / 1000, 1193);
    }
}
