//! 16550 UART driver for COM1.
//!
//! Serial is the kernel's only console: [`crate::lib::printk`] formats every
//! log line through [`serial_write`], the GDB stub's packet layer reads and
//! writes raw bytes through [`serial_read`]/[`serial_write_byte`], and the
//! panic handler falls back to [`serial_write`] directly since it can't
//! assume the logging machinery still works.

use uart_16550::SerialPort;
use spin::Mutex;
use lazy_static::lazy_static;

/// COM1 base I/O port.
pub const COM1_PORT: u16 = 0x3F8;

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(COM1_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

/// # Safety
/// Must run during early boot, before any serial output is attempted.
pub unsafe fn init_serial() -> Result<(), &'static str> {
    let _ = &*SERIAL1;
    Ok(())
}

/// Blocks until the UART is ready to accept the byte.
pub fn serial_write_byte(byte: u8) {
    SERIAL1.lock().send(byte);
}

pub fn serial_write(s: &[u8]) {
    for &byte in s {
        serial_write_byte(byte);
    }
}

/// Returns `None` if no byte is waiting; never blocks.
pub fn serial_read() -> Option<u8> {
    Some(SERIAL1.lock().receive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_does_not_panic() {
        serial_write(b"test message\n");
    }
}
