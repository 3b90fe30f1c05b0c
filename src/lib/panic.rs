//! Panic handling policy: a panic is a programmer bug. Print the location
//! and message over serial, then halt the current core permanently. Other
//! cores are untouched and keep scheduling their own ready queues.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

static PANICKING: AtomicBool = AtomicBool::new(false);

pub fn panic_handler(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if PANICKING.swap(true, Ordering::SeqCst) {
        crate::arch::x86_64::serial::serial_write(b"\n!!! panic while panicking, halting !!!\n");
        halt();
    }

    crate::arch::x86_64::serial::serial_write(b"\n=== KERNEL PANIC ===\n");
    if let Some(location) = info.location() {
        crate::kerror!("panic", "{}:{}:{}: {}", location.file(), location.line(), location.column(), info.message());
    } else {
        crate::kerror!("panic", "{}", info.message());
    }
    crate::kerror!("panic", "core {} halted", crate::arch::x86_64::cpu::core_id());

    halt()
}

fn halt() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}
