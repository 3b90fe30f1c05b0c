//! Early architecture bring-up, run once by the bootstrap processor before
//! the rest of the kernel starts threads.
//!
//! Order matches the boot sequence this kernel commits to: serial first (so
//! every later step can log), then the CPU execution environment (GDT/TSS/
//! IDT), then interrupt controllers and CPU feature detection, then the Big
//! Kernel Lock and interrupt dispatch get armed and interrupts turn on. The
//! scheduler, timers, block device, filesystem, and GDB stub are brought up
//! afterward by `main`, since they need the heap allocator this module does
//! not own.

use crate::arch::x86_64::{cpu, gdt, idt, serial, tss};

/// # Safety
/// Must be the first Rust code to run, with interrupts disabled, a valid
/// stack, and the CPU already in 64-bit long mode with paging enabled.
pub unsafe fn early_init() -> Result<(), &'static str> {
    x86_64::instructions::interrupts::disable();

    gdt::init_gdt();
    tss::init_tss();
    idt::init_idt();

    cpu::enable_cpu_features()?;
    serial::init_serial()?;

    #[cfg(debug_assertions)]
    tss::validate_tss()?;

    Ok(())
}

/// Checks the CPU features this kernel has no fallback path for.
pub fn validate_hardware() -> Result<(), &'static str> {
    let features = cpu::detect_cpu_features();
    if !features.has_sse2 {
        return Err("CPU does not support SSE2");
    }
    if !features.has_apic {
        return Err("CPU does not support APIC");
    }
    Ok(())
}

pub fn halt_forever() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_hardware_passes_on_test_host() {
        assert!(validate_hardware().is_ok());
    }
}
