#![no_std]
#![no_main]
#![feature(alloc_error_handler)]
#![feature(abi_x86_interrupt)]

//! Entry point and boot sequencing. Mirrors the order documented in
//! `arch::x86_64::boot`: serial, then the CPU execution environment, then
//! interrupt dispatch and the heap, then the scheduler, timers, block
//! device, filesystem, and GDB stub — each of the latter needs the heap
//! the earlier phases don't.

extern crate alloc;

#[allow(special_module_name)]
pub mod lib;
pub mod config;
pub mod sync;
pub mod interrupt;
pub mod thread;
pub mod sched;
pub mod gdb;
pub mod block;
pub mod fs;
pub mod arch;

use arch::x86_64::{apic, boot, idt, pit, serial, smp};
use fs::minix::Minix;
use fs::Vfs;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    lib::panic::panic_handler(info)
}

/// Unwinding is unreachable under `panic = "abort"`; this stub only
/// satisfies the linker reference the prebuilt `alloc` sysroot carries.
#[no_mangle]
extern "C" fn rust_eh_personality() {}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    unsafe {
        if let Err(e) = boot::early_init() {
            serial::serial_write(b"\n[FATAL] boot failed: ");
            serial::serial_write(e.as_bytes());
            serial::serial_write(b"\n");
            boot::halt_forever();
        }
    }

    if let Err(e) = boot::validate_hardware() {
        crate::kerror!("boot", "hardware validation failed: {}", e);
        unsafe { boot::halt_forever() };
    }

    lib::heap::init();
    crate::kinfo!("boot", "heap ready");

    unsafe {
        if let Err(e) = apic::init() {
            crate::kerror!("boot", "apic init failed: {}", e);
            boot::halt_forever();
        }
        pit::init(1000);
    }

    arm_interrupt_dispatch();
    x86_64::instructions::interrupts::enable();
    crate::kinfo!("boot", "interrupts armed on core {}", arch::x86_64::cpu::core_id());

    let booted_aps = unsafe { smp::boot_aps() };
    crate::kinfo!("boot", "{} application processor(s) started", booted_aps);

    let vfs = mount_root_filesystem();
    crate::kinfo!("boot", "minix filesystem mounted");

    spawn_init_thread(vfs);

    loop {
        thread::dispatcher::reschedule();
    }
}

fn arm_interrupt_dispatch() {
    interrupt::register(idt::PIT_VECTOR, &interrupt::gates::PIT_GATE);
    interrupt::register(idt::TIMER_VECTOR, &interrupt::gates::TIMER_GATE);
    interrupt::register(idt::SERIAL_VECTOR, &interrupt::gates::SERIAL_GATE);
    interrupt::register(idt::ATA_VECTOR, &interrupt::gates::ATA_GATE);
    interrupt::register(thread::assassin::KILL_VECTOR, &thread::assassin::ASSASSIN_GATE);
}

/// Boots off a RAM disk pre-seeded with a Minix image when one is linked
/// in; otherwise mounts (and formats on first touch) an empty in-memory
/// disk, which is enough for the GDB stub and scheduler demos to exercise
/// the filesystem without real hardware.
fn mount_root_filesystem() -> alloc::sync::Arc<Vfs> {
    let disk = alloc::boxed::Box::new(block::ramdisk::RamDisk::new(16 * 1024));
    let fs = match Minix::mount(disk) {
        Ok(fs) => fs,
        Err(e) => {
            crate::kerror!("boot", "minix mount failed: {:?}, halting", e);
            unsafe { boot::halt_forever() };
        }
    };
    match Vfs::new(fs) {
        Ok(vfs) => alloc::sync::Arc::new(vfs),
        Err(e) => {
            crate::kerror!("boot", "vfs init failed: {:?}, halting", e);
            unsafe { boot::halt_forever() };
        }
    }
}

fn spawn_init_thread(vfs: alloc::sync::Arc<Vfs>) {
    let thread = thread::Thread::new(move || {
        let _ = &vfs;
        crate::kinfo!("init", "init thread running on core {}", arch::x86_64::cpu::core_id());
    });
    sched::scheduler::ready(alloc::boxed::Box::leak(thread));
}
