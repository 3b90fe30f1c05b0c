//! Local APIC: per-core interrupt controller used for inter-processor
//! interrupts and, via [`crate::arch::x86_64::smp`], application-processor
//! bring-up.
//!
//! Both xAPIC (MMIO) and x2APIC (MSR) modes are supported; x2APIC is
//! preferred when the CPU advertises it. The LAPIC timer is masked at init
//! and never armed — this kernel's scheduler is cooperative, so the only
//! clock it needs is the PIT-calibrated tick driven through
//! [`crate::sched::bell`], and the only cross-core signaling is fixed-vector
//! IPIs (`send_ipi_all_but_self`, `send_ipi_to`) plus the INIT-SIPI sequence
//! SMP bring-up uses directly through [`LocalApic::send_ipi`].

use core::ptr::{read_volatile, write_volatile};
use raw_cpuid::CpuId;
use spin::Mutex;
use x86_64::VirtAddr;

const APIC_BASE_ADDR: u64 = 0xFEE00000;
const IA32_APIC_BASE: u32 = 0x1B;
const APIC_BASE_ENABLE: u64 = 1 << 11;
const APIC_BASE_X2APIC: u64 = 1 << 10;

const APIC_REG_ID: u32 = 0x020;
const APIC_REG_TPR: u32 = 0x080;
const APIC_REG_EOI: u32 = 0x0B0;
const APIC_REG_SPURIOUS: u32 = 0x0F0;
const APIC_REG_ICR_LOW: u32 = 0x300;
const APIC_REG_ICR_HIGH: u32 = 0x310;
const APIC_REG_LVT_TIMER: u32 = 0x320;
const APIC_REG_LVT_LINT0: u32 = 0x350;
const APIC_REG_LVT_LINT1: u32 = 0x360;
const APIC_REG_LVT_ERROR: u32 = 0x370;

const X2APIC_MSR_BASE: u32 = 0x800;

const APIC_SPURIOUS_ENABLE: u32 = 1 << 8;
const APIC_SPURIOUS_VECTOR: u32 = 0xFF;

const APIC_LVT_MASKED: u32 = 1 << 16;

const ICR_DELIVERY_MODE_FIXED: u32 = 0 << 8;
const ICR_DELIVERY_MODE_NMI: u32 = 4 << 8;
const ICR_DELIVERY_MODE_INIT: u32 = 5 << 8;
const ICR_DELIVERY_MODE_SIPI: u32 = 6 << 8;

const ICR_DEST_MODE_PHYSICAL: u32 = 0 << 11;

const ICR_LEVEL_ASSERT: u32 = 1 << 14;
const ICR_TRIGGER_LEVEL: u32 = 1 << 15;

const ICR_DEST_SHORTHAND_SELF: u32 = 1 << 18;
const ICR_DEST_SHORTHAND_ALL: u32 = 2 << 18;
const ICR_DEST_SHORTHAND_OTHERS: u32 = 3 << 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApicMode {
    Disabled,
    XApic,
    X2Apic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiType {
    Fixed(u8),
    Init,
    /// Page number is bits 19:12 of the startup address (`address >> 12`).
    Startup(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiDestination {
    Physical(u32),
    SelfOnly,
    AllIncludingSelf,
    AllExcludingSelf,
}

pub struct LocalApic {
    mode: ApicMode,
    base_addr: Option<VirtAddr>,
    apic_id: u32,
}

impl LocalApic {
    /// # Safety
    /// Must be called exactly once per core during boot.
    pub unsafe fn new() -> Result<Self, &'static str> {
        let mode = detect_apic_mode()?;

        let base_addr = match mode {
            ApicMode::XApic => Some(VirtAddr::new(APIC_BASE_ADDR)),
            ApicMode::X2Apic => None,
            ApicMode::Disabled => return Err("APIC not available"),
        };

        let mut apic = Self { mode, base_addr, apic_id: 0 };
        apic.init()?;
        Ok(apic)
    }

    unsafe fn init(&mut self) -> Result<(), &'static str> {
        match self.mode {
            ApicMode::XApic => self.init_xapic(),
            ApicMode::X2Apic => self.init_x2apic(),
            ApicMode::Disabled => Err("APIC disabled"),
        }
    }

    unsafe fn init_xapic(&mut self) -> Result<(), &'static str> {
        let mut apic_base = crate::arch::x86_64::rdmsr(IA32_APIC_BASE);
        apic_base |= APIC_BASE_ENABLE;
        crate::arch::x86_64::wrmsr(IA32_APIC_BASE, apic_base);

        self.apic_id = self.read_xapic(APIC_REG_ID) >> 24;

        self.write_xapic(APIC_REG_SPURIOUS, APIC_SPURIOUS_ENABLE | APIC_SPURIOUS_VECTOR);
        self.write_xapic(APIC_REG_LVT_TIMER, APIC_LVT_MASKED);
        self.write_xapic(APIC_REG_LVT_LINT0, APIC_LVT_MASKED);
        self.write_xapic(APIC_REG_LVT_LINT1, APIC_LVT_MASKED);
        self.write_xapic(APIC_REG_LVT_ERROR, APIC_LVT_MASKED);
        self.write_xapic(APIC_REG_TPR, 0);
        self.write_xapic(APIC_REG_EOI, 0);

        Ok(())
    }

    unsafe fn init_x2apic(&mut self) -> Result<(), &'static str> {
        let mut apic_base = crate::arch::x86_64::rdmsr(IA32_APIC_BASE);
        apic_base |= APIC_BASE_ENABLE | APIC_BASE_X2APIC;
        crate::arch::x86_64::wrmsr(IA32_APIC_BASE, apic_base);

        self.apic_id = crate::arch::x86_64::rdmsr(X2APIC_MSR_BASE + (APIC_REG_ID >> 4)) as u32;

        self.write_x2apic(APIC_REG_SPURIOUS, APIC_SPURIOUS_ENABLE | APIC_SPURIOUS_VECTOR);
        self.write_x2apic(APIC_REG_LVT_TIMER, APIC_LVT_MASKED);
        self.write_x2apic(APIC_REG_LVT_LINT0, APIC_LVT_MASKED);
        self.write_x2apic(APIC_REG_LVT_LINT1, APIC_LVT_MASKED);
        self.write_x2apic(APIC_REG_LVT_ERROR, APIC_LVT_MASKED);
        self.write_x2apic(APIC_REG_TPR, 0);
        self.write_x2apic(APIC_REG_EOI, 0);

        Ok(())
    }

    unsafe fn read_xapic(&self, offset: u32) -> u32 {
        let addr = self.base_addr.unwrap().as_u64() + offset as u64;
        read_volatile(addr as *const u32)
    }

    unsafe fn write_xapic(&self, offset: u32, value: u32) {
        let addr = self.base_addr.unwrap().as_u64() + offset as u64;
        write_volatile(addr as *mut u32, value);
    }

    unsafe fn write_x2apic(&self, offset: u32, value: u32) {
        let msr = X2APIC_MSR_BASE + (offset >> 4);
        crate::arch::x86_64::wrmsr(msr, value as u64);
    }

    /// # Safety
    /// Must be called exactly once per handled interrupt.
    pub unsafe fn eoi(&self) {
        match self.mode {
            ApicMode::XApic => self.write_xapic(APIC_REG_EOI, 0),
            ApicMode::X2Apic => self.write_x2apic(APIC_REG_EOI, 0),
            ApicMode::Disabled => {}
        }
    }

    pub fn id(&self) -> u32 {
        self.apic_id
    }

    pub fn mode(&self) -> ApicMode {
        self.mode
    }

    /// # Safety
    /// For `Fixed`, the destination core must have a gate registered for
    /// the vector. For `Init`/`Startup`, the destination core is reset.
    pub unsafe fn send_ipi(&self, destination: IpiDestination, ipi_type: IpiType) {
        let mut icr_low: u32 = 0;
        let mut dest_apic_id: u32 = 0;

        match ipi_type {
            IpiType::Fixed(vector) => {
                icr_low |= ICR_DELIVERY_MODE_FIXED;
                icr_low |= vector as u32;
            }
            IpiType::Init => {
                icr_low |= ICR_DELIVERY_MODE_INIT;
                icr_low |= ICR_TRIGGER_LEVEL | ICR_LEVEL_ASSERT;
            }
            IpiType::Startup(page) => {
                icr_low |= ICR_DELIVERY_MODE_SIPI;
                icr_low |= page as u32;
            }
        }

        match destination {
            IpiDestination::Physical(apic_id) => {
                icr_low |= ICR_DEST_MODE_PHYSICAL;
                dest_apic_id = apic_id;
            }
            IpiDestination::SelfOnly => icr_low |= ICR_DEST_SHORTHAND_SELF,
            IpiDestination::AllIncludingSelf => icr_low |= ICR_DEST_SHORTHAND_ALL,
            IpiDestination::AllExcludingSelf => icr_low |= ICR_DEST_SHORTHAND_OTHERS,
        }

        match self.mode {
            ApicMode::XApic => {
                self.write_xapic(APIC_REG_ICR_HIGH, dest_apic_id << 24);
                self.write_xapic(APIC_REG_ICR_LOW, icr_low);
            }
            ApicMode::X2Apic => {
                let icr = ((dest_apic_id as u64) << 32) | (icr_low as u64);
                let msr = X2APIC_MSR_BASE + (APIC_REG_ICR_LOW >> 4);
                crate::arch::x86_64::wrmsr(msr, icr);
            }
            ApicMode::Disabled => {}
        }
    }
}

pub static LOCAL_APIC: Mutex<Option<LocalApic>> = Mutex::new(None);

fn detect_apic_mode() -> Result<ApicMode, &'static str> {
    let cpuid = CpuId::new();
    let features = cpuid.get_feature_info().ok_or("no CPUID feature info")?;

    if !features.has_apic() {
        return Ok(ApicMode::Disabled);
    }

    if features.has_x2apic() {
        Ok(ApicMode::X2Apic)
    } else {
        Ok(ApicMode::XApic)
    }
}

/// # Safety
/// Must run once per core during boot.
pub unsafe fn init() -> Result<(), &'static str> {
    let apic = LocalApic::new()?;

    let mode_str = match apic.mode() {
        ApicMode::XApic => "xAPIC (memory-mapped)",
        ApicMode::X2Apic => "x2APIC (MSR-based)",
        ApicMode::Disabled => "disabled",
    };
    crate::klog!(crate::lib::printk::LogLevel::Info, "apic", "mode {} id {}", mode_str, apic.id());

    *LOCAL_APIC.lock() = Some(apic);
    Ok(())
}

/// # Safety
/// Must be called exactly once per handled interrupt.
pub unsafe fn eoi() {
    if let Some(apic) = LOCAL_APIC.lock().as_ref() {
        apic.eoi();
    }
}

pub fn local_apic_id() -> u32 {
    LOCAL_APIC.lock().as_ref().map(|apic| apic.id()).unwrap_or(0)
}

pub fn get() -> Option<spin::MutexGuard<'static, Option<LocalApic>>> {
    Some(LOCAL_APIC.lock())
}

/// Sends a fixed-vector IPI to every core except the caller. Used by the
/// assassin (kill requests) and the scheduler (reschedule requests).
pub fn send_ipi_all_but_self(vector: u8) {
    if let Some(apic) = LOCAL_APIC.lock().as_ref() {
        unsafe {
            apic.send_ipi(IpiDestination::AllExcludingSelf, IpiType::Fixed(vector));
        }
    }
}

/// Sends a fixed-vector IPI to one core by APIC id. Used by the GDB stub's
/// stop-the-world before it touches machine state.
pub fn send_ipi_to(apic_id: u32, vector: u8) {
    if let Some(apic) = LOCAL_APIC.lock().as_ref() {
        unsafe {
            apic.send_ipi(IpiDestination::Physical(apic_id), IpiType::Fixed(vector));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apic_mode_is_detected_as_xapic_or_x2apic() {
        let mode = detect_apic_mode().unwrap();
        assert!(mode == ApicMode::XApic || mode == ApicMode::X2Apic);
    }
}
