//! CPU feature detection and per-core identity.
//!
//! This kernel requires SSE2 (Rust's float ABI on x86_64 assumes it) and a
//! Local APIC (interrupt routing and IPIs go through it exclusively; there
//! is no legacy-PIC fallback path). Everything else CPUID reports is beyond
//! this kernel's scope.

use raw_cpuid::CpuId;
use x86_64::registers::control::{Cr0, Cr0Flags, Cr4, Cr4Flags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct CpuFeatures {
    pub vendor: CpuVendor,
    pub has_sse2: bool,
    pub has_apic: bool,
    pub has_x2apic: bool,
}

pub fn detect_cpu_features() -> CpuFeatures {
    let cpuid = CpuId::new();

    let vendor = match cpuid.get_vendor_info().as_ref().map(|v| v.as_str()) {
        Some("GenuineIntel") => CpuVendor::Intel,
        Some("AuthenticAMD") => CpuVendor::Amd,
        _ => CpuVendor::Unknown,
    };

    let features = cpuid.get_feature_info();
    CpuFeatures {
        vendor,
        has_sse2: features.as_ref().map_or(false, |f| f.has_sse2()),
        has_apic: features.as_ref().map_or(false, |f| f.has_apic()),
        has_x2apic: features.as_ref().map_or(false, |f| f.has_x2apic()),
    }
}

/// Enable the CPU features this kernel requires. Panics (a programmer bug,
/// per the error policy) if the hardware lacks SSE2 or an APIC.
pub fn enable_cpu_features() -> Result<(), &'static str> {
    let features = detect_cpu_features();
    if !features.has_sse2 {
        return Err("CPU lacks SSE2");
    }
    if !features.has_apic {
        return Err("CPU lacks a Local APIC");
    }

    unsafe {
        let mut cr0 = Cr0::read();
        cr0.remove(Cr0Flags::EMULATE_COPROCESSOR);
        cr0.insert(Cr0Flags::MONITOR_COPROCESSOR);
        Cr0::write(cr0);

        let mut cr4 = Cr4::read();
        cr4.insert(Cr4Flags::OSFXSR | Cr4Flags::OSXMMEXCPT_ENABLE);
        Cr4::write(cr4);
    }

    Ok(())
}

/// The APIC id of the core executing this call, used throughout the kernel
/// as the "core index" (0..MAX_CORES) for per-core log tags and per-core
/// scheduler/dispatcher state.
pub fn core_id() -> u32 {
    CpuId::new()
        .get_feature_info()
        .map(|f| f.initial_local_apic_id() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_does_not_panic() {
        let _ = detect_cpu_features();
    }
}
