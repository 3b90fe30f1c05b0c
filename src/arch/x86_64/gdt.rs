//! Global Descriptor Table.
//!
//! Segmentation is flat in long mode, but the CPU still needs a GDT with a
//! valid code segment and a TSS descriptor to run at all: `lgdt` sets up the
//! table, `ltr` points the CPU at the TSS so double-fault/machine-check
//! exceptions can switch onto their IST stacks. This kernel never drops to
//! ring 3, so there is nothing here beyond the ring-0 segments and the TSS.

use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::instructions::tables::load_tss;
use x86_64::instructions::segmentation::{Segment, CS, DS, ES, FS, GS, SS};
use lazy_static::lazy_static;

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code_selector = gdt.add_entry(Descriptor::kernel_code_segment());
        let kernel_data_selector = gdt.add_entry(Descriptor::kernel_data_segment());
        let tss_selector = gdt.add_entry(Descriptor::tss_segment(&super::tss::TSS));

        (gdt, Selectors { kernel_code_selector, kernel_data_selector, tss_selector })
    };
}

struct Selectors {
    kernel_code_selector: SegmentSelector,
    kernel_data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

/// # Safety
/// Must run exactly once per core during early boot, with interrupts
/// disabled.
pub unsafe fn init_gdt() {
    GDT.0.load();

    CS::set_reg(GDT.1.kernel_code_selector);
    DS::set_reg(GDT.1.kernel_data_selector);
    ES::set_reg(GDT.1.kernel_data_selector);
    SS::set_reg(GDT.1.kernel_data_selector);
    FS::set_reg(GDT.1.kernel_data_selector);
    GS::set_reg(GDT.1.kernel_data_selector);

    load_tss(GDT.1.tss_selector);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_segments_carry_ring_zero() {
        assert_eq!(GDT.1.kernel_code_selector.rpl(), 0);
        assert_eq!(GDT.1.kernel_data_selector.rpl(), 0);
        assert_eq!(GDT.1.tss_selector.rpl(), 0);
    }
}
