//! Interrupt Descriptor Table: exceptions 0-31 as panics (per the error
//! policy — a CPU exception with no recovery path stops the core), and a
//! handful of hardware/IPI vectors that trampoline into
//! [`crate::interrupt::dispatch`].

use crate::arch::x86_64::tss::{DOUBLE_FAULT_IST_INDEX, MACHINE_CHECK_IST_INDEX, NMI_IST_INDEX};
use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

/// PIT heartbeat, used only to calibrate the LAPIC timer during boot.
pub const PIT_VECTOR: u8 = 0x20;
/// LAPIC periodic timer, drives the bell-ringer tick.
pub const TIMER_VECTOR: u8 = 0x30;
/// COM1 IRQ4, used by the GDB stub to notice an incoming `$` without
/// polling the UART from a hot loop.
pub const SERIAL_VECTOR: u8 = 0x24;
/// Primary ATA controller, IRQ14.
pub const ATA_VECTOR: u8 = 0x2E;
/// Cross-core reschedule request.
pub const RESCHED_VECTOR: u8 = 0xF2;
pub const SPURIOUS_VECTOR: u8 = 0xFF;

extern "x86-interrupt" fn stop_gate(_stack_frame: InterruptStackFrame) {
    unsafe {
        crate::arch::x86_64::apic::eoi();
    }
    crate::gdb::park_until_resumed();
}

macro_rules! hardware_gate {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
            crate::interrupt::dispatch($vector);
            unsafe {
                crate::arch::x86_64::apic::eoi();
            }
        }
    };
}

hardware_gate!(pit_gate, PIT_VECTOR);
hardware_gate!(timer_gate, TIMER_VECTOR);
hardware_gate!(serial_gate, SERIAL_VECTOR);
hardware_gate!(ata_gate, ATA_VECTOR);
hardware_gate!(kill_ipi_gate, crate::thread::assassin::KILL_VECTOR);
hardware_gate!(resched_ipi_gate, RESCHED_VECTOR);

extern "x86-interrupt" fn spurious_gate(_stack_frame: InterruptStackFrame) {
    // No EOI required for the spurious vector.
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(exception_de);
        idt.debug.set_handler_fn(exception_db);
        idt.non_maskable_interrupt.set_handler_fn(exception_nmi);
        idt.breakpoint.set_handler_fn(exception_bp);
        idt.overflow.set_handler_fn(exception_of);
        idt.bound_range_exceeded.set_handler_fn(exception_br);
        idt.invalid_opcode.set_handler_fn(exception_ud);
        idt.device_not_available.set_handler_fn(exception_nm);
        unsafe {
            idt.double_fault.set_handler_fn(exception_df).set_stack_index(DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(exception_ts);
        idt.segment_not_present.set_handler_fn(exception_np);
        idt.stack_segment_fault.set_handler_fn(exception_ss);
        idt.general_protection_fault.set_handler_fn(exception_gp);
        idt.page_fault.set_handler_fn(exception_pf);
        idt.x87_floating_point.set_handler_fn(exception_mf);
        idt.alignment_check.set_handler_fn(exception_ac);
        unsafe {
            idt.machine_check.set_handler_fn(exception_mc).set_stack_index(MACHINE_CHECK_IST_INDEX);
        }
        idt.simd_floating_point.set_handler_fn(exception_xm);
        idt.virtualization.set_handler_fn(exception_ve);
        let _ = NMI_IST_INDEX; // NMI has no dedicated IST on this table; reserved for future use

        idt[PIT_VECTOR as usize].set_handler_fn(pit_gate);
        idt[TIMER_VECTOR as usize].set_handler_fn(timer_gate);
        idt[SERIAL_VECTOR as usize].set_handler_fn(serial_gate);
        idt[ATA_VECTOR as usize].set_handler_fn(ata_gate);
        idt[crate::thread::assassin::KILL_VECTOR as usize].set_handler_fn(kill_ipi_gate);
        idt[RESCHED_VECTOR as usize].set_handler_fn(resched_ipi_gate);
        idt[crate::gdb::STOP_VECTOR as usize].set_handler_fn(stop_gate);
        idt[SPURIOUS_VECTOR as usize].set_handler_fn(spurious_gate);

        idt
    };
}

/// # Safety
/// Must run during early boot, after GDT/TSS are loaded.
pub unsafe fn init_idt() {
    IDT.load();
}

extern "x86-interrupt" fn exception_de(f: InterruptStackFrame) {
    panic!("#DE divide error\n{:#?}", f);
}
extern "x86-interrupt" fn exception_db(f: InterruptStackFrame) {
    panic!("#DB debug exception\n{:#?}", f);
}
extern "x86-interrupt" fn exception_nmi(f: InterruptStackFrame) {
    panic!("NMI\n{:#?}", f);
}
extern "x86-interrupt" fn exception_bp(f: InterruptStackFrame) {
    // Recoverable: this is the breakpoint the GDB stub plants with `Z0`.
    crate::gdb::on_breakpoint(&f);
}
extern "x86-interrupt" fn exception_of(f: InterruptStackFrame) {
    panic!("#OF overflow\n{:#?}", f);
}
extern "x86-interrupt" fn exception_br(f: InterruptStackFrame) {
    panic!("#BR bound range exceeded\n{:#?}", f);
}
extern "x86-interrupt" fn exception_ud(f: InterruptStackFrame) {
    panic!("#UD invalid opcode\n{:#?}", f);
}
extern "x86-interrupt" fn exception_nm(f: InterruptStackFrame) {
    panic!("#NM device not available\n{:#?}", f);
}
extern "x86-interrupt" fn exception_df(f: InterruptStackFrame, error_code: u64) -> ! {
    panic!("#DF double fault (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_ts(f: InterruptStackFrame, error_code: u64) {
    panic!("#TS invalid tss (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_np(f: InterruptStackFrame, error_code: u64) {
    panic!("#NP segment not present (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_ss(f: InterruptStackFrame, error_code: u64) {
    panic!("#SS stack segment fault (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_gp(f: InterruptStackFrame, error_code: u64) {
    panic!("#GP general protection fault (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_pf(f: InterruptStackFrame, error_code: PageFaultErrorCode) {
    use x86_64::registers::control::Cr2;
    let addr = Cr2::read();
    panic!("#PF page fault at {:#x} ({:?})\n{:#?}", addr, error_code, f);
}
extern "x86-interrupt" fn exception_mf(f: InterruptStackFrame) {
    panic!("#MF x87 fpu error\n{:#?}", f);
}
extern "x86-interrupt" fn exception_ac(f: InterruptStackFrame, error_code: u64) {
    panic!("#AC alignment check (error_code={:#x})\n{:#?}", error_code, f);
}
extern "x86-interrupt" fn exception_mc(f: InterruptStackFrame) -> ! {
    panic!("#MC machine check\n{:#?}", f);
}
extern "x86-interrupt" fn exception_xm(f: InterruptStackFrame) {
    panic!("#XM simd floating point\n{:#?}", f);
}
extern "x86-interrupt" fn exception_ve(f: InterruptStackFrame) {
    panic!("#VE virtualization exception\n{:#?}", f);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idt_builds() {
        let _ = &*IDT;
    }
}
