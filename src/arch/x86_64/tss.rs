//! Task State Segment: in long mode this is reduced to the Interrupt Stack
//! Table, dedicated stacks the CPU switches to automatically for exceptions
//! that must never run on a stack that might itself be the problem.
//!
//! Double fault gets one because a double fault with no working stack is a
//! triple fault (CPU reset); machine check gets one because it can fire with
//! the kernel stack in an arbitrary state. NMI has an index reserved in
//! [`idt`](super::idt) but isn't wired to a stack here — see the comment at
//! its use site.

use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;
use lazy_static::lazy_static;

pub const IST_STACK_SIZE: usize = 16 * 1024;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;
pub const NMI_IST_INDEX: u16 = 1;
pub const MACHINE_CHECK_IST_INDEX: u16 = 2;

#[repr(align(16))]
struct Stack([u8; IST_STACK_SIZE]);

impl Stack {
    const fn new() -> Self {
        Stack([0; IST_STACK_SIZE])
    }
}

static mut DOUBLE_FAULT_STACK: Stack = Stack::new();
static mut NMI_STACK: Stack = Stack::new();
static mut MACHINE_CHECK_STACK: Stack = Stack::new();

lazy_static! {
    pub static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();

        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            let stack_start = VirtAddr::from_ptr(unsafe { &DOUBLE_FAULT_STACK });
            stack_start + IST_STACK_SIZE
        };
        tss.interrupt_stack_table[NMI_IST_INDEX as usize] = {
            let stack_start = VirtAddr::from_ptr(unsafe { &NMI_STACK });
            stack_start + IST_STACK_SIZE
        };
        tss.interrupt_stack_table[MACHINE_CHECK_IST_INDEX as usize] = {
            let stack_start = VirtAddr::from_ptr(unsafe { &MACHINE_CHECK_STACK });
            stack_start + IST_STACK_SIZE
        };

        tss
    };
}

/// # Safety
/// Must run once per core, after the GDT is loaded.
pub unsafe fn init_tss() {
    let _ = &*TSS;
}

#[cfg(debug_assertions)]
pub fn validate_tss() -> Result<(), &'static str> {
    let df_stack = TSS.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize];
    if df_stack.is_null() || df_stack.as_u64() % 16 != 0 {
        return Err("double fault IST stack is missing or misaligned");
    }

    let nmi_stack = TSS.interrupt_stack_table[NMI_IST_INDEX as usize];
    if nmi_stack.is_null() || nmi_stack.as_u64() % 16 != 0 {
        return Err("NMI IST stack is missing or misaligned");
    }

    let mc_stack = TSS.interrupt_stack_table[MACHINE_CHECK_IST_INDEX as usize];
    if mc_stack.is_null() || mc_stack.as_u64() % 16 != 0 {
        return Err("machine check IST stack is missing or misaligned");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_properly_sized_and_aligned() {
        let stack = Stack::new();
        assert_eq!(core::mem::size_of::<Stack>(), IST_STACK_SIZE);
        assert_eq!(&stack as *const _ as usize % 16, 0);
    }

    #[test]
    fn ist_entries_are_populated() {
        let tss = &*TSS;
        assert!(!tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize].is_null());
        assert!(!tss.interrupt_stack_table[NMI_IST_INDEX as usize].is_null());
        assert!(!tss.interrupt_stack_table[MACHINE_CHECK_IST_INDEX as usize].is_null());
    }
}
