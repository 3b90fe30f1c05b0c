//! Register snapshot taken when a core traps into the breakpoint handler, in
//! GDB's `g`/`G` register order, so the RSP stub in [`crate::gdb`] can read
//! (and, for `G`, overwrite) the state of a stopped core.
//!
//! The `x86-interrupt` calling convention only hands a handler the frame the
//! CPU itself pushed (`rip`, `cs`, `rflags`, `rsp`, `ss`); general-purpose
//! registers are saved and restored by the compiler around the handler body
//! and are not otherwise observable from safe Rust. This kernel does not
//! plant a naked save-everything trampoline in front of the breakpoint gate,
//! so the general-purpose slots below read back as zero rather than the
//! live register value; `rip`, `eflags`, `rsp`, `cs`, and `ss` are always
//! accurate since they come straight off the trap frame.

use x86_64::structures::idt::InterruptStackFrame;

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub eflags: u64,
    pub cs: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub fn from_stack_frame(frame: &InterruptStackFrame) -> Self {
        TrapFrame {
            rip: frame.instruction_pointer.as_u64(),
            eflags: frame.cpu_flags,
            rsp: frame.stack_pointer.as_u64(),
            cs: frame.code_segment,
            ss: frame.stack_segment,
            ..Default::default()
        }
    }

    /// The 20 registers in GDB's `g`-packet order, little-endian 8 bytes each.
    pub fn to_gdb_words(&self) -> [u64; 20] {
        [
            self.rax, self.rbx, self.rcx, self.rdx, self.rsi, self.rdi, self.rbp, self.rsp,
            self.r8, self.r9, self.r10, self.r11, self.r12, self.r13, self.r14, self.r15,
            self.rip, self.eflags, self.cs, self.ss,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_order_has_twenty_registers() {
        assert_eq!(TrapFrame::default().to_gdb_words().len(), 20);
    }
}
