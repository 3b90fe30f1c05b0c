//! The context-switch contract: callee-saved registers plus stack and
//! instruction pointer, per the System V AMD64 ABI. This is the one
//! `unsafe extern "C"` routine in the whole kernel that the Rust compiler
//! is not allowed to reason about across the call — everything needed to
//! resume `next` must already be on its stack or in `*next`.

use core::arch::global_asm;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuContext {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl CpuContext {
    pub const fn new() -> Self {
        Self { rbx: 0, rbp: 0, r12: 0, r13: 0, r14: 0, r15: 0, rsp: 0, rip: 0, rflags: 0 }
    }
}

extern "C" {
    /// Saves the running thread's callee-saved registers into `*prev`, then
    /// restores `*next` and jumps to its `rip`. Never returns to its
    /// caller in the usual sense — the next time this stack runs, it is
    /// because some other `context_switch` call switched back into it.
    pub fn context_switch(prev: *mut CpuContext, next: *const CpuContext);
}

global_asm!(
    r#"
.global context_switch
context_switch:
    pushfq
    pop rax
    mov [rdi + 0x40], rax      // prev->rflags
    mov [rdi + 0x00], rbx
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], r12
    mov [rdi + 0x18], r13
    mov [rdi + 0x20], r14
    mov [rdi + 0x28], r15
    mov [rdi + 0x30], rsp      // prev->rsp
    lea rax, [rip + 1f]
    mov [rdi + 0x38], rax      // prev->rip (resume point on next switch-in)

    mov rbx, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    mov r12, [rsi + 0x10]
    mov r13, [rsi + 0x18]
    mov r14, [rsi + 0x20]
    mov r15, [rsi + 0x28]
    mov rsp, [rsi + 0x30]
    mov rax, [rsi + 0x40]
    push rax
    popfq
    jmp qword ptr [rsi + 0x38]
1:
    ret
"#
);
