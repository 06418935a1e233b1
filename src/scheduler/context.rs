#[cfg(target_os = "none")]
use core::arch::naked_asm;

/// Callee-saved registers of a suspended kernel flow.
///
/// Every primitive below saves `rip` as the address of a bare `ret`, so a
/// flow resumed from here returns to whoever called the primitive that
/// suspended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SavedExecutionContext {
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl SavedExecutionContext {
    pub const fn empty() -> Self {
        SavedExecutionContext {
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rip == 0
    }
}

/// Save the running flow into `old` and continue the one saved in `new`.
///
/// # Safety
/// `new` must have been filled by one of the primitives in this module and
/// its stack must still be intact.
#[cfg(target_os = "none")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(old: *mut SavedExecutionContext, new: *const SavedExecutionContext) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "jmp [rsi + 0x38]",

        "2:",
        "ret",
    );
}

/// Save the running flow into `save` and drop to ring 3 at `entry` with
/// interrupts enabled. Returns the exit status handed to [`resume_context`]
/// when the launched process halts.
///
/// # Safety
/// The program window must be mapped and the TSS must name the new process's
/// kernel stack.
#[cfg(target_os = "none")]
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user_mode(
    save: *mut SavedExecutionContext,
    entry: u64,
    user_stack: u64,
    user_cs: u64,
    user_ss: u64,
) -> u64 {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        // iretq frame: SS, RSP, RFLAGS (IF set), CS, RIP
        "push r8",
        "push rdx",
        "pushfq",
        "or qword ptr [rsp], 0x200",
        "push rcx",
        "push rsi",
        "iretq",

        "2:",
        "ret",
    );
}

/// Continue the flow saved in `context`, making its suspended call return `status`.
///
/// # Safety
/// Same as [`switch_context`]. The current stack is abandoned.
#[cfg(target_os = "none")]
#[unsafe(naked)]
pub unsafe extern "C" fn resume_context(context: *const SavedExecutionContext, status: u64) -> ! {
    naked_asm!(
        "mov rax, rsi",
        "mov rsp, [rdi + 0x00]",
        "mov rbp, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov r13, [rdi + 0x20]",
        "mov r14, [rdi + 0x28]",
        "mov r15, [rdi + 0x30]",
        "jmp [rdi + 0x38]",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_offsets_match_the_assembly() {
        assert_eq!(core::mem::size_of::<SavedExecutionContext>(), 0x40);
        assert_eq!(core::mem::offset_of!(SavedExecutionContext, rsp), 0x00);
        assert_eq!(core::mem::offset_of!(SavedExecutionContext, r15), 0x30);
        assert_eq!(core::mem::offset_of!(SavedExecutionContext, rip), 0x38);
        assert!(SavedExecutionContext::empty().is_empty());
    }
}
