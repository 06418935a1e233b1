/// Ring 3 plumbing: the int 0x80 entry stub and the code that carries out a
/// [`Transfer`] once the kernel lock has been dropped.

use core::arch::naked_asm;

use super::gdt;
use crate::kernel::with_kernel;
use crate::scheduler::context::{enter_user_mode, resume_context, switch_context};
use crate::syscalls::{SaveSlot, SyscallError, Transfer};

/// The int 0x80 handler, entered from Ring 3.
/// Saves user registers, calls the Rust syscall dispatcher, restores and iretq back.
///
/// Convention: RAX=syscall number, RDI=arg0, RSI=arg1, RDX=arg2
/// Returns: RAX=result
#[unsafe(naked)]
pub extern "C" fn syscall_handler_asm() {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbx",
        "push rcx",

        // 5 qwords from the CPU plus 14 pushed here leave rsp 8 bytes off a 16-byte boundary.
        "sub rsp, 8",

        // dispatch(number, arg0, arg1, arg2) in System V order
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "call {dispatch}",

        "add rsp, 8",

        // RAX carries the result back to the caller.
        "pop rcx",
        "pop rbx",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",

        "iretq",
        dispatch = sym crate::syscalls::dispatch,
    );
}

fn save_slot(slot: SaveSlot) -> Option<*mut crate::scheduler::context::SavedExecutionContext> {
    with_kernel(|kernel, _| kernel.save_slot(slot).ok_or(SyscallError::InvalidArgument)).ok()
}

/// Carry out `transfer`. Must run with interrupts disabled and without the
/// kernel lock held.
///
/// Returns the value the interrupted flow should see: the child's exit status
/// for a launch made by `execute`, 0 otherwise. `Resume` and `Idle` never return.
pub fn perform(transfer: Transfer) -> u64 {
    match transfer {
        Transfer::Stay => 0,
        Transfer::Launch(launch) => {
            let Some(save) = save_slot(launch.save) else {
                crate::log_error!("usermode: no save slot for pid {}", launch.pid.0);
                return crate::syscalls::SYSCALL_FAILED;
            };
            unsafe {
                enter_user_mode(
                    save,
                    launch.entry.as_u64(),
                    launch.user_stack.as_u64(),
                    u64::from(gdt::user_code_selector().0),
                    u64::from(gdt::user_data_selector().0),
                )
            }
        }
        Transfer::Resume { context, status } => unsafe { resume_context(&context, u64::from(status)) },
        Transfer::Switch { from, to } => {
            let (Some(old), Some(new)) = (save_slot(SaveSlot::Terminal(from)), save_slot(SaveSlot::Terminal(to)))
            else {
                return 0;
            };
            // `tick` only picks terminals whose flow is parked.
            if unsafe { (*new).is_empty() } {
                panic!("switch to terminal {} with no parked flow", to.0);
            }
            unsafe { switch_context(old, new) };
            0
        }
        Transfer::Idle => loop {
            x86_64::instructions::interrupts::enable_and_hlt();
        },
    }
}
