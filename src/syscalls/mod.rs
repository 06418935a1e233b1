pub mod files;
pub mod lifecycle;

use core::fmt;

use x86_64::VirtAddr;

use crate::drivers::tty::TerminalId;
use crate::fs::FsError;
use crate::process::ProcessId;
use crate::scheduler::context::SavedExecutionContext;

/// Syscall numbers (passed in RAX from userland).
pub const SYS_HALT: u64 = 1;
pub const SYS_EXECUTE: u64 = 2;
pub const SYS_READ: u64 = 3;
pub const SYS_WRITE: u64 = 4;
pub const SYS_OPEN: u64 = 5;
pub const SYS_CLOSE: u64 = 6;
pub const SYS_GETARGS: u64 = 7;
pub const SYS_VIDMAP: u64 = 8;
pub const SYS_SET_HANDLER: u64 = 9;
pub const SYS_SIGRETURN: u64 = 10;

/// Returned to user space for every failed call.
pub const SYSCALL_FAILED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    NotFound,
    NotExecutable,
    ResourceExhausted,
    InvalidArgument,
    /// No input yet. Never reaches user space.
    WouldBlock,
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyscallError::NotFound => write!(f, "No such file"),
            SyscallError::NotExecutable => write!(f, "Not an executable"),
            SyscallError::ResourceExhausted => write!(f, "Resource exhausted"),
            SyscallError::InvalidArgument => write!(f, "Invalid argument"),
            SyscallError::WouldBlock => write!(f, "Operation would block"),
        }
    }
}

impl From<FsError> for SyscallError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => SyscallError::NotFound,
            _ => SyscallError::InvalidArgument,
        }
    }
}

pub type SyscallResult<T> = Result<T, SyscallError>;

/// Where the flow that starts a process is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSlot {
    /// The new process's PCB. Resumed by its `halt`.
    Parent(ProcessId),
    /// A terminal record. Resumed when the scheduler returns to that terminal.
    Terminal(TerminalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub pid: ProcessId,
    pub entry: VirtAddr,
    pub user_stack: VirtAddr,
    pub save: SaveSlot,
}

/// What the CPU should do once kernel state has been updated and unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Return to the interrupted flow.
    Stay,
    /// Save the current flow and enter ring 3.
    Launch(Launch),
    /// Abandon the current flow and make the `execute` saved in `context` return `status`.
    Resume {
        context: SavedExecutionContext,
        status: u8,
    },
    /// Park the running terminal's flow and continue another terminal's.
    Switch { from: TerminalId, to: TerminalId },
    /// Nothing left to run on this terminal.
    Idle,
}

/// Central syscall dispatcher, called from the int 0x80 handler.
/// Arguments come from registers: rax=number, rdi=arg0, rsi=arg1, rdx=arg2.
/// Returns result in rax.
#[cfg(target_os = "none")]
pub extern "C" fn dispatch(number: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    use crate::interrupts::usermode::perform;
    use crate::kernel::with_kernel;
    use crate::memory::{user_c_str, user_slice};

    /// Longest command line `execute` looks at: a name, a space and the arguments.
    const COMMAND_LIMIT: usize = crate::config::FILE_NAME_LENGTH + 1 + crate::config::MAX_ARGS_LENGTH;

    fn encode(result: SyscallResult<usize>) -> u64 {
        match result {
            Ok(value) => value as u64,
            Err(_) => SYSCALL_FAILED,
        }
    }

    fn copy_c_str(addr: u64, buf: &mut [u8], video_mapped: bool) -> Option<&[u8]> {
        let src = unsafe { user_c_str(addr, buf.len() as u64, video_mapped)? };
        buf[..src.len()].copy_from_slice(src);
        Some(&buf[..src.len()])
    }

    // Syscalls run with interrupts off, so the mapping cannot change under us.
    let video = with_kernel(|kernel, _| Ok(kernel.video_mapped())).unwrap_or(false);

    match number {
        SYS_HALT => {
            match with_kernel(|kernel, machine| kernel.halt(machine, arg0 as u8)) {
                Ok(transfer) => perform(transfer),
                Err(_) => SYSCALL_FAILED,
            }
        }
        SYS_EXECUTE => {
            let mut buf = [0u8; COMMAND_LIMIT];
            let Some(command) = copy_c_str(arg0, &mut buf, video) else {
                return SYSCALL_FAILED;
            };
            match with_kernel(|kernel, machine| kernel.execute(machine, command)) {
                Ok(transfer) => perform(transfer),
                Err(err) => {
                    crate::log_warn!("execute rejected: {}", err);
                    SYSCALL_FAILED
                }
            }
        }
        SYS_READ => {
            let Ok(buf) = (unsafe { user_slice(arg1, arg2, video) }) else {
                return SYSCALL_FAILED;
            };
            let mut buf = buf;
            loop {
                let result = with_kernel(|kernel, machine| kernel.read(machine, arg0 as usize, buf.as_deref_mut()));
                match result {
                    // Wait for the keyboard IRQ to commit a line, without holding the kernel lock.
                    Err(SyscallError::WouldBlock) => {
                        x86_64::instructions::interrupts::enable_and_hlt();
                        x86_64::instructions::interrupts::disable();
                    }
                    result => return encode(result),
                }
            }
        }
        SYS_WRITE => {
            let Ok(buf) = (unsafe { user_slice(arg1, arg2, video) }) else {
                return SYSCALL_FAILED;
            };
            encode(with_kernel(|kernel, machine| kernel.write(machine, arg0 as usize, buf.as_deref())))
        }
        SYS_OPEN => {
            let mut buf = [0u8; crate::config::FILE_NAME_LENGTH + 1];
            let Some(name) = copy_c_str(arg0, &mut buf, video) else {
                return SYSCALL_FAILED;
            };
            encode(with_kernel(|kernel, machine| kernel.open(machine, name)))
        }
        SYS_CLOSE => encode(with_kernel(|kernel, machine| kernel.close(machine, arg0 as usize))),
        SYS_GETARGS => {
            let Ok(buf) = (unsafe { user_slice(arg0, arg1, video) }) else {
                return SYSCALL_FAILED;
            };
            encode(with_kernel(|kernel, machine| kernel.getargs(machine, buf)))
        }
        SYS_VIDMAP => match with_kernel(|kernel, machine| kernel.vidmap(machine, arg0)) {
            Ok(address) => {
                match unsafe { user_slice(arg0, 8, false) } {
                    Ok(Some(out)) => {
                        out.copy_from_slice(&address.as_u64().to_le_bytes());
                        0
                    }
                    _ => SYSCALL_FAILED,
                }
            }
            Err(_) => SYSCALL_FAILED,
        },
        SYS_SET_HANDLER => encode(with_kernel(|kernel, _| kernel.set_handler(arg0 as u32, arg1))),
        SYS_SIGRETURN => encode(with_kernel(|kernel, _| kernel.sigreturn())),
        _ => {
            crate::log_warn!("syscall: unknown number {}", number);
            SYSCALL_FAILED
        }
    }
}

/// Kill the running process after a ring-3 exception.
#[cfg(target_os = "none")]
pub fn terminate_current(status: u8) {
    use crate::interrupts::usermode::perform;
    use crate::kernel::with_kernel;

    match with_kernel(|kernel, machine| kernel.halt(machine, status)) {
        Ok(transfer) => {
            perform(transfer);
        }
        Err(err) => panic!("fault outside any process: {}", err),
    }
}
