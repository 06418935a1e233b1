use super::ProcessId;
use crate::config::{MAX_ARGS_LENGTH, MAX_OPEN_FILES};
use crate::drivers::tty::TerminalId;
use crate::fs::fd::{FileDescriptor, FileOps};
use crate::scheduler::context::SavedExecutionContext;

/// Process control block. Lives at the bottom of its pid's kernel-stack slot.
#[repr(C)]
pub struct Pcb {
    pub pid: ProcessId,
    /// Process whose `execute` launched this one. Equal to `pid` for a terminal's root shell.
    pub parent: ProcessId,
    pub terminal: TerminalId,
    /// Where the launching `execute` resumes when this process halts.
    pub parent_context: SavedExecutionContext,
    pub files: [FileDescriptor; MAX_OPEN_FILES],
    args: [u8; MAX_ARGS_LENGTH],
}

impl Pcb {
    pub fn new(pid: ProcessId, parent: ProcessId, terminal: TerminalId, args: &[u8]) -> Pcb {
        let mut files = [FileDescriptor::CLOSED; MAX_OPEN_FILES];
        files[0] = FileDescriptor::terminal(FileOps::TerminalIn);
        files[1] = FileDescriptor::terminal(FileOps::TerminalOut);

        let mut buffer = [0u8; MAX_ARGS_LENGTH];
        let len = args.len().min(MAX_ARGS_LENGTH);
        buffer[..len].copy_from_slice(&args[..len]);

        Pcb {
            pid,
            parent,
            terminal,
            parent_context: SavedExecutionContext::empty(),
            files,
            args: buffer,
        }
    }

    /// Zero-padded argument buffer.
    pub fn args(&self) -> &[u8; MAX_ARGS_LENGTH] {
        &self.args
    }

    pub fn has_args(&self) -> bool {
        self.args[0] != 0
    }

    pub fn is_root(&self) -> bool {
        self.parent == self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_file_table_has_only_the_terminal_open() {
        let pcb = Pcb::new(ProcessId(3), ProcessId(1), TerminalId(2), b"");
        assert_eq!(pcb.files[0].ops, FileOps::TerminalIn);
        assert_eq!(pcb.files[1].ops, FileOps::TerminalOut);
        assert!(pcb.files[0].is_open() && pcb.files[1].is_open());
        assert!(pcb.files[2..].iter().all(|fd| !fd.is_open() && fd.ops == FileOps::Closed));
        assert!(!pcb.is_root());
        assert!(!pcb.has_args());
    }

    #[test]
    fn long_arguments_are_truncated() {
        let long = [b'a'; MAX_ARGS_LENGTH + 20];
        let pcb = Pcb::new(ProcessId(0), ProcessId(0), TerminalId(0), &long);
        assert!(pcb.args().iter().all(|&b| b == b'a'));
        assert!(pcb.is_root());
    }
}
